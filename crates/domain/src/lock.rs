//! Per-car mutual exclusion.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use common::CarId;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Guard held while a car's bookings are being checked and written.
pub type CarGuard = OwnedMutexGuard<()>;

/// Keyed async locks, one per car.
///
/// Requests for different cars never wait on each other. Entries are held
/// weakly: a car's mutex lives only while some task holds or awaits it, and
/// dead entries are pruned whenever a new car is locked.
#[derive(Debug, Clone, Default)]
pub struct CarLocks {
    entries: Arc<Mutex<HashMap<CarId, Weak<AsyncMutex<()>>>>>,
}

impl CarLocks {
    /// Creates an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `car_id`.
    pub async fn lock(&self, car_id: CarId) -> CarGuard {
        self.entry(car_id).lock_owned().await
    }

    /// Number of cars currently locked or awaited.
    pub fn active(&self) -> usize {
        self.table()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    fn entry(&self, car_id: CarId) -> Arc<AsyncMutex<()>> {
        let mut entries = self.table();
        if let Some(mutex) = entries.get(&car_id).and_then(Weak::upgrade) {
            return mutex;
        }
        entries.retain(|_, weak| weak.strong_count() > 0);
        let mutex = Arc::new(AsyncMutex::new(()));
        entries.insert(car_id, Arc::downgrade(&mutex));
        mutex
    }

    fn table(&self) -> std::sync::MutexGuard<'_, HashMap<CarId, Weak<AsyncMutex<()>>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
