//! In-memory notifier for tests and local runs.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::{Notifier, NotifyError, Result, StatusChange};

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    sent: Vec<StatusChange>,
    fail_on_send: bool,
}

/// Notifier that records every delivered message.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<Mutex<InMemoryNotifierState>>,
}

impl InMemoryNotifier {
    /// Creates a new in-memory notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the notifier to fail every send.
    pub fn set_fail_on_send(&self, fail: bool) {
        self.lock().fail_on_send = fail;
    }

    /// Returns a copy of the delivered messages, oldest first.
    pub fn sent(&self) -> Vec<StatusChange> {
        self.lock().sent.clone()
    }

    /// Returns the number of delivered messages.
    pub fn sent_count(&self) -> usize {
        self.lock().sent.len()
    }

    /// Waits until at least `count` messages were delivered.
    ///
    /// Returns false if that did not happen within `timeout`.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let poll = async {
            while self.sent_count() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(timeout, poll).await.is_ok()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, InMemoryNotifierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn send(&self, change: &StatusChange) -> Result<()> {
        let mut state = self.lock();
        if state.fail_on_send {
            return Err(NotifyError::Unavailable(
                "in-memory notifier is failing".to_string(),
            ));
        }
        state.sent.push(change.clone());
        Ok(())
    }
}
