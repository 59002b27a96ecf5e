//! Per-request deadlines.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::{RentalError, Result};

/// Carries the caller's deadline through a domain operation.
///
/// Every storage call and lock acquisition made on behalf of the request is
/// bounded by the same deadline. When it passes, the operation fails with
/// the retryable [`RentalError::Timeout`].
#[derive(Debug, Clone, Copy)]
pub struct RequestContext {
    deadline: Instant,
}

impl RequestContext {
    /// Creates a context whose deadline is `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
        }
    }

    /// Creates a context with an absolute deadline.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self { deadline }
    }

    /// Returns the deadline.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Returns true if the deadline has passed.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Awaits `future` until the deadline.
    pub async fn bound<F>(&self, operation: &'static str, future: F) -> Result<F::Output>
    where
        F: Future,
    {
        tokio::time::timeout_at(self.deadline, future)
            .await
            .map_err(|_| {
                tracing::warn!(operation, "deadline exceeded");
                RentalError::Timeout { operation }
            })
    }

    /// Awaits a storage call until the deadline, wrapping its error with
    /// the operation name.
    pub async fn run<T, F>(&self, operation: &'static str, future: F) -> Result<T>
    where
        F: Future<Output = storage::Result<T>>,
    {
        self.bound(operation, future)
            .await?
            .map_err(|e| RentalError::storage(operation, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::StorageError;

    #[tokio::test]
    async fn test_run_passes_results_through() {
        let ctx = RequestContext::with_timeout(Duration::from_secs(1));

        let value = ctx.run("op", async { Ok::<_, StorageError>(7) }).await.unwrap();
        assert_eq!(value, 7);

        let err = ctx
            .run("op", async { Err::<(), _>(StorageError::Unavailable("down".into())) })
            .await
            .unwrap_err();
        assert!(matches!(err, RentalError::Unavailable { operation: "op", .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_elapses() {
        let ctx = RequestContext::with_timeout(Duration::from_millis(100));

        let err = ctx
            .bound("slow_op", tokio::time::sleep(Duration::from_secs(10)))
            .await
            .unwrap_err();

        assert!(matches!(err, RentalError::Timeout { operation: "slow_op" }));
        assert!(err.is_retryable());
        assert!(ctx.is_expired());
        assert_eq!(ctx.remaining(), Duration::ZERO);
    }
}
