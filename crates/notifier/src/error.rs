//! Notification error types.

use thiserror::Error;

/// Errors raised while delivering a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The request could not be sent or the connection failed.
    #[error("notification transport failed: {0}")]
    Transport(String),

    /// The remote side did not answer in time.
    #[error("notification timed out: {0}")]
    Timeout(String),

    /// The remote side answered with a non-success status.
    #[error("notification rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The notifier is switched off or not configured.
    #[error("notifier unavailable: {0}")]
    Unavailable(String),
}

/// Convenience type alias for notifier results.
pub type Result<T> = std::result::Result<T, NotifyError>;
