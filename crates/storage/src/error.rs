use common::{CarId, OrderId, Version};
use thiserror::Error;

/// Errors that can occur when interacting with the rental store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The write would break a referential rule (for example deleting a car
    /// that still has open orders).
    #[error("{entity} {id} cannot be changed: {reason}")]
    Conflict {
        entity: &'static str,
        id: String,
        reason: String,
    },

    /// A non-cancelled order already occupies an overlapping period on the car.
    #[error("Car {car_id} is already booked for an overlapping period")]
    BookingOverlap { car_id: CarId },

    /// The order changed since it was read.
    #[error("Concurrency conflict for order {order_id}: expected version {expected}, found {actual}")]
    VersionConflict {
        order_id: OrderId,
        expected: Version,
        actual: Version,
    },

    /// The backend cannot be reached.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// The backend did not answer in time.
    #[error("Storage operation timed out")]
    Timeout,

    /// A stored row could not be decoded into a record.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// Any other database error.
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StorageError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StorageError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns true for failures that may succeed when retried with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Unavailable(_) | StorageError::Timeout)
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => StorageError::Timeout,
            sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
                StorageError::Unavailable(err.to_string())
            }
            // 57014: query_canceled, raised when statement_timeout fires
            sqlx::Error::Database(ref db_err) if db_err.code().as_deref() == Some("57014") => {
                StorageError::Timeout
            }
            other => StorageError::Database(other),
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StorageError>;
