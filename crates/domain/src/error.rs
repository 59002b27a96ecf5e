//! Domain error types.

use common::{CarId, OrderId, PeriodError, RentalPeriod};
use storage::StorageError;
use thiserror::Error;

/// Broad category of a [`RentalError`], used to decide how a caller reacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input. Fix the request.
    Validation,
    /// The request is well formed but the current state forbids it.
    BusinessConflict,
    /// The referenced record does not exist.
    NotFound,
    /// A concurrent write won the race. Re-read and retry.
    Conflict,
    /// Infrastructure hiccup. Retry with backoff.
    Transient,
    /// Unexpected backend failure.
    Internal,
}

/// Errors returned by the rental domain services.
#[derive(Debug, Error)]
pub enum RentalError {
    /// An input field is malformed.
    #[error("invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    /// Another order already holds the car for an overlapping period.
    #[error("car {car_id} is not available for {period}")]
    CarUnavailable { car_id: CarId, period: RentalPeriod },

    /// The status change is not allowed by the order lifecycle.
    #[error("cannot move order from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// The status label is not one of the configured labels.
    #[error("unknown order status '{0}'")]
    UnknownStatus(String),

    /// The order is in a status that forbids the requested change.
    #[error("order {order_id} is {status} and cannot be modified")]
    OrderLocked { order_id: OrderId, status: String },

    /// The referenced record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The record is still referenced or already exists.
    #[error("{entity} {id} cannot be changed: {reason}")]
    Referenced {
        entity: &'static str,
        id: String,
        reason: String,
    },

    /// A concurrent write changed the record first.
    #[error("{operation} conflict: {message}")]
    Conflict {
        operation: &'static str,
        message: String,
    },

    /// The caller's deadline passed before the operation finished.
    #[error("{operation} timed out")]
    Timeout { operation: &'static str },

    /// The storage backend cannot be reached.
    #[error("{operation} failed: storage unavailable: {message}")]
    Unavailable {
        operation: &'static str,
        message: String,
    },

    /// Any other storage failure.
    #[error("{operation} failed: {source}")]
    Storage {
        operation: &'static str,
        #[source]
        source: StorageError,
    },
}

impl RentalError {
    /// Wraps a storage error with the name of the failing operation.
    ///
    /// The kind of the storage error is preserved.
    pub fn storage(operation: &'static str, error: StorageError) -> Self {
        match error {
            StorageError::NotFound { entity, id } => RentalError::NotFound { entity, id },
            StorageError::Conflict { entity, id, reason } => {
                RentalError::Referenced { entity, id, reason }
            }
            StorageError::VersionConflict { .. } => RentalError::Conflict {
                operation,
                message: error.to_string(),
            },
            StorageError::BookingOverlap { .. } => RentalError::Conflict {
                operation,
                message: error.to_string(),
            },
            StorageError::Timeout => RentalError::Timeout { operation },
            StorageError::Unavailable(message) => RentalError::Unavailable { operation, message },
            other => RentalError::Storage {
                operation,
                source: other,
            },
        }
    }

    /// Like [`RentalError::storage`], but reports an overlap rejection from
    /// the store as the car being unavailable for `period`.
    pub fn booking(operation: &'static str, period: RentalPeriod, error: StorageError) -> Self {
        match error {
            StorageError::BookingOverlap { car_id } => {
                RentalError::CarUnavailable { car_id, period }
            }
            other => RentalError::storage(operation, other),
        }
    }

    pub(crate) fn validation(field: &'static str, message: impl Into<String>) -> Self {
        RentalError::Validation {
            field,
            message: message.into(),
        }
    }

    /// Returns the category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RentalError::Validation { .. } => ErrorKind::Validation,
            RentalError::CarUnavailable { .. }
            | RentalError::InvalidTransition { .. }
            | RentalError::UnknownStatus(_)
            | RentalError::OrderLocked { .. }
            | RentalError::Referenced { .. } => ErrorKind::BusinessConflict,
            RentalError::NotFound { .. } => ErrorKind::NotFound,
            RentalError::Conflict { .. } => ErrorKind::Conflict,
            RentalError::Timeout { .. } | RentalError::Unavailable { .. } => ErrorKind::Transient,
            RentalError::Storage { .. } => ErrorKind::Internal,
        }
    }

    /// Returns true if repeating the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Conflict | ErrorKind::Transient)
    }

    /// Message safe to show to the caller.
    ///
    /// Validation and business errors carry enough detail to correct the
    /// request; infrastructure errors do not leak internals.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Transient => "service temporarily unavailable, try again".to_string(),
            ErrorKind::Internal => "internal error, try again later".to_string(),
            ErrorKind::Conflict => {
                "the record was changed by another request, reload and try again".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Short label used for metrics.
    pub(crate) fn reason(&self) -> &'static str {
        match self {
            RentalError::Validation { .. } => "validation",
            RentalError::CarUnavailable { .. } => "car_unavailable",
            RentalError::InvalidTransition { .. } => "invalid_transition",
            RentalError::UnknownStatus(_) => "unknown_status",
            RentalError::OrderLocked { .. } => "order_locked",
            RentalError::Referenced { .. } => "referenced",
            RentalError::NotFound { .. } => "not_found",
            RentalError::Conflict { .. } => "conflict",
            RentalError::Timeout { .. } => "timeout",
            RentalError::Unavailable { .. } => "unavailable",
            RentalError::Storage { .. } => "storage",
        }
    }
}

impl From<PeriodError> for RentalError {
    fn from(error: PeriodError) -> Self {
        RentalError::Validation {
            field: error.field(),
            message: error.to_string(),
        }
    }
}

/// Convenience type alias for domain results.
pub type Result<T> = std::result::Result<T, RentalError>;
