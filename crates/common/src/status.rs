//! Order status values.

use serde::{Deserialize, Serialize};

/// The status of a rental order.
///
/// ```text
/// New ──► Confirmed ──► Active ──► Completed
///  │          │
///  └──────────┴──► Cancelled
/// ```
///
/// Which moves are legal is decided by the domain's status machine; this type
/// only names the states and their storage keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order placed, not yet paid.
    #[default]
    New,

    /// Payment recorded, car reserved.
    Confirmed,

    /// Car handed over to the customer.
    Active,

    /// Car returned (terminal state).
    Completed,

    /// Order cancelled before hand-over (terminal state).
    Cancelled,
}

impl OrderStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::New,
        OrderStatus::Confirmed,
        OrderStatus::Active,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    /// Returns true if the order still occupies its date range on the car.
    pub fn holds_car(&self) -> bool {
        !matches!(self, OrderStatus::Cancelled)
    }

    /// Stable key used by storage backends.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "new",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Active => "active",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Inverse of [`OrderStatus::as_str`].
    pub fn from_key(key: &str) -> Option<Self> {
        OrderStatus::ALL.into_iter().find(|s| s.as_str() == key)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
