//! Persisted records for cars, customers and orders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CarId, CustomerId, Money, OrderId, OrderStatus, RentalPeriod};

/// Revision counter of an order, used for optimistic concurrency control.
///
/// A freshly inserted order is at version 1; every successful write bumps it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Version of a newly created record.
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A car in the rental fleet. Availability is derived from orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Car {
    pub id: CarId,
    pub make: String,
    pub model: String,
    pub year: i32,
    /// Price charged per rental day.
    pub day_rate: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A registered customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    /// Credential hash produced by the authentication layer; opaque here.
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// A rental order for one car over one period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub car_id: CarId,
    pub period: RentalPeriod,
    pub status: OrderStatus,
    pub paid: bool,
    /// Price fixed when the order was placed.
    pub amount: Money,
    pub version: Version,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Returns true if this order blocks `period` on its car.
    pub fn blocks(&self, period: &RentalPeriod) -> bool {
        self.status.holds_car() && self.period.overlaps(period)
    }
}
