//! The message sent when an order changes status.

use chrono::{DateTime, Utc};
use common::{CarId, CustomerId, OrderId, RentalPeriod};
use serde::{Deserialize, Serialize};

/// An order moved from one status to another.
///
/// Statuses are carried as the configured labels so the message reads the
/// same way the caller asked for the change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub order_id: OrderId,
    pub car_id: CarId,
    pub customer_id: CustomerId,
    pub from: String,
    pub to: String,
    pub period: RentalPeriod,
    pub at: DateTime<Utc>,
}

impl StatusChange {
    /// Renders the message as human-readable chat text.
    pub fn text(&self) -> String {
        format!(
            "Order {} changed status {} -> {}\nCar: {}\nCustomer: {}\nPeriod: {}\nAt: {}",
            self.order_id,
            self.from,
            self.to,
            self.car_id,
            self.customer_id,
            self.period,
            self.at.format("%Y-%m-%d %H:%M:%S UTC"),
        )
    }
}
