//! Availability checks against a car's existing orders.

use common::{CarId, Order, OrderId, RentalPeriod};
use storage::RentalStore;

use crate::{RequestContext, Result};

/// Decides whether a car is free for a period.
///
/// A car is free when no non-cancelled order on it overlaps the period.
/// Completed orders still occupy their range. The check is only meaningful
/// while the caller holds the car's lock.
#[derive(Debug, Clone)]
pub struct AvailabilityChecker<S> {
    store: S,
}

impl<S: RentalStore> AvailabilityChecker<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns the orders that block `period` on `car_id`.
    ///
    /// `exclude` skips one order, so an order being rescheduled does not
    /// conflict with itself.
    #[tracing::instrument(skip(self, ctx, period), fields(period = %period))]
    pub async fn find_conflicts(
        &self,
        ctx: &RequestContext,
        car_id: CarId,
        period: RentalPeriod,
        exclude: Option<OrderId>,
    ) -> Result<Vec<Order>> {
        let orders = ctx
            .run(
                "check_availability",
                self.store.list_orders_by_car(car_id, Some(period)),
            )
            .await?;

        let conflicts: Vec<Order> = orders
            .into_iter()
            .filter(|o| Some(o.id) != exclude && o.blocks(&period))
            .collect();

        if !conflicts.is_empty() {
            tracing::debug!(conflicts = conflicts.len(), "car is booked");
        }
        Ok(conflicts)
    }

    /// Returns true if nothing blocks `period` on `car_id`.
    pub async fn is_available(
        &self,
        ctx: &RequestContext,
        car_id: CarId,
        period: RentalPeriod,
        exclude: Option<OrderId>,
    ) -> Result<bool> {
        Ok(self
            .find_conflicts(ctx, car_id, period, exclude)
            .await?
            .is_empty())
    }
}
