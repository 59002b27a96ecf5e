//! Order lifecycle service.

use std::time::Instant;

use chrono::Utc;
use common::{Money, Order, OrderId, OrderStatus, RentalPeriod, Version, parse_date};
use notifier::{NotificationQueue, StatusChange};
use storage::{OrderPage, OrderQuery, RentalStore, RentalStoreExt};

use crate::availability::AvailabilityChecker;
use crate::commands::{
    CancelOrder, CreateOrder, ListOrders, UpdateOrder, UpdateOrderStatus, validate_page,
};
use crate::lock::CarLocks;
use crate::status::StatusMachine;
use crate::{RentalError, RequestContext, Result};

/// Creates, reschedules and moves rental orders through their lifecycle.
///
/// Every availability check and the write that follows it run under the
/// car's lock, so two requests for overlapping periods on the same car can
/// never both succeed. The store re-checks the overlap on write as a second
/// line of defence. Status changes are published to the notification queue
/// after they are stored; a lost notification never fails the request.
pub struct OrderLifecycleService<S: RentalStore> {
    store: S,
    availability: AvailabilityChecker<S>,
    machine: StatusMachine,
    locks: CarLocks,
    notifications: Option<NotificationQueue>,
}

impl<S: RentalStore + Clone> OrderLifecycleService<S> {
    /// Creates a service over `store`.
    ///
    /// Services that touch the same cars must share `locks`.
    pub fn new(store: S, machine: StatusMachine, locks: CarLocks) -> Self {
        Self {
            availability: AvailabilityChecker::new(store.clone()),
            store,
            machine,
            locks,
            notifications: None,
        }
    }
}

impl<S: RentalStore> OrderLifecycleService<S> {
    /// Publishes status changes to `queue`.
    pub fn with_notifications(mut self, queue: NotificationQueue) -> Self {
        self.notifications = Some(queue);
        self
    }

    /// Returns the status machine in use.
    pub fn machine(&self) -> &StatusMachine {
        &self.machine
    }

    /// Returns the availability checker in use.
    pub fn availability(&self) -> &AvailabilityChecker<S> {
        &self.availability
    }

    /// Places a new order in status NEW.
    ///
    /// The amount is the car's day rate times the number of rental days.
    #[tracing::instrument(skip(self, ctx), fields(car_id = %cmd.car_id, customer_id = %cmd.customer_id))]
    pub async fn create_order(&self, ctx: &RequestContext, cmd: CreateOrder) -> Result<OrderId> {
        const OP: &str = "create_order";
        let started = Instant::now();

        let result: Result<OrderId> = async {
            let period = RentalPeriod::parse(&cmd.from_date, &cmd.to_date)?;

            let car = ctx.run(OP, self.store.require_car(cmd.car_id)).await?;
            ctx.run(OP, self.store.require_customer(cmd.customer_id))
                .await?;

            let _guard = ctx.bound(OP, self.locks.lock(car.id)).await?;
            if !self
                .availability
                .is_available(ctx, car.id, period, None)
                .await?
            {
                return Err(RentalError::CarUnavailable {
                    car_id: car.id,
                    period,
                });
            }

            let now = Utc::now();
            let order = Order {
                id: OrderId::new(),
                customer_id: cmd.customer_id,
                car_id: car.id,
                period,
                status: OrderStatus::New,
                paid: false,
                amount: rental_amount(car.day_rate, &period)?,
                version: Version::first(),
                created_at: now,
                updated_at: now,
            };
            let order_id = order.id;
            let amount = order.amount;

            ctx.bound(OP, self.store.insert_order(order))
                .await?
                .map_err(|e| RentalError::booking(OP, period, e))?;

            tracing::info!(%order_id, %period, %amount, "order created");
            Ok::<_, RentalError>(order_id)
        }
        .await;

        self.finish(OP, started, &result);
        if result.is_ok() {
            metrics::counter!("rental_orders_created_total").increment(1);
        }
        result
    }

    /// Changes the period or payment flag of an order that is not terminal.
    ///
    /// Once an order is past NEW its payment flag can no longer be cleared.
    ///
    /// A new period is re-checked for availability, ignoring the order's own
    /// booking. The write fails with `Conflict` if the order changed since
    /// it was read.
    #[tracing::instrument(skip(self, ctx), fields(order_id = %cmd.order_id))]
    pub async fn update_order(&self, ctx: &RequestContext, cmd: UpdateOrder) -> Result<OrderId> {
        const OP: &str = "update_order";
        let started = Instant::now();

        let result: Result<OrderId> = async {
            let from = cmd
                .from_date
                .as_deref()
                .map(|v| parse_date("from_date", v))
                .transpose()?;
            let to = cmd
                .to_date
                .as_deref()
                .map(|v| parse_date("to_date", v))
                .transpose()?;
            if let (Some(from), Some(to)) = (from, to) {
                RentalPeriod::new(from, to)?;
            }

            let order = ctx.run(OP, self.store.require_order(cmd.order_id)).await?;
            if order.status.is_terminal() {
                return Err(self.locked(&order));
            }
            // Confirmation records the payment; only a NEW order may clear it.
            if cmd.paid == Some(false) && order.status != OrderStatus::New {
                return Err(RentalError::validation(
                    "paid",
                    format!(
                        "payment cannot be revoked once the order is {}",
                        self.machine.label(order.status)
                    ),
                ));
            }

            let period = RentalPeriod::new(
                from.unwrap_or(order.period.from()),
                to.unwrap_or(order.period.to()),
            )?;
            let rescheduled = period != order.period;

            let _guard = if rescheduled {
                let guard = ctx.bound(OP, self.locks.lock(order.car_id)).await?;
                if !self
                    .availability
                    .is_available(ctx, order.car_id, period, Some(order.id))
                    .await?
                {
                    return Err(RentalError::CarUnavailable {
                        car_id: order.car_id,
                        period,
                    });
                }
                Some(guard)
            } else {
                None
            };

            let amount = if cmd.reprice {
                let car = ctx.run(OP, self.store.require_car(order.car_id)).await?;
                rental_amount(car.day_rate, &period)?
            } else {
                order.amount
            };

            let expected = order.version;
            let updated = Order {
                period,
                paid: cmd.paid.unwrap_or(order.paid),
                amount,
                updated_at: Utc::now(),
                ..order
            };

            let stored = ctx
                .bound(OP, self.store.update_order(updated, expected))
                .await?
                .map_err(|e| RentalError::booking(OP, period, e))?;

            tracing::info!(
                order_id = %stored.id,
                %period,
                amount = %stored.amount,
                version = %stored.version,
                "order updated"
            );
            Ok::<_, RentalError>(stored.id)
        }
        .await;

        self.finish(OP, started, &result);
        result
    }

    /// Moves an order to the status named by `cmd.status`.
    ///
    /// The change is stored with an optimistic version check and then
    /// published as a notification on a best-effort basis.
    #[tracing::instrument(skip(self, ctx), fields(order_id = %cmd.order_id, status = %cmd.status))]
    pub async fn update_status(
        &self,
        ctx: &RequestContext,
        cmd: UpdateOrderStatus,
    ) -> Result<OrderId> {
        const OP: &str = "update_status";
        let started = Instant::now();

        let result: Result<OrderId> = async {
            // Reject unknown labels before any storage call.
            self.machine.parse(&cmd.status)?;

            let order = ctx.run(OP, self.store.require_order(cmd.order_id)).await?;
            let next = self.machine.transition(&order, &cmd.status)?;

            let stored = ctx
                .run(
                    OP,
                    self.store
                        .update_order_status(order.id, next.status, next.paid, order.version),
                )
                .await?;

            let from = self.machine.label(order.status).to_string();
            let to = self.machine.label(stored.status).to_string();
            tracing::info!(order_id = %stored.id, %from, %to, "order status changed");
            metrics::counter!(
                "rental_status_transitions_total",
                "from" => order.status.as_str(),
                "to" => stored.status.as_str()
            )
            .increment(1);

            self.notify(StatusChange {
                order_id: stored.id,
                car_id: stored.car_id,
                customer_id: stored.customer_id,
                from,
                to,
                period: stored.period,
                at: stored.updated_at,
            });
            Ok::<_, RentalError>(stored.id)
        }
        .await;

        self.finish(OP, started, &result);
        result
    }

    /// Cancels an order, releasing its period on the car.
    pub async fn cancel_order(&self, ctx: &RequestContext, cmd: CancelOrder) -> Result<OrderId> {
        let label = self.machine.label(OrderStatus::Cancelled).to_string();
        self.update_status(ctx, UpdateOrderStatus::new(cmd.order_id, label))
            .await
    }

    /// Loads an order.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn get_order(&self, ctx: &RequestContext, order_id: OrderId) -> Result<Order> {
        ctx.run("get_order", self.store.require_order(order_id))
            .await
    }

    /// Lists orders, newest first, with the total number of matches.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn list_orders(&self, ctx: &RequestContext, cmd: ListOrders) -> Result<OrderPage> {
        let page = validate_page(cmd.page, cmd.limit)?;
        let status = cmd
            .status
            .as_deref()
            .map(|label| self.machine.parse(label))
            .transpose()?;

        let query = OrderQuery {
            car_id: cmd.car_id,
            customer_id: cmd.customer_id,
            status,
            page,
        };
        ctx.run("list_orders", self.store.list_orders(query)).await
    }

    /// Deletes an order.
    ///
    /// Orders that are confirmed or active hold a paid booking and cannot be
    /// deleted; cancel or complete them first.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn delete_order(&self, ctx: &RequestContext, order_id: OrderId) -> Result<()> {
        const OP: &str = "delete_order";

        let order = ctx.run(OP, self.store.require_order(order_id)).await?;
        if matches!(order.status, OrderStatus::Confirmed | OrderStatus::Active) {
            return Err(self.locked(&order));
        }

        ctx.run(OP, self.store.delete_order(order_id)).await?;
        tracing::info!(%order_id, "order deleted");
        Ok(())
    }

    fn locked(&self, order: &Order) -> RentalError {
        RentalError::OrderLocked {
            order_id: order.id,
            status: self.machine.label(order.status).to_string(),
        }
    }

    fn notify(&self, change: StatusChange) {
        if let Some(queue) = &self.notifications {
            queue.enqueue(change);
        }
    }

    fn finish<T>(&self, operation: &'static str, started: Instant, result: &Result<T>) {
        metrics::histogram!("rental_operation_duration_seconds", "operation" => operation)
            .record(started.elapsed().as_secs_f64());

        if let Err(error) = result {
            metrics::counter!(
                "rental_orders_rejected_total",
                "operation" => operation,
                "reason" => error.reason()
            )
            .increment(1);
            if error.is_retryable() {
                tracing::warn!(operation, %error, "operation failed");
            } else {
                tracing::debug!(operation, %error, "operation rejected");
            }
        }
    }
}

/// Price of a rental: day rate times the number of days.
fn rental_amount(day_rate: Money, period: &RentalPeriod) -> Result<Money> {
    day_rate
        .checked_multiply(period.days())
        .ok_or_else(|| RentalError::validation("to_date", "rental amount is out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Car, CarId, Customer, CustomerId};
    use notifier::InMemoryNotifier;
    use std::sync::Arc;
    use std::time::Duration;
    use storage::InMemoryRentalStore;

    struct Fixture {
        store: InMemoryRentalStore,
        service: OrderLifecycleService<InMemoryRentalStore>,
        car: Car,
        customer: Customer,
    }

    async fn fixture() -> Fixture {
        let store = InMemoryRentalStore::new();
        let now = Utc::now();
        let car = Car {
            id: CarId::new(),
            make: "Chevrolet".to_string(),
            model: "Malibu".to_string(),
            year: 2024,
            day_rate: Money::from_dollars(100),
            created_at: now,
            updated_at: now,
        };
        let customer = Customer {
            id: CustomerId::new(),
            first_name: "Madina".to_string(),
            last_name: "Yusupova".to_string(),
            email: "madina@example.com".to_string(),
            phone: "+998901234567".to_string(),
            password_hash: String::new(),
            created_at: now,
        };
        store.insert_car(car.clone()).await.unwrap();
        store.insert_customer(customer.clone()).await.unwrap();

        let service =
            OrderLifecycleService::new(store.clone(), StatusMachine::default(), CarLocks::new());
        Fixture {
            store,
            service,
            car,
            customer,
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::with_timeout(Duration::from_secs(1))
    }

    impl Fixture {
        async fn create(&self, from: &str, to: &str) -> Result<OrderId> {
            self.service
                .create_order(
                    &ctx(),
                    CreateOrder::new(self.customer.id, self.car.id, from, to),
                )
                .await
        }

        async fn status(&self, order_id: OrderId, label: &str) -> Result<OrderId> {
            self.service
                .update_status(&ctx(), UpdateOrderStatus::new(order_id, label))
                .await
        }
    }

    #[tokio::test]
    async fn test_create_order_prices_days() {
        let f = fixture().await;

        let order_id = f.create("2025-01-10", "2025-01-15").await.unwrap();

        let order = f.service.get_order(&ctx(), order_id).await.unwrap();
        assert_eq!(order.amount, Money::from_dollars(500));
        assert_eq!(order.status, OrderStatus::New);
        assert!(!order.paid);
        assert_eq!(order.version, Version::first());
    }

    #[tokio::test]
    async fn test_create_order_rejects_overlap() {
        let f = fixture().await;
        f.create("2025-01-10", "2025-01-15").await.unwrap();

        let err = f.create("2025-01-14", "2025-01-16").await.unwrap_err();
        assert!(matches!(err, RentalError::CarUnavailable { car_id, .. } if car_id == f.car.id));
        assert_eq!(f.store.order_count().await, 1);
    }

    #[tokio::test]
    async fn test_create_order_unknown_car_and_customer() {
        let f = fixture().await;

        let err = f
            .service
            .create_order(
                &ctx(),
                CreateOrder::new(f.customer.id, CarId::new(), "2025-01-10", "2025-01-15"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RentalError::NotFound { entity: "car", .. }));

        let err = f
            .service
            .create_order(
                &ctx(),
                CreateOrder::new(CustomerId::new(), f.car.id, "2025-01-10", "2025-01-15"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RentalError::NotFound { entity: "customer", .. }));
    }

    #[tokio::test]
    async fn test_invalid_dates_fail_before_storage() {
        let f = fixture().await;
        f.store.set_unavailable(true);

        for (from, to) in [
            ("2025-01-15", "2025-01-10"),
            ("2025-01-10", "2025-01-10"),
            ("2025/01/10", "2025-01-15"),
            ("2025-01-10", "tomorrow"),
        ] {
            let err = f.create(from, to).await.unwrap_err();
            assert!(
                matches!(err, RentalError::Validation { .. }),
                "{from}..{to} gave {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_status_walk_and_payment() {
        let f = fixture().await;
        let order_id = f.create("2025-01-10", "2025-01-15").await.unwrap();

        f.status(order_id, "CONFIRMED").await.unwrap();
        let order = f.service.get_order(&ctx(), order_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Confirmed);
        assert!(order.paid);

        f.status(order_id, "ACTIVE").await.unwrap();
        f.status(order_id, "COMPLETED").await.unwrap();

        let order = f.service.get_order(&ctx(), order_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
        assert_eq!(order.version, Version::new(4));

        let err = f.status(order_id, "CANCELLED").await.unwrap_err();
        assert!(matches!(err, RentalError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_new_to_active_is_invalid_and_unchanged() {
        let f = fixture().await;
        let order_id = f.create("2025-01-10", "2025-01-15").await.unwrap();

        let err = f.status(order_id, "ACTIVE").await.unwrap_err();
        assert!(matches!(err, RentalError::InvalidTransition { .. }));

        let order = f.service.get_order(&ctx(), order_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::New);
    }

    #[tokio::test]
    async fn test_unknown_status_fails_before_storage() {
        let f = fixture().await;
        f.store.set_unavailable(true);

        let err = f.status(OrderId::new(), "SHIPPED").await.unwrap_err();
        assert!(matches!(err, RentalError::UnknownStatus(_)));
    }

    #[tokio::test]
    async fn test_cancel_releases_period() {
        let f = fixture().await;
        let order_id = f.create("2025-01-10", "2025-01-15").await.unwrap();

        f.service
            .cancel_order(&ctx(), CancelOrder::new(order_id))
            .await
            .unwrap();

        f.create("2025-01-10", "2025-01-15").await.unwrap();
    }

    #[tokio::test]
    async fn test_update_order_reschedules_around_itself() {
        let f = fixture().await;
        let order_id = f.create("2025-01-10", "2025-01-15").await.unwrap();
        f.create("2025-01-20", "2025-01-25").await.unwrap();

        f.service
            .update_order(&ctx(), UpdateOrder::new(order_id).to_date("2025-01-18"))
            .await
            .unwrap();
        let order = f.service.get_order(&ctx(), order_id).await.unwrap();
        assert_eq!(order.period, RentalPeriod::parse("2025-01-10", "2025-01-18").unwrap());
        // Not repriced unless asked.
        assert_eq!(order.amount, Money::from_dollars(500));
        assert_eq!(order.version, Version::new(2));

        let err = f
            .service
            .update_order(&ctx(), UpdateOrder::new(order_id).to_date("2025-01-21"))
            .await
            .unwrap_err();
        assert!(matches!(err, RentalError::CarUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_update_order_reprice_and_paid() {
        let f = fixture().await;
        let order_id = f.create("2025-01-10", "2025-01-15").await.unwrap();

        f.service
            .update_order(
                &ctx(),
                UpdateOrder::new(order_id)
                    .period("2025-01-10", "2025-01-12")
                    .paid(true)
                    .reprice(),
            )
            .await
            .unwrap();

        let order = f.service.get_order(&ctx(), order_id).await.unwrap();
        assert_eq!(order.amount, Money::from_dollars(200));
        assert!(order.paid);
    }

    #[tokio::test]
    async fn test_update_order_keeps_payment_after_confirmation() {
        let f = fixture().await;
        let order_id = f.create("2025-01-10", "2025-01-15").await.unwrap();

        // A NEW order may still toggle the flag.
        f.service
            .update_order(&ctx(), UpdateOrder::new(order_id).paid(true))
            .await
            .unwrap();
        f.service
            .update_order(&ctx(), UpdateOrder::new(order_id).paid(false))
            .await
            .unwrap();

        f.status(order_id, "CONFIRMED").await.unwrap();
        let before = f.service.get_order(&ctx(), order_id).await.unwrap();

        let err = f
            .service
            .update_order(&ctx(), UpdateOrder::new(order_id).paid(false))
            .await
            .unwrap_err();
        assert!(matches!(err, RentalError::Validation { field: "paid", .. }));
        assert!(err.to_string().contains("CONFIRMED"));

        let after = f.service.get_order(&ctx(), order_id).await.unwrap();
        assert!(after.paid);
        assert_eq!(after.version, before.version);

        f.service
            .update_order(&ctx(), UpdateOrder::new(order_id).paid(true))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_update_order_rejects_terminal_and_bad_dates() {
        let f = fixture().await;
        let order_id = f.create("2025-01-10", "2025-01-15").await.unwrap();

        let err = f
            .service
            .update_order(&ctx(), UpdateOrder::new(order_id).period("2025-01-12", "2025-01-11"))
            .await
            .unwrap_err();
        assert!(matches!(err, RentalError::Validation { field: "to_date", .. }));

        let err = f
            .service
            .update_order(&ctx(), UpdateOrder::new(order_id).from_date("2025-01-15"))
            .await
            .unwrap_err();
        assert!(matches!(err, RentalError::Validation { .. }));

        f.service
            .cancel_order(&ctx(), CancelOrder::new(order_id))
            .await
            .unwrap();
        let err = f
            .service
            .update_order(&ctx(), UpdateOrder::new(order_id).paid(true))
            .await
            .unwrap_err();
        assert!(matches!(err, RentalError::OrderLocked { .. }));
    }

    #[tokio::test]
    async fn test_delete_order_rules() {
        let f = fixture().await;
        let fresh = f.create("2025-01-10", "2025-01-12").await.unwrap();
        let confirmed = f.create("2025-01-12", "2025-01-14").await.unwrap();
        f.status(confirmed, "CONFIRMED").await.unwrap();

        let err = f.service.delete_order(&ctx(), confirmed).await.unwrap_err();
        assert!(matches!(err, RentalError::OrderLocked { ref status, .. } if status == "CONFIRMED"));

        f.service.delete_order(&ctx(), fresh).await.unwrap();
        let err = f.service.get_order(&ctx(), fresh).await.unwrap_err();
        assert!(matches!(err, RentalError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_list_orders_validates_and_filters() {
        let f = fixture().await;
        let first = f.create("2025-01-01", "2025-01-02").await.unwrap();
        f.create("2025-01-03", "2025-01-04").await.unwrap();
        f.status(first, "CONFIRMED").await.unwrap();

        let page = f
            .service
            .list_orders(
                &ctx(),
                ListOrders {
                    status: Some("confirmed".to_string()),
                    ..ListOrders::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.orders[0].id, first);

        let err = f
            .service
            .list_orders(
                &ctx(),
                ListOrders {
                    limit: 500,
                    ..ListOrders::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RentalError::Validation { field: "limit", .. }));
    }

    #[tokio::test]
    async fn test_status_change_is_notified() {
        let notifier = InMemoryNotifier::new();
        let (queue, _worker) = NotificationQueue::start(Arc::new(notifier.clone()), 8);
        let mut f = fixture().await;
        f.service = f.service.with_notifications(queue);

        let order_id = f.create("2025-01-10", "2025-01-15").await.unwrap();
        f.status(order_id, "CONFIRMED").await.unwrap();

        assert!(notifier.wait_for(1, Duration::from_secs(1)).await);
        let sent = notifier.sent();
        assert_eq!(sent[0].order_id, order_id);
        assert_eq!(sent[0].from, "NEW");
        assert_eq!(sent[0].to, "CONFIRMED");
    }

    #[tokio::test]
    async fn test_storage_outage_is_transient() {
        let f = fixture().await;
        f.store.set_unavailable(true);

        let err = f.create("2025-01-10", "2025-01-15").await.unwrap_err();
        assert!(matches!(err, RentalError::Unavailable { operation: "create_order", .. }));
        assert!(err.is_retryable());
    }
}
