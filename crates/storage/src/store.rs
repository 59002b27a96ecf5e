use async_trait::async_trait;
use common::{
    Car, CarId, Customer, CustomerId, Order, OrderId, OrderStatus, RentalPeriod, Version,
};

use crate::{
    CarPage, CarQuery, CustomerPage, CustomerQuery, OrderPage, OrderQuery, Page, Result,
    StorageError,
};

/// Persistence gateway for the rental domain.
///
/// Every write is atomic: it either commits in full or leaves no trace.
/// Implementations also guard the booking invariant themselves, so an
/// order insert or update that would overlap another non-cancelled order on
/// the same car fails with `BookingOverlap` even if the caller skipped its own
/// availability check.
#[async_trait]
pub trait RentalStore: Send + Sync {
    /// Stores a new car.
    async fn insert_car(&self, car: Car) -> Result<()>;

    /// Retrieves a car, returning None if it doesn't exist.
    async fn get_car(&self, car_id: CarId) -> Result<Option<Car>>;

    /// Replaces the mutable fields of an existing car.
    async fn update_car(&self, car: Car) -> Result<Car>;

    /// Deletes a car together with its terminal orders.
    ///
    /// Fails with `Conflict` while the car has an order that is neither
    /// completed nor cancelled.
    async fn delete_car(&self, car_id: CarId) -> Result<()>;

    /// Lists cars matching a query, newest first.
    async fn list_cars(&self, query: CarQuery) -> Result<CarPage>;

    /// Lists cars with no non-cancelled order overlapping `period`.
    async fn list_available_cars(&self, period: RentalPeriod, page: Page) -> Result<CarPage>;

    /// Stores a new customer.
    async fn insert_customer(&self, customer: Customer) -> Result<()>;

    /// Retrieves a customer, returning None if it doesn't exist.
    async fn get_customer(&self, customer_id: CustomerId) -> Result<Option<Customer>>;

    /// Replaces the name, email and phone of an existing customer.
    async fn update_customer(&self, customer: Customer) -> Result<Customer>;

    /// Replaces the stored credential hash of a customer.
    async fn update_customer_password(
        &self,
        customer_id: CustomerId,
        password_hash: String,
    ) -> Result<()>;

    /// Finds the earliest registered customer with this phone number.
    async fn find_customer_by_phone(&self, phone: &str) -> Result<Option<Customer>>;

    /// Lists customers matching a query, newest first.
    async fn list_customers(&self, query: CustomerQuery) -> Result<CustomerPage>;

    /// Deletes a customer together with their terminal orders.
    ///
    /// Fails with `Conflict` while the customer has an open order.
    async fn delete_customer(&self, customer_id: CustomerId) -> Result<()>;

    /// Stores a new order.
    async fn insert_order(&self, order: Order) -> Result<()>;

    /// Retrieves an order, returning None if it doesn't exist.
    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Lists the orders of a car, in any status.
    ///
    /// With a window, only orders whose period overlaps it are returned.
    async fn list_orders_by_car(
        &self,
        car_id: CarId,
        window: Option<RentalPeriod>,
    ) -> Result<Vec<Order>>;

    /// Writes the period, payment flag and amount of an order.
    ///
    /// Fails with `VersionConflict` unless the stored order is at
    /// `expected_version`. Returns the stored order with its new version.
    async fn update_order(&self, order: Order, expected_version: Version) -> Result<Order>;

    /// Writes the status and payment flag of an order.
    ///
    /// Same versioning rules as [`RentalStore::update_order`].
    async fn update_order_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
        paid: bool,
        expected_version: Version,
    ) -> Result<Order>;

    /// Deletes an order.
    async fn delete_order(&self, order_id: OrderId) -> Result<()>;

    /// Lists orders matching a query, newest first.
    async fn list_orders(&self, query: OrderQuery) -> Result<OrderPage>;
}

/// Extension trait turning missing records into `NotFound` errors.
#[async_trait]
pub trait RentalStoreExt: RentalStore {
    /// Retrieves a car or fails with `NotFound`.
    async fn require_car(&self, car_id: CarId) -> Result<Car> {
        self.get_car(car_id)
            .await?
            .ok_or_else(|| StorageError::not_found("car", car_id))
    }

    /// Retrieves a customer or fails with `NotFound`.
    async fn require_customer(&self, customer_id: CustomerId) -> Result<Customer> {
        self.get_customer(customer_id)
            .await?
            .ok_or_else(|| StorageError::not_found("customer", customer_id))
    }

    /// Retrieves an order or fails with `NotFound`.
    async fn require_order(&self, order_id: OrderId) -> Result<Order> {
        self.get_order(order_id)
            .await?
            .ok_or_else(|| StorageError::not_found("order", order_id))
    }
}

// Blanket implementation for all RentalStore implementations
impl<T: RentalStore + ?Sized> RentalStoreExt for T {}
