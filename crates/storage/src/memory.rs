use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::{
    Car, CarId, Customer, CustomerId, Order, OrderId, OrderStatus, RentalPeriod, Version,
};
use tokio::sync::RwLock;

use crate::query::paginate;
use crate::{
    CarPage, CarQuery, CustomerPage, CustomerQuery, OrderPage, OrderQuery, Page, Result,
    StorageError, store::RentalStore,
};

#[derive(Default)]
struct State {
    cars: HashMap<CarId, Car>,
    customers: HashMap<CustomerId, Customer>,
    orders: HashMap<OrderId, Order>,
}

impl State {
    fn overlapping_order(&self, candidate: &Order) -> Option<&Order> {
        if !candidate.status.holds_car() {
            return None;
        }
        self.orders.values().find(|existing| {
            existing.id != candidate.id
                && existing.car_id == candidate.car_id
                && existing.blocks(&candidate.period)
        })
    }

    fn has_open_orders(&self, mut predicate: impl FnMut(&Order) -> bool) -> bool {
        self.orders
            .values()
            .any(|o| !o.status.is_terminal() && predicate(o))
    }
}

#[derive(Debug, Default)]
struct Faults {
    unavailable: bool,
    latency: Option<Duration>,
}

/// In-memory rental store.
///
/// Provides the same interface and invariants as the PostgreSQL
/// implementation. Outages and slow responses can be simulated for tests.
#[derive(Clone, Default)]
pub struct InMemoryRentalStore {
    state: Arc<RwLock<State>>,
    faults: Arc<Mutex<Faults>>,
}

impl InMemoryRentalStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Returns every stored order.
    pub async fn all_orders(&self) -> Vec<Order> {
        self.state.read().await.orders.values().cloned().collect()
    }

    /// Clears all records.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.cars.clear();
        state.customers.clear();
        state.orders.clear();
    }

    /// Makes every call fail with `Unavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .unavailable = unavailable;
    }

    /// Delays every call by `latency` before it touches the data.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .latency = latency;
    }

    async fn check_faults(&self) -> Result<()> {
        let (unavailable, latency) = {
            let faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
            (faults.unavailable, faults.latency)
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if unavailable {
            return Err(StorageError::Unavailable(
                "in-memory store is offline".to_string(),
            ));
        }
        Ok(())
    }
}

fn newest_first<T>(items: &mut [T], key: impl Fn(&T) -> (chrono::DateTime<Utc>, uuid::Uuid)) {
    items.sort_by(|a, b| {
        let (a_at, a_id) = key(a);
        let (b_at, b_id) = key(b);
        b_at.cmp(&a_at).then(a_id.cmp(&b_id))
    });
}

#[async_trait]
impl RentalStore for InMemoryRentalStore {
    async fn insert_car(&self, car: Car) -> Result<()> {
        self.check_faults().await?;
        let mut state = self.state.write().await;
        if state.cars.contains_key(&car.id) {
            return Err(StorageError::Conflict {
                entity: "car",
                id: car.id.to_string(),
                reason: "already exists".to_string(),
            });
        }
        state.cars.insert(car.id, car);
        Ok(())
    }

    async fn get_car(&self, car_id: CarId) -> Result<Option<Car>> {
        self.check_faults().await?;
        Ok(self.state.read().await.cars.get(&car_id).cloned())
    }

    async fn update_car(&self, car: Car) -> Result<Car> {
        self.check_faults().await?;
        let mut state = self.state.write().await;
        let stored = state
            .cars
            .get_mut(&car.id)
            .ok_or_else(|| StorageError::not_found("car", car.id))?;
        stored.make = car.make;
        stored.model = car.model;
        stored.year = car.year;
        stored.day_rate = car.day_rate;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn delete_car(&self, car_id: CarId) -> Result<()> {
        self.check_faults().await?;
        let mut state = self.state.write().await;
        if !state.cars.contains_key(&car_id) {
            return Err(StorageError::not_found("car", car_id));
        }
        if state.has_open_orders(|o| o.car_id == car_id) {
            return Err(StorageError::Conflict {
                entity: "car",
                id: car_id.to_string(),
                reason: "referenced by an open order".to_string(),
            });
        }
        state.orders.retain(|_, o| o.car_id != car_id);
        state.cars.remove(&car_id);
        Ok(())
    }

    async fn list_cars(&self, query: CarQuery) -> Result<CarPage> {
        self.check_faults().await?;
        let state = self.state.read().await;
        let mut cars: Vec<Car> = state
            .cars
            .values()
            .filter(|c| query.matches(c))
            .cloned()
            .collect();
        newest_first(&mut cars, |c| (c.created_at, c.id.as_uuid()));
        let (cars, total) = paginate(cars, query.page);
        Ok(CarPage { cars, total })
    }

    async fn list_available_cars(&self, period: RentalPeriod, page: Page) -> Result<CarPage> {
        self.check_faults().await?;
        let state = self.state.read().await;
        let mut cars: Vec<Car> = state
            .cars
            .values()
            .filter(|car| {
                !state
                    .orders
                    .values()
                    .any(|o| o.car_id == car.id && o.blocks(&period))
            })
            .cloned()
            .collect();
        newest_first(&mut cars, |c| (c.created_at, c.id.as_uuid()));
        let (cars, total) = paginate(cars, page);
        Ok(CarPage { cars, total })
    }

    async fn insert_customer(&self, customer: Customer) -> Result<()> {
        self.check_faults().await?;
        let mut state = self.state.write().await;
        if state.customers.contains_key(&customer.id) {
            return Err(StorageError::Conflict {
                entity: "customer",
                id: customer.id.to_string(),
                reason: "already exists".to_string(),
            });
        }
        state.customers.insert(customer.id, customer);
        Ok(())
    }

    async fn get_customer(&self, customer_id: CustomerId) -> Result<Option<Customer>> {
        self.check_faults().await?;
        Ok(self.state.read().await.customers.get(&customer_id).cloned())
    }

    async fn update_customer(&self, customer: Customer) -> Result<Customer> {
        self.check_faults().await?;
        let mut state = self.state.write().await;
        let stored = state
            .customers
            .get_mut(&customer.id)
            .ok_or_else(|| StorageError::not_found("customer", customer.id))?;
        stored.first_name = customer.first_name;
        stored.last_name = customer.last_name;
        stored.email = customer.email;
        stored.phone = customer.phone;
        Ok(stored.clone())
    }

    async fn update_customer_password(
        &self,
        customer_id: CustomerId,
        password_hash: String,
    ) -> Result<()> {
        self.check_faults().await?;
        let mut state = self.state.write().await;
        let stored = state
            .customers
            .get_mut(&customer_id)
            .ok_or_else(|| StorageError::not_found("customer", customer_id))?;
        stored.password_hash = password_hash;
        Ok(())
    }

    async fn find_customer_by_phone(&self, phone: &str) -> Result<Option<Customer>> {
        self.check_faults().await?;
        let state = self.state.read().await;
        Ok(state
            .customers
            .values()
            .filter(|c| c.phone == phone)
            .min_by_key(|c| (c.created_at, c.id))
            .cloned())
    }

    async fn list_customers(&self, query: CustomerQuery) -> Result<CustomerPage> {
        self.check_faults().await?;
        let state = self.state.read().await;
        let mut customers: Vec<Customer> = state
            .customers
            .values()
            .filter(|c| query.matches(c))
            .cloned()
            .collect();
        newest_first(&mut customers, |c| (c.created_at, c.id.as_uuid()));
        let (customers, total) = paginate(customers, query.page);
        Ok(CustomerPage { customers, total })
    }

    async fn delete_customer(&self, customer_id: CustomerId) -> Result<()> {
        self.check_faults().await?;
        let mut state = self.state.write().await;
        if !state.customers.contains_key(&customer_id) {
            return Err(StorageError::not_found("customer", customer_id));
        }
        if state.has_open_orders(|o| o.customer_id == customer_id) {
            return Err(StorageError::Conflict {
                entity: "customer",
                id: customer_id.to_string(),
                reason: "referenced by an open order".to_string(),
            });
        }
        state.orders.retain(|_, o| o.customer_id != customer_id);
        state.customers.remove(&customer_id);
        Ok(())
    }

    async fn insert_order(&self, order: Order) -> Result<()> {
        self.check_faults().await?;
        let mut state = self.state.write().await;

        if !state.cars.contains_key(&order.car_id) {
            return Err(StorageError::not_found("car", order.car_id));
        }
        if !state.customers.contains_key(&order.customer_id) {
            return Err(StorageError::not_found("customer", order.customer_id));
        }
        if state.orders.contains_key(&order.id) {
            return Err(StorageError::Conflict {
                entity: "order",
                id: order.id.to_string(),
                reason: "already exists".to_string(),
            });
        }

        // Storage-side guard, mirrors the exclusion constraint in PostgreSQL
        if state.overlapping_order(&order).is_some() {
            return Err(StorageError::BookingOverlap {
                car_id: order.car_id,
            });
        }

        state.orders.insert(order.id, order);
        Ok(())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        self.check_faults().await?;
        Ok(self.state.read().await.orders.get(&order_id).cloned())
    }

    async fn list_orders_by_car(
        &self,
        car_id: CarId,
        window: Option<RentalPeriod>,
    ) -> Result<Vec<Order>> {
        self.check_faults().await?;
        let state = self.state.read().await;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|o| o.car_id == car_id)
            .filter(|o| window.is_none_or(|w| o.period.overlaps(&w)))
            .cloned()
            .collect();
        orders.sort_by_key(|o| (o.period.from(), o.id));
        Ok(orders)
    }

    async fn update_order(&self, order: Order, expected_version: Version) -> Result<Order> {
        self.check_faults().await?;
        let mut state = self.state.write().await;

        let stored = state
            .orders
            .get(&order.id)
            .ok_or_else(|| StorageError::not_found("order", order.id))?;
        if stored.version != expected_version {
            return Err(StorageError::VersionConflict {
                order_id: order.id,
                expected: expected_version,
                actual: stored.version,
            });
        }

        let mut updated = stored.clone();
        updated.period = order.period;
        updated.paid = order.paid;
        updated.amount = order.amount;
        updated.version = expected_version.next();
        updated.updated_at = Utc::now();

        if state.overlapping_order(&updated).is_some() {
            return Err(StorageError::BookingOverlap {
                car_id: updated.car_id,
            });
        }

        state.orders.insert(updated.id, updated.clone());
        Ok(updated)
    }

    async fn update_order_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
        paid: bool,
        expected_version: Version,
    ) -> Result<Order> {
        self.check_faults().await?;
        let mut state = self.state.write().await;

        let stored = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| StorageError::not_found("order", order_id))?;
        if stored.version != expected_version {
            return Err(StorageError::VersionConflict {
                order_id,
                expected: expected_version,
                actual: stored.version,
            });
        }

        stored.status = status;
        stored.paid = paid;
        stored.version = expected_version.next();
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn delete_order(&self, order_id: OrderId) -> Result<()> {
        self.check_faults().await?;
        self.state
            .write()
            .await
            .orders
            .remove(&order_id)
            .map(|_| ())
            .ok_or_else(|| StorageError::not_found("order", order_id))
    }

    async fn list_orders(&self, query: OrderQuery) -> Result<OrderPage> {
        self.check_faults().await?;
        let state = self.state.read().await;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|o| query.matches(o))
            .cloned()
            .collect();
        newest_first(&mut orders, |o| (o.created_at, o.id.as_uuid()));
        let (orders, total) = paginate(orders, query.page);
        Ok(OrderPage { orders, total })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RentalStoreExt;
    use common::Money;

    fn car() -> Car {
        let now = Utc::now();
        Car {
            id: CarId::new(),
            make: "Chevrolet".to_string(),
            model: "Malibu".to_string(),
            year: 2022,
            day_rate: Money::from_dollars(100),
            created_at: now,
            updated_at: now,
        }
    }

    fn customer() -> Customer {
        Customer {
            id: CustomerId::new(),
            first_name: "Aziz".to_string(),
            last_name: "Karimov".to_string(),
            email: "aziz@example.com".to_string(),
            phone: "+998901234567".to_string(),
            password_hash: "hash".to_string(),
            created_at: Utc::now(),
        }
    }

    fn order(car: &Car, customer: &Customer, from: &str, to: &str) -> Order {
        let now = Utc::now();
        Order {
            id: OrderId::new(),
            customer_id: customer.id,
            car_id: car.id,
            period: RentalPeriod::parse(from, to).unwrap(),
            status: OrderStatus::New,
            paid: false,
            amount: Money::from_dollars(500),
            version: Version::first(),
            created_at: now,
            updated_at: now,
        }
    }

    async fn seeded() -> (InMemoryRentalStore, Car, Customer) {
        let store = InMemoryRentalStore::new();
        let car = car();
        let customer = customer();
        store.insert_car(car.clone()).await.unwrap();
        store.insert_customer(customer.clone()).await.unwrap();
        (store, car, customer)
    }

    #[tokio::test]
    async fn insert_and_get_order() {
        let (store, car, customer) = seeded().await;
        let order = order(&car, &customer, "2025-01-10", "2025-01-15");

        store.insert_order(order.clone()).await.unwrap();

        assert_eq!(store.get_order(order.id).await.unwrap(), Some(order));
        assert_eq!(store.order_count().await, 1);
    }

    #[tokio::test]
    async fn insert_rejects_overlap() {
        let (store, car, customer) = seeded().await;
        store
            .insert_order(order(&car, &customer, "2025-01-10", "2025-01-15"))
            .await
            .unwrap();

        let result = store
            .insert_order(order(&car, &customer, "2025-01-14", "2025-01-16"))
            .await;
        assert!(matches!(result, Err(StorageError::BookingOverlap { .. })));
    }

    #[tokio::test]
    async fn insert_allows_adjacent_and_cancelled_overlap() {
        let (store, car, customer) = seeded().await;
        let first = order(&car, &customer, "2025-01-10", "2025-01-15");
        store.insert_order(first.clone()).await.unwrap();

        store
            .insert_order(order(&car, &customer, "2025-01-15", "2025-01-18"))
            .await
            .unwrap();

        store
            .update_order_status(first.id, OrderStatus::Cancelled, false, first.version)
            .await
            .unwrap();
        store
            .insert_order(order(&car, &customer, "2025-01-11", "2025-01-13"))
            .await
            .unwrap();

        assert_eq!(store.order_count().await, 3);
    }

    #[tokio::test]
    async fn insert_requires_existing_car() {
        let (store, _, customer) = seeded().await;
        let result = store
            .insert_order(order(&car(), &customer, "2025-01-10", "2025-01-15"))
            .await;
        assert!(matches!(
            result,
            Err(StorageError::NotFound { entity: "car", .. })
        ));
    }

    #[tokio::test]
    async fn update_order_checks_version() {
        let (store, car, customer) = seeded().await;
        let mut o = order(&car, &customer, "2025-01-10", "2025-01-15");
        store.insert_order(o.clone()).await.unwrap();

        o.paid = true;
        let updated = store.update_order(o.clone(), Version::first()).await.unwrap();
        assert_eq!(updated.version, Version::new(2));
        assert!(updated.paid);

        let stale = store.update_order(o, Version::first()).await;
        assert!(matches!(
            stale,
            Err(StorageError::VersionConflict { actual, .. }) if actual == Version::new(2)
        ));
    }

    #[tokio::test]
    async fn update_order_excludes_itself_from_overlap() {
        let (store, car, customer) = seeded().await;
        let mut o = order(&car, &customer, "2025-01-10", "2025-01-15");
        store.insert_order(o.clone()).await.unwrap();

        o.period = RentalPeriod::parse("2025-01-12", "2025-01-20").unwrap();
        let updated = store.update_order(o, Version::first()).await.unwrap();
        assert_eq!(updated.period.to().to_string(), "2025-01-20");
    }

    #[tokio::test]
    async fn list_orders_by_car_filters_window() {
        let (store, car, customer) = seeded().await;
        store
            .insert_order(order(&car, &customer, "2025-01-01", "2025-01-05"))
            .await
            .unwrap();
        store
            .insert_order(order(&car, &customer, "2025-02-01", "2025-02-05"))
            .await
            .unwrap();

        let window = RentalPeriod::parse("2025-01-04", "2025-01-10").unwrap();
        let hits = store.list_orders_by_car(car.id, Some(window)).await.unwrap();
        assert_eq!(hits.len(), 1);

        let all = store.list_orders_by_car(car.id, None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all[0].period.from() < all[1].period.from());
    }

    #[tokio::test]
    async fn delete_car_with_open_order_conflicts() {
        let (store, car, customer) = seeded().await;
        let o = order(&car, &customer, "2025-01-10", "2025-01-15");
        store.insert_order(o.clone()).await.unwrap();

        let result = store.delete_car(car.id).await;
        assert!(matches!(result, Err(StorageError::Conflict { .. })));

        store
            .update_order_status(o.id, OrderStatus::Cancelled, false, o.version)
            .await
            .unwrap();
        store.delete_car(car.id).await.unwrap();

        assert!(store.get_car(car.id).await.unwrap().is_none());
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn list_available_cars_skips_booked() {
        let (store, booked, customer) = seeded().await;
        let free = car();
        store.insert_car(free.clone()).await.unwrap();
        store
            .insert_order(order(&booked, &customer, "2025-01-10", "2025-01-15"))
            .await
            .unwrap();

        let period = RentalPeriod::parse("2025-01-12", "2025-01-13").unwrap();
        let page = store
            .list_available_cars(period, Page::default())
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.cars[0].id, free.id);
    }

    #[tokio::test]
    async fn list_orders_paginates_and_filters() {
        let (store, car, customer) = seeded().await;
        for day in 1..=9 {
            let from = format!("2025-03-0{day}");
            let to = format!("2025-03-{:02}", day + 1);
            store
                .insert_order(order(&car, &customer, &from, &to))
                .await
                .unwrap();
        }

        let page = store
            .list_orders(OrderQuery::new().car(car.id).page(2, 4))
            .await
            .unwrap();
        assert_eq!(page.total, 9);
        assert_eq!(page.orders.len(), 4);

        let none = store
            .list_orders(OrderQuery::new().status(OrderStatus::Active))
            .await
            .unwrap();
        assert_eq!(none.total, 0);
    }

    #[tokio::test]
    async fn update_customer_keeps_password_hash() {
        let (store, _, customer) = seeded().await;

        let mut changed = customer.clone();
        changed.email = "aziz.k@example.com".to_string();
        changed.password_hash = "ignored".to_string();
        let stored = store.update_customer(changed).await.unwrap();
        assert_eq!(stored.email, "aziz.k@example.com");
        assert_eq!(stored.password_hash, "hash");

        store
            .update_customer_password(customer.id, "rotated".to_string())
            .await
            .unwrap();
        let loaded = store.require_customer(customer.id).await.unwrap();
        assert_eq!(loaded.password_hash, "rotated");

        let missing = store
            .update_customer_password(CustomerId::new(), "x".to_string())
            .await;
        assert!(matches!(
            missing,
            Err(StorageError::NotFound { entity: "customer", .. })
        ));
    }

    #[tokio::test]
    async fn find_customer_by_phone_picks_earliest() {
        let (store, _, first) = seeded().await;
        let mut later = customer();
        later.created_at = first.created_at + chrono::Duration::seconds(1);
        store.insert_customer(later).await.unwrap();

        let found = store.find_customer_by_phone(&first.phone).await.unwrap();
        assert_eq!(found.map(|c| c.id), Some(first.id));
        assert!(store.find_customer_by_phone("+1000").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_customers_searches_names_and_email() {
        let (store, _, _) = seeded().await;
        let mut other = customer();
        other.first_name = "Dilnoza".to_string();
        other.email = "dilnoza@example.com".to_string();
        store.insert_customer(other).await.unwrap();

        let page = store
            .list_customers(CustomerQuery::new().search("KARIM"))
            .await
            .unwrap();
        assert_eq!(page.total, 2);

        let page = store
            .list_customers(CustomerQuery::new().search("dilnoza").page(1, 10))
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.customers[0].first_name, "Dilnoza");

        let page = store
            .list_customers(CustomerQuery::new().page(2, 1))
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.customers.len(), 1);
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_call() {
        let (store, car, _) = seeded().await;
        store.set_unavailable(true);

        let result = store.get_car(car.id).await;
        assert!(matches!(result, Err(StorageError::Unavailable(_))));

        store.set_unavailable(false);
        assert!(store.require_car(car.id).await.is_ok());
    }

    #[tokio::test]
    async fn require_order_reports_not_found() {
        let store = InMemoryRentalStore::new();
        let result = store.require_order(OrderId::new()).await;
        assert!(matches!(
            result,
            Err(StorageError::NotFound { entity: "order", .. })
        ));
    }
}
