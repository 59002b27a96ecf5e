use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use common::{
    Car, CarId, Customer, CustomerId, Money, Order, OrderId, OrderStatus, RentalPeriod, Version,
};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use crate::{
    CarPage, CarQuery, CustomerPage, CustomerQuery, OrderPage, OrderQuery, Page, Result,
    StorageError, store::RentalStore,
};

const CAR_COLUMNS: &str = "id, make, model, year, day_rate_cents, created_at, updated_at";

const CUSTOMER_COLUMNS: &str =
    "id, first_name, last_name, email, phone, password_hash, created_at";

const ORDER_COLUMNS: &str = "id, customer_id, car_id, from_date, to_date, status, paid, \
     amount_cents, version, created_at, updated_at";

/// Name of the exclusion constraint that forbids overlapping bookings.
const OVERLAP_CONSTRAINT: &str = "orders_no_overlap";

/// PostgreSQL-backed rental store.
///
/// The booking invariant is enforced by an `EXCLUDE USING gist` constraint on
/// `(car_id, daterange(from_date, to_date, '[)'))` for non-cancelled rows.
#[derive(Clone)]
pub struct PostgresRentalStore {
    pool: PgPool,
}

impl PostgresRentalStore {
    /// Creates a new PostgreSQL rental store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a pool whose connection acquisition is bounded by `acquire_timeout`.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_car(row: PgRow) -> Result<Car> {
        Ok(Car {
            id: CarId::from_uuid(row.try_get::<Uuid, _>("id")?),
            make: row.try_get("make")?,
            model: row.try_get("model")?,
            year: row.try_get("year")?,
            day_rate: Money::from_cents(row.try_get("day_rate_cents")?),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_customer(row: PgRow) -> Result<Customer> {
        Ok(Customer {
            id: CustomerId::from_uuid(row.try_get::<Uuid, _>("id")?),
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
            password_hash: row.try_get("password_hash")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let status_key: String = row.try_get("status")?;
        let status = OrderStatus::from_key(&status_key)
            .ok_or_else(|| StorageError::Corrupt(format!("unknown order status '{status_key}'")))?;
        let from: NaiveDate = row.try_get("from_date")?;
        let to: NaiveDate = row.try_get("to_date")?;
        let period =
            RentalPeriod::new(from, to).map_err(|e| StorageError::Corrupt(e.to_string()))?;

        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            customer_id: CustomerId::from_uuid(row.try_get::<Uuid, _>("customer_id")?),
            car_id: CarId::from_uuid(row.try_get::<Uuid, _>("car_id")?),
            period,
            status,
            paid: row.try_get("paid")?,
            amount: Money::from_cents(row.try_get("amount_cents")?),
            version: Version::new(row.try_get("version")?),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    /// Maps an order write error, recognising the overlap constraint.
    fn order_write_error(err: sqlx::Error, car_id: CarId) -> StorageError {
        if let sqlx::Error::Database(ref db_err) = err
            && db_err.constraint() == Some(OVERLAP_CONSTRAINT)
        {
            return StorageError::BookingOverlap { car_id };
        }
        if let sqlx::Error::Database(ref db_err) = err
            && db_err.is_foreign_key_violation()
        {
            return StorageError::NotFound {
                entity: "car or customer",
                id: car_id.to_string(),
            };
        }
        StorageError::from(err)
    }

    /// Distinguishes a missing order from a stale version after a guarded
    /// UPDATE matched no row.
    async fn version_miss(&self, order_id: OrderId, expected: Version) -> StorageError {
        let current: std::result::Result<Option<i64>, sqlx::Error> =
            sqlx::query_scalar("SELECT version FROM orders WHERE id = $1")
                .bind(order_id.as_uuid())
                .fetch_optional(&self.pool)
                .await;

        match current {
            Ok(Some(actual)) => StorageError::VersionConflict {
                order_id,
                expected,
                actual: Version::new(actual),
            },
            Ok(None) => StorageError::not_found("order", order_id),
            Err(e) => StorageError::from(e),
        }
    }

    /// Deletes a parent row unless it still has open orders, inside one
    /// transaction. The row lock blocks concurrent order inserts that
    /// reference it.
    async fn delete_unreferenced(&self, entity: &'static str, id: Uuid) -> Result<()> {
        let (table, column) = match entity {
            "car" => ("cars", "car_id"),
            _ => ("customers", "customer_id"),
        };

        let mut tx = self.pool.begin().await?;

        let locked: Option<Uuid> =
            sqlx::query_scalar(&format!("SELECT id FROM {table} WHERE id = $1 FOR UPDATE"))
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            return Err(StorageError::not_found(entity, id));
        }

        let open: bool = sqlx::query_scalar(&format!(
            "SELECT EXISTS (SELECT 1 FROM orders WHERE {column} = $1 \
             AND status NOT IN ('completed', 'cancelled'))"
        ))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if open {
            return Err(StorageError::Conflict {
                entity,
                id: id.to_string(),
                reason: "referenced by an open order".to_string(),
            });
        }

        // Terminal orders go with their parent via ON DELETE CASCADE
        sqlx::query(&format!("DELETE FROM {table} WHERE id = $1"))
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

fn push_order_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &OrderQuery) {
    if let Some(car_id) = query.car_id {
        builder.push(" AND car_id = ").push_bind(car_id.as_uuid());
    }
    if let Some(customer_id) = query.customer_id {
        builder
            .push(" AND customer_id = ")
            .push_bind(customer_id.as_uuid());
    }
    if let Some(status) = query.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
}

fn push_car_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &CarQuery) {
    if let Some(term) = query.search.as_deref().filter(|t| !t.is_empty()) {
        let pattern = format!("%{term}%");
        builder
            .push(" AND (make ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR model ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

fn push_customer_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &CustomerQuery) {
    if let Some(term) = query.search.as_deref().filter(|t| !t.is_empty()) {
        let pattern = format!("%{term}%");
        builder
            .push(" AND (first_name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR last_name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR email ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

fn push_page(builder: &mut QueryBuilder<'_, Postgres>, page: Page) {
    builder
        .push(" ORDER BY created_at DESC, id LIMIT ")
        .push_bind(i64::from(page.limit))
        .push(" OFFSET ")
        .push_bind(i64::try_from(page.offset()).unwrap_or(i64::MAX));
}

#[async_trait]
impl RentalStore for PostgresRentalStore {
    async fn insert_car(&self, car: Car) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cars (id, make, model, year, day_rate_cents, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(car.id.as_uuid())
        .bind(&car.make)
        .bind(&car.model)
        .bind(car.year)
        .bind(car.day_rate.cents())
        .bind(car.created_at)
        .bind(car.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_car(&self, car_id: CarId) -> Result<Option<Car>> {
        let row = sqlx::query(&format!("SELECT {CAR_COLUMNS} FROM cars WHERE id = $1"))
            .bind(car_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_car).transpose()
    }

    async fn update_car(&self, car: Car) -> Result<Car> {
        let row = sqlx::query(&format!(
            "UPDATE cars SET make = $2, model = $3, year = $4, day_rate_cents = $5, \
             updated_at = $6 WHERE id = $1 RETURNING {CAR_COLUMNS}"
        ))
        .bind(car.id.as_uuid())
        .bind(&car.make)
        .bind(&car.model)
        .bind(car.year)
        .bind(car.day_rate.cents())
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StorageError::not_found("car", car.id))?;
        Self::row_to_car(row)
    }

    async fn delete_car(&self, car_id: CarId) -> Result<()> {
        self.delete_unreferenced("car", car_id.as_uuid()).await
    }

    async fn list_cars(&self, query: CarQuery) -> Result<CarPage> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM cars WHERE 1=1");
        push_car_filters(&mut count, &query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select =
            QueryBuilder::<Postgres>::new(format!("SELECT {CAR_COLUMNS} FROM cars WHERE 1=1"));
        push_car_filters(&mut select, &query);
        push_page(&mut select, query.page);
        let rows = select.build().fetch_all(&self.pool).await?;

        Ok(CarPage {
            cars: rows
                .into_iter()
                .map(Self::row_to_car)
                .collect::<Result<_>>()?,
            total: u64::try_from(total).unwrap_or_default(),
        })
    }

    async fn list_available_cars(&self, period: RentalPeriod, page: Page) -> Result<CarPage> {
        const FREE: &str = " WHERE NOT EXISTS (SELECT 1 FROM orders o WHERE o.car_id = cars.id \
             AND o.status <> 'cancelled' AND o.from_date < ";

        let mut count = QueryBuilder::<Postgres>::new(format!("SELECT COUNT(*) FROM cars{FREE}"));
        count
            .push_bind(period.to())
            .push(" AND o.to_date > ")
            .push_bind(period.from())
            .push(")");
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select =
            QueryBuilder::<Postgres>::new(format!("SELECT {CAR_COLUMNS} FROM cars{FREE}"));
        select
            .push_bind(period.to())
            .push(" AND o.to_date > ")
            .push_bind(period.from())
            .push(")");
        push_page(&mut select, page);
        let rows = select.build().fetch_all(&self.pool).await?;

        Ok(CarPage {
            cars: rows
                .into_iter()
                .map(Self::row_to_car)
                .collect::<Result<_>>()?,
            total: u64::try_from(total).unwrap_or_default(),
        })
    }

    async fn insert_customer(&self, customer: Customer) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO customers (id, first_name, last_name, email, phone, password_hash, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(customer.id.as_uuid())
        .bind(&customer.first_name)
        .bind(&customer.last_name)
        .bind(&customer.email)
        .bind(&customer.phone)
        .bind(&customer.password_hash)
        .bind(customer.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_customer(&self, customer_id: CustomerId) -> Result<Option<Customer>> {
        let row = sqlx::query(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = $1"
        ))
        .bind(customer_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_customer).transpose()
    }

    async fn update_customer(&self, customer: Customer) -> Result<Customer> {
        let row = sqlx::query(&format!(
            "UPDATE customers SET first_name = $2, last_name = $3, email = $4, phone = $5 \
             WHERE id = $1 RETURNING {CUSTOMER_COLUMNS}"
        ))
        .bind(customer.id.as_uuid())
        .bind(&customer.first_name)
        .bind(&customer.last_name)
        .bind(&customer.email)
        .bind(&customer.phone)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StorageError::not_found("customer", customer.id))?;
        Self::row_to_customer(row)
    }

    async fn update_customer_password(
        &self,
        customer_id: CustomerId,
        password_hash: String,
    ) -> Result<()> {
        let result = sqlx::query("UPDATE customers SET password_hash = $2 WHERE id = $1")
            .bind(customer_id.as_uuid())
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::not_found("customer", customer_id));
        }
        Ok(())
    }

    async fn find_customer_by_phone(&self, phone: &str) -> Result<Option<Customer>> {
        let row = sqlx::query(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE phone = $1 \
             ORDER BY created_at ASC, id ASC LIMIT 1"
        ))
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_customer).transpose()
    }

    async fn list_customers(&self, query: CustomerQuery) -> Result<CustomerPage> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM customers WHERE 1=1");
        push_customer_filters(&mut count, &query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE 1=1"
        ));
        push_customer_filters(&mut select, &query);
        push_page(&mut select, query.page);
        let rows = select.build().fetch_all(&self.pool).await?;

        Ok(CustomerPage {
            customers: rows
                .into_iter()
                .map(Self::row_to_customer)
                .collect::<Result<_>>()?,
            total: u64::try_from(total).unwrap_or_default(),
        })
    }

    async fn delete_customer(&self, customer_id: CustomerId) -> Result<()> {
        self.delete_unreferenced("customer", customer_id.as_uuid())
            .await
    }

    async fn insert_order(&self, order: Order) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO orders ({ORDER_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
        ))
        .bind(order.id.as_uuid())
        .bind(order.customer_id.as_uuid())
        .bind(order.car_id.as_uuid())
        .bind(order.period.from())
        .bind(order.period.to())
        .bind(order.status.as_str())
        .bind(order.paid)
        .bind(order.amount.cents())
        .bind(order.version.as_i64())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::order_write_error(e, order.car_id))?;
        Ok(())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_order).transpose()
    }

    async fn list_orders_by_car(
        &self,
        car_id: CarId,
        window: Option<RentalPeriod>,
    ) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE car_id = $1 \
             AND ($2::date IS NULL OR (from_date < $3::date AND to_date > $2::date)) \
             ORDER BY from_date ASC, id ASC"
        ))
        .bind(car_id.as_uuid())
        .bind(window.map(|w| w.from()))
        .bind(window.map(|w| w.to()))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn update_order(&self, order: Order, expected_version: Version) -> Result<Order> {
        let row = sqlx::query(&format!(
            "UPDATE orders SET from_date = $3, to_date = $4, paid = $5, amount_cents = $6, \
             version = version + 1, updated_at = $7 \
             WHERE id = $1 AND version = $2 RETURNING {ORDER_COLUMNS}"
        ))
        .bind(order.id.as_uuid())
        .bind(expected_version.as_i64())
        .bind(order.period.from())
        .bind(order.period.to())
        .bind(order.paid)
        .bind(order.amount.cents())
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Self::order_write_error(e, order.car_id))?;

        match row {
            Some(row) => Self::row_to_order(row),
            None => Err(self.version_miss(order.id, expected_version).await),
        }
    }

    async fn update_order_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
        paid: bool,
        expected_version: Version,
    ) -> Result<Order> {
        let row = sqlx::query(&format!(
            "UPDATE orders SET status = $3, paid = $4, version = version + 1, updated_at = $5 \
             WHERE id = $1 AND version = $2 RETURNING {ORDER_COLUMNS}"
        ))
        .bind(order_id.as_uuid())
        .bind(expected_version.as_i64())
        .bind(status.as_str())
        .bind(paid)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_order(row),
            None => Err(self.version_miss(order_id, expected_version).await),
        }
    }

    async fn delete_order(&self, order_id: OrderId) -> Result<()> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(order_id.as_uuid())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::not_found("order", order_id));
        }
        Ok(())
    }

    async fn list_orders(&self, query: OrderQuery) -> Result<OrderPage> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM orders WHERE 1=1");
        push_order_filters(&mut count, &query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select =
            QueryBuilder::<Postgres>::new(format!("SELECT {ORDER_COLUMNS} FROM orders WHERE 1=1"));
        push_order_filters(&mut select, &query);
        push_page(&mut select, query.page);
        let rows = select.build().fetch_all(&self.pool).await?;

        Ok(OrderPage {
            orders: rows
                .into_iter()
                .map(Self::row_to_order)
                .collect::<Result<_>>()?,
            total: u64::try_from(total).unwrap_or_default(),
        })
    }
}
