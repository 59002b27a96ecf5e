//! Commands accepted by the rental services.
//!
//! Dates and statuses arrive as the strings the caller sent; the services
//! validate them before touching storage.

use common::{CarId, CustomerId, Money, OrderId};
use storage::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT, Page};
use uuid::Uuid;

use crate::{RentalError, Result};

/// Parses an id sent by a caller, failing with `Validation`.
pub fn parse_id<T: From<Uuid>>(field: &'static str, value: &str) -> Result<T> {
    Uuid::parse_str(value.trim())
        .map(T::from)
        .map_err(|_| RentalError::validation(field, format!("'{value}' is not a valid id")))
}

/// Validates a page selector.
pub fn validate_page(page: u32, limit: u32) -> Result<Page> {
    if page == 0 {
        return Err(RentalError::validation("page", "must be at least 1"));
    }
    if limit == 0 || limit > MAX_PAGE_LIMIT {
        return Err(RentalError::validation(
            "limit",
            format!("must be between 1 and {MAX_PAGE_LIMIT}"),
        ));
    }
    Ok(Page::new(page, limit))
}

/// Place a new order.
#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub customer_id: CustomerId,
    pub car_id: CarId,
    pub from_date: String,
    pub to_date: String,
}

impl CreateOrder {
    pub fn new(
        customer_id: CustomerId,
        car_id: CarId,
        from_date: impl Into<String>,
        to_date: impl Into<String>,
    ) -> Self {
        Self {
            customer_id,
            car_id,
            from_date: from_date.into(),
            to_date: to_date.into(),
        }
    }
}

/// Change the period or payment flag of an order.
///
/// Unset fields keep their stored value. The amount is recomputed from the
/// car's current day rate only when `reprice` is set.
#[derive(Debug, Clone)]
pub struct UpdateOrder {
    pub order_id: OrderId,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    pub paid: Option<bool>,
    pub reprice: bool,
}

impl UpdateOrder {
    /// Creates an update that changes nothing.
    pub fn new(order_id: OrderId) -> Self {
        Self {
            order_id,
            from_date: None,
            to_date: None,
            paid: None,
            reprice: false,
        }
    }

    /// Sets a new period.
    pub fn period(mut self, from_date: impl Into<String>, to_date: impl Into<String>) -> Self {
        self.from_date = Some(from_date.into());
        self.to_date = Some(to_date.into());
        self
    }

    /// Sets a new start date.
    pub fn from_date(mut self, from_date: impl Into<String>) -> Self {
        self.from_date = Some(from_date.into());
        self
    }

    /// Sets a new return date.
    pub fn to_date(mut self, to_date: impl Into<String>) -> Self {
        self.to_date = Some(to_date.into());
        self
    }

    /// Sets the payment flag.
    pub fn paid(mut self, paid: bool) -> Self {
        self.paid = Some(paid);
        self
    }

    /// Recomputes the amount from the current day rate.
    pub fn reprice(mut self) -> Self {
        self.reprice = true;
        self
    }
}

/// Move an order to the status named by a configured label.
#[derive(Debug, Clone)]
pub struct UpdateOrderStatus {
    pub order_id: OrderId,
    pub status: String,
}

impl UpdateOrderStatus {
    pub fn new(order_id: OrderId, status: impl Into<String>) -> Self {
        Self {
            order_id,
            status: status.into(),
        }
    }
}

/// Cancel an order.
#[derive(Debug, Clone)]
pub struct CancelOrder {
    pub order_id: OrderId,
}

impl CancelOrder {
    pub fn new(order_id: OrderId) -> Self {
        Self { order_id }
    }
}

/// List orders, newest first.
#[derive(Debug, Clone)]
pub struct ListOrders {
    pub car_id: Option<CarId>,
    pub customer_id: Option<CustomerId>,
    /// Status label to filter by.
    pub status: Option<String>,
    pub page: u32,
    pub limit: u32,
}

impl Default for ListOrders {
    fn default() -> Self {
        Self {
            car_id: None,
            customer_id: None,
            status: None,
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

/// Add a car to the fleet.
#[derive(Debug, Clone)]
pub struct CreateCar {
    pub make: String,
    pub model: String,
    pub year: i32,
    pub day_rate: Money,
}

/// Change a car's details. Unset fields keep their stored value.
#[derive(Debug, Clone)]
pub struct UpdateCar {
    pub car_id: CarId,
    pub make: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
    pub day_rate: Option<Money>,
}

impl UpdateCar {
    pub fn new(car_id: CarId) -> Self {
        Self {
            car_id,
            make: None,
            model: None,
            year: None,
            day_rate: None,
        }
    }
}

/// List cars, newest first.
#[derive(Debug, Clone)]
pub struct ListCars {
    /// Case-insensitive match against make and model.
    pub search: Option<String>,
    pub page: u32,
    pub limit: u32,
}

impl Default for ListCars {
    fn default() -> Self {
        Self {
            search: None,
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

/// List cars free for a whole period.
#[derive(Debug, Clone)]
pub struct ListAvailableCars {
    pub from_date: String,
    pub to_date: String,
    pub page: u32,
    pub limit: u32,
}

impl ListAvailableCars {
    pub fn new(from_date: impl Into<String>, to_date: impl Into<String>) -> Self {
        Self {
            from_date: from_date.into(),
            to_date: to_date.into(),
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

/// Register a customer.
///
/// `password_hash` is produced by the authentication layer and stored as is.
#[derive(Debug, Clone)]
pub struct RegisterCustomer {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub password_hash: String,
}

/// Change a customer's contact details. Unset fields keep their stored value.
#[derive(Debug, Clone)]
pub struct UpdateCustomer {
    pub customer_id: CustomerId,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl UpdateCustomer {
    pub fn new(customer_id: CustomerId) -> Self {
        Self {
            customer_id,
            first_name: None,
            last_name: None,
            email: None,
            phone: None,
        }
    }
}

/// Replace a customer's credential hash.
#[derive(Debug, Clone)]
pub struct ChangePassword {
    pub customer_id: CustomerId,
    pub password_hash: String,
}

impl ChangePassword {
    pub fn new(customer_id: CustomerId, password_hash: impl Into<String>) -> Self {
        Self {
            customer_id,
            password_hash: password_hash.into(),
        }
    }
}

/// List customers, newest first.
#[derive(Debug, Clone)]
pub struct ListCustomers {
    /// Case-insensitive match against names and email.
    pub search: Option<String>,
    pub page: u32,
    pub limit: u32,
}

impl Default for ListCustomers {
    fn default() -> Self {
        Self {
            search: None,
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}
