use common::{Car, CarId, Customer, CustomerId, Order, OrderStatus};

/// Default number of rows per page.
pub const DEFAULT_PAGE_LIMIT: u32 = 10;

/// Largest page a caller may request.
pub const MAX_PAGE_LIMIT: u32 = 100;

/// One-based page selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// Page number, starting at 1.
    pub page: u32,

    /// Maximum number of rows on the page.
    pub limit: u32,
}

impl Page {
    /// Creates a page selector.
    pub fn new(page: u32, limit: u32) -> Self {
        Self { page, limit }
    }

    /// Number of rows to skip. Page 0 is treated as page 1.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

/// Filter for listing orders.
#[derive(Debug, Clone, Default)]
pub struct OrderQuery {
    /// Only orders for this car.
    pub car_id: Option<CarId>,

    /// Only orders placed by this customer.
    pub customer_id: Option<CustomerId>,

    /// Only orders in this status.
    pub status: Option<OrderStatus>,

    /// Page to return.
    pub page: Page,
}

impl OrderQuery {
    /// Creates a query matching every order.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters by car.
    pub fn car(mut self, car_id: CarId) -> Self {
        self.car_id = Some(car_id);
        self
    }

    /// Filters by customer.
    pub fn customer(mut self, customer_id: CustomerId) -> Self {
        self.customer_id = Some(customer_id);
        self
    }

    /// Filters by status.
    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Selects a page.
    pub fn page(mut self, page: u32, limit: u32) -> Self {
        self.page = Page::new(page, limit);
        self
    }

    /// Returns true if the order passes every filter.
    pub fn matches(&self, order: &Order) -> bool {
        if let Some(car_id) = self.car_id
            && order.car_id != car_id
        {
            return false;
        }
        if let Some(customer_id) = self.customer_id
            && order.customer_id != customer_id
        {
            return false;
        }
        if let Some(status) = self.status
            && order.status != status
        {
            return false;
        }
        true
    }
}

/// Filter for listing cars.
#[derive(Debug, Clone, Default)]
pub struct CarQuery {
    /// Case-insensitive substring matched against make and model.
    pub search: Option<String>,

    /// Page to return.
    pub page: Page,
}

impl CarQuery {
    /// Creates a query matching every car.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters by a search term.
    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    /// Selects a page.
    pub fn page(mut self, page: u32, limit: u32) -> Self {
        self.page = Page::new(page, limit);
        self
    }

    /// Returns true if the car passes the search filter.
    pub fn matches(&self, car: &Car) -> bool {
        match self.search.as_deref() {
            None | Some("") => true,
            Some(term) => {
                let term = term.to_lowercase();
                car.make.to_lowercase().contains(&term) || car.model.to_lowercase().contains(&term)
            }
        }
    }
}

/// Filter for listing customers.
#[derive(Debug, Clone, Default)]
pub struct CustomerQuery {
    /// Case-insensitive substring matched against names and email.
    pub search: Option<String>,

    /// Page to return.
    pub page: Page,
}

impl CustomerQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    pub fn page(mut self, page: u32, limit: u32) -> Self {
        self.page = Page::new(page, limit);
        self
    }

    /// Returns true if the customer passes the search filter.
    pub fn matches(&self, customer: &Customer) -> bool {
        match self.search.as_deref() {
            None | Some("") => true,
            Some(term) => {
                let term = term.to_lowercase();
                [&customer.first_name, &customer.last_name, &customer.email]
                    .iter()
                    .any(|field| field.to_lowercase().contains(&term))
            }
        }
    }
}

/// A page of orders plus the number of orders matching the filter.
#[derive(Debug, Clone, Default)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub total: u64,
}

/// A page of cars plus the number of cars matching the filter.
#[derive(Debug, Clone, Default)]
pub struct CarPage {
    pub cars: Vec<Car>,
    pub total: u64,
}

/// A page of customers plus the number of customers matching the filter.
#[derive(Debug, Clone, Default)]
pub struct CustomerPage {
    pub customers: Vec<Customer>,
    pub total: u64,
}

/// Slices an already filtered and sorted list down to one page.
pub(crate) fn paginate<T>(items: Vec<T>, page: Page) -> (Vec<T>, u64) {
    let total = items.len() as u64;
    let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
    let rows = items
        .into_iter()
        .skip(offset)
        .take(page.limit as usize)
        .collect();
    (rows, total)
}
