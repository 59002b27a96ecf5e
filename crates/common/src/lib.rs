//! Shared value types for the car rental booking system.

pub mod money;
pub mod period;
pub mod records;
pub mod status;
pub mod types;

pub use money::Money;
pub use period::{DATE_FORMAT, PeriodError, RentalPeriod, parse_date};
pub use records::{Car, Customer, Order, Version};
pub use status::OrderStatus;
pub use types::{CarId, CustomerId, OrderId};
