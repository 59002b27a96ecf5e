//! Domain layer for the car rental booking system.
//!
//! This crate provides:
//! - [`AvailabilityChecker`] deciding whether a car is free for a period
//! - [`StatusMachine`] enforcing the order lifecycle
//! - [`OrderLifecycleService`] creating, rescheduling and moving orders
//! - [`CarService`] and [`CustomerService`] for the fleet and customers
//! - [`RentalBackend`] wiring all of the above over one store
//!
//! Every operation takes a [`RequestContext`] whose deadline bounds all
//! storage calls and lock waits made on its behalf.

pub mod availability;
pub mod backend;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod inventory;
pub mod lock;
pub mod service;
pub mod status;

pub use availability::AvailabilityChecker;
pub use backend::{RentalBackend, start_notifications};
pub use commands::{
    CancelOrder, ChangePassword, CreateCar, CreateOrder, ListAvailableCars, ListCars,
    ListCustomers, ListOrders, RegisterCustomer, UpdateCar, UpdateCustomer, UpdateOrder,
    UpdateOrderStatus, parse_id, validate_page,
};
pub use config::RentalConfig;
pub use context::RequestContext;
pub use error::{ErrorKind, RentalError, Result};
pub use inventory::{CarService, CustomerService};
pub use lock::{CarGuard, CarLocks};
pub use service::OrderLifecycleService;
pub use status::{DEFAULT_STATUS_LABELS, StatusLabels, StatusMachine};
