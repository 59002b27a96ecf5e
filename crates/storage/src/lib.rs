//! Persistence gateway for the car rental booking system.
//!
//! The [`RentalStore`] trait is the only way the domain touches stored cars,
//! customers and orders. Two backends are provided:
//! - [`InMemoryRentalStore`] for tests and local runs
//! - [`PostgresRentalStore`] backed by sqlx

pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

pub use error::{Result, StorageError};
pub use memory::InMemoryRentalStore;
pub use postgres::PostgresRentalStore;
pub use query::{
    CarPage, CarQuery, CustomerPage, CustomerQuery, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT, OrderPage,
    OrderQuery, Page,
};
pub use store::{RentalStore, RentalStoreExt};
