//! Car fleet and customer management.

use chrono::{Datelike, Utc};
use common::{Car, CarId, Customer, CustomerId, Money, RentalPeriod};
use storage::{CarPage, CarQuery, CustomerPage, CustomerQuery, RentalStore, RentalStoreExt};

use crate::commands::{
    ChangePassword, CreateCar, ListAvailableCars, ListCars, ListCustomers, RegisterCustomer,
    UpdateCar, UpdateCustomer, validate_page,
};
use crate::lock::CarLocks;
use crate::{RentalError, RequestContext, Result};

fn validate_car(year: i32, day_rate: Money) -> Result<()> {
    let max_year = Utc::now().year() + 1;
    if year <= 0 || year > max_year {
        return Err(RentalError::validation(
            "year",
            format!("must be between 1 and {max_year}"),
        ));
    }
    if !day_rate.is_positive() {
        return Err(RentalError::validation("day_rate", "must be positive"));
    }
    Ok(())
}

fn require_text(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(RentalError::validation(field, "must not be empty"));
    }
    Ok(())
}

/// Manages the cars that can be rented.
pub struct CarService<S> {
    store: S,
    locks: CarLocks,
}

impl<S: RentalStore> CarService<S> {
    /// Creates a service over `store`, sharing `locks` with the order
    /// lifecycle so a car cannot be deleted while it is being booked.
    pub fn new(store: S, locks: CarLocks) -> Self {
        Self { store, locks }
    }

    /// Adds a car to the fleet.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn create_car(&self, ctx: &RequestContext, cmd: CreateCar) -> Result<CarId> {
        validate_car(cmd.year, cmd.day_rate)?;

        let now = Utc::now();
        let car = Car {
            id: CarId::new(),
            make: cmd.make,
            model: cmd.model,
            year: cmd.year,
            day_rate: cmd.day_rate,
            created_at: now,
            updated_at: now,
        };
        let car_id = car.id;
        ctx.run("create_car", self.store.insert_car(car)).await?;

        tracing::info!(%car_id, "car created");
        Ok(car_id)
    }

    /// Loads a car.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn get_car(&self, ctx: &RequestContext, car_id: CarId) -> Result<Car> {
        ctx.run("get_car", self.store.require_car(car_id)).await
    }

    /// Changes a car's details.
    ///
    /// The new day rate applies to orders placed afterwards; existing orders
    /// keep their amount.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn update_car(&self, ctx: &RequestContext, cmd: UpdateCar) -> Result<Car> {
        const OP: &str = "update_car";

        let mut car = ctx.run(OP, self.store.require_car(cmd.car_id)).await?;
        if let Some(make) = cmd.make {
            car.make = make;
        }
        if let Some(model) = cmd.model {
            car.model = model;
        }
        car.year = cmd.year.unwrap_or(car.year);
        car.day_rate = cmd.day_rate.unwrap_or(car.day_rate);
        validate_car(car.year, car.day_rate)?;
        car.updated_at = Utc::now();

        ctx.run(OP, self.store.update_car(car)).await
    }

    /// Removes a car from the fleet.
    ///
    /// Fails with `Referenced` while the car has an order that is neither
    /// completed nor cancelled; finished orders are removed with the car.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn delete_car(&self, ctx: &RequestContext, car_id: CarId) -> Result<()> {
        const OP: &str = "delete_car";

        let _guard = ctx.bound(OP, self.locks.lock(car_id)).await?;
        ctx.run(OP, self.store.delete_car(car_id)).await?;

        tracing::info!(%car_id, "car deleted");
        Ok(())
    }

    /// Lists cars, newest first.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn list_cars(&self, ctx: &RequestContext, cmd: ListCars) -> Result<CarPage> {
        let page = validate_page(cmd.page, cmd.limit)?;
        let query = CarQuery {
            search: cmd.search,
            page,
        };
        ctx.run("list_cars", self.store.list_cars(query)).await
    }

    /// Lists cars with no booking overlapping the requested period.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn list_available_cars(
        &self,
        ctx: &RequestContext,
        cmd: ListAvailableCars,
    ) -> Result<CarPage> {
        let period = RentalPeriod::parse(&cmd.from_date, &cmd.to_date)?;
        let page = validate_page(cmd.page, cmd.limit)?;
        ctx.run(
            "list_available_cars",
            self.store.list_available_cars(period, page),
        )
        .await
    }
}

/// Manages registered customers.
pub struct CustomerService<S> {
    store: S,
}

impl<S: RentalStore> CustomerService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Registers a customer.
    #[tracing::instrument(skip(self, ctx, cmd), fields(email = %cmd.email))]
    pub async fn register_customer(
        &self,
        ctx: &RequestContext,
        cmd: RegisterCustomer,
    ) -> Result<CustomerId> {
        let customer = Customer {
            id: CustomerId::new(),
            first_name: cmd.first_name,
            last_name: cmd.last_name,
            email: cmd.email,
            phone: cmd.phone,
            password_hash: cmd.password_hash,
            created_at: Utc::now(),
        };
        let customer_id = customer.id;
        ctx.run("register_customer", self.store.insert_customer(customer))
            .await?;

        tracing::info!(%customer_id, "customer registered");
        Ok(customer_id)
    }

    /// Loads a customer.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn get_customer(
        &self,
        ctx: &RequestContext,
        customer_id: CustomerId,
    ) -> Result<Customer> {
        ctx.run("get_customer", self.store.require_customer(customer_id))
            .await
    }

    /// Changes a customer's name, email or phone.
    #[tracing::instrument(skip(self, ctx, cmd), fields(customer_id = %cmd.customer_id))]
    pub async fn update_customer(
        &self,
        ctx: &RequestContext,
        cmd: UpdateCustomer,
    ) -> Result<Customer> {
        const OP: &str = "update_customer";

        for (field, value) in [
            ("first_name", &cmd.first_name),
            ("last_name", &cmd.last_name),
            ("email", &cmd.email),
            ("phone", &cmd.phone),
        ] {
            if let Some(value) = value {
                require_text(field, value)?;
            }
        }

        let mut customer = ctx
            .run(OP, self.store.require_customer(cmd.customer_id))
            .await?;
        if let Some(first_name) = cmd.first_name {
            customer.first_name = first_name;
        }
        if let Some(last_name) = cmd.last_name {
            customer.last_name = last_name;
        }
        if let Some(email) = cmd.email {
            customer.email = email;
        }
        if let Some(phone) = cmd.phone {
            customer.phone = phone;
        }

        let stored = ctx.run(OP, self.store.update_customer(customer)).await?;
        tracing::info!(customer_id = %stored.id, "customer updated");
        Ok(stored)
    }

    /// Replaces the credential hash used to log the customer in.
    #[tracing::instrument(skip(self, ctx, cmd), fields(customer_id = %cmd.customer_id))]
    pub async fn update_password_hash(
        &self,
        ctx: &RequestContext,
        cmd: ChangePassword,
    ) -> Result<()> {
        require_text("password_hash", &cmd.password_hash)?;
        ctx.run(
            "update_password_hash",
            self.store
                .update_customer_password(cmd.customer_id, cmd.password_hash),
        )
        .await?;
        tracing::info!(customer_id = %cmd.customer_id, "customer password changed");
        Ok(())
    }

    /// Looks a customer up by phone number, as done at login.
    ///
    /// The returned record carries the stored credential hash.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn find_customer_by_phone(
        &self,
        ctx: &RequestContext,
        phone: &str,
    ) -> Result<Customer> {
        let phone = phone.trim();
        require_text("phone", phone)?;
        ctx.run("find_customer_by_phone", self.store.find_customer_by_phone(phone))
            .await?
            .ok_or_else(|| RentalError::NotFound {
                entity: "customer",
                id: phone.to_string(),
            })
    }

    /// Lists customers, newest first.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn list_customers(
        &self,
        ctx: &RequestContext,
        cmd: ListCustomers,
    ) -> Result<CustomerPage> {
        let page = validate_page(cmd.page, cmd.limit)?;
        let query = CustomerQuery {
            search: cmd.search,
            page,
        };
        ctx.run("list_customers", self.store.list_customers(query))
            .await
    }

    /// Removes a customer.
    ///
    /// Fails with `Referenced` while the customer has an open order.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn delete_customer(&self, ctx: &RequestContext, customer_id: CustomerId) -> Result<()> {
        ctx.run("delete_customer", self.store.delete_customer(customer_id))
            .await?;
        tracing::info!(%customer_id, "customer deleted");
        Ok(())
    }
}
