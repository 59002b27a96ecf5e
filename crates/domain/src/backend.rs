//! Wiring of the rental services over one store.

use std::sync::Arc;

use notifier::{NotificationQueue, Notifier, TelegramNotifier};
use storage::{PostgresRentalStore, RentalStore};
use tokio::task::JoinHandle;

use crate::config::RentalConfig;
use crate::inventory::{CarService, CustomerService};
use crate::lock::CarLocks;
use crate::service::OrderLifecycleService;
use crate::status::StatusMachine;
use crate::{RentalError, RequestContext, Result};

/// The rental core: orders, cars and customers over a shared store.
///
/// All services share one [`CarLocks`] table so that booking, rescheduling
/// and deleting a car are serialized per car.
pub struct RentalBackend<S: RentalStore> {
    pub orders: OrderLifecycleService<S>,
    pub cars: CarService<S>,
    pub customers: CustomerService<S>,
    config: RentalConfig,
}

impl<S: RentalStore + Clone> RentalBackend<S> {
    /// Builds the services over `store`.
    ///
    /// With a queue, status changes are published to it.
    pub fn new(store: S, config: &RentalConfig, notifications: Option<NotificationQueue>) -> Self {
        let locks = CarLocks::new();
        let machine = StatusMachine::new(config.status_labels.clone());

        let mut orders = OrderLifecycleService::new(store.clone(), machine, locks.clone());
        if let Some(queue) = notifications {
            orders = orders.with_notifications(queue);
        }

        Self {
            orders,
            cars: CarService::new(store.clone(), locks),
            customers: CustomerService::new(store),
            config: config.clone(),
        }
    }

    /// Starts a request bounded by the configured operation timeout.
    pub fn context(&self) -> RequestContext {
        RequestContext::with_timeout(self.config.operation_timeout)
    }

    /// Returns the configuration the backend was built with.
    pub fn config(&self) -> &RentalConfig {
        &self.config
    }
}

impl RentalBackend<PostgresRentalStore> {
    /// Connects to `DATABASE_URL`, applies migrations and starts the
    /// Telegram notifier if it is configured.
    pub async fn connect(config: &RentalConfig) -> Result<(Self, Option<JoinHandle<()>>)> {
        const OP: &str = "connect";

        let url = config
            .database_url
            .as_deref()
            .ok_or_else(|| RentalError::validation("DATABASE_URL", "is not set"))?;
        let store = PostgresRentalStore::connect(url, config.db_max_connections, config.operation_timeout)
            .await
            .map_err(|e| RentalError::storage(OP, e))?;
        store
            .run_migrations()
            .await
            .map_err(|e| RentalError::storage(OP, e))?;

        let (queue, worker) = match start_notifications(config)? {
            Some((queue, worker)) => (Some(queue), Some(worker)),
            None => (None, None),
        };
        Ok((Self::new(store, config, queue), worker))
    }
}

/// Starts the notification worker for the configured chat, if any.
pub fn start_notifications(
    config: &RentalConfig,
) -> Result<Option<(NotificationQueue, JoinHandle<()>)>> {
    let Some(telegram) = config.telegram.clone() else {
        tracing::info!("telegram notifications disabled");
        return Ok(None);
    };

    let notifier = TelegramNotifier::new(telegram).map_err(|e| {
        RentalError::validation("TELEGRAM_BOT_TOKEN", e.to_string())
    })?;
    let notifier: Arc<dyn Notifier> = Arc::new(notifier);
    Ok(Some(NotificationQueue::start(
        notifier,
        config.notify_queue_capacity,
    )))
}
