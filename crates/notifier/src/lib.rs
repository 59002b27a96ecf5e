//! Status-change notifications for rental orders.
//!
//! Notifications are a side channel: the order lifecycle enqueues a
//! [`StatusChange`] on a [`NotificationQueue`] and moves on, while a background
//! worker hands it to a [`Notifier`]. Delivery is at most once.

pub mod error;
pub mod memory;
pub mod message;
pub mod queue;
pub mod telegram;

use async_trait::async_trait;

pub use error::{NotifyError, Result};
pub use memory::InMemoryNotifier;
pub use message::StatusChange;
pub use queue::NotificationQueue;
pub use telegram::{TelegramConfig, TelegramNotifier};

/// A sink for order status-change messages.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers one message.
    async fn send(&self, change: &StatusChange) -> Result<()>;
}
