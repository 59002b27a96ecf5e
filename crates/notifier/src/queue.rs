//! Fire-and-forget delivery of status changes.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use crate::{Notifier, StatusChange};

/// Bounded hand-off between the order lifecycle and a notifier.
///
/// [`NotificationQueue::enqueue`] never waits. When the buffer is full or the
/// worker has stopped, the message is dropped and counted in
/// `rental_notifications_dropped_total`.
#[derive(Debug, Clone)]
pub struct NotificationQueue {
    sender: mpsc::Sender<StatusChange>,
}

impl NotificationQueue {
    /// Creates a queue and the receiving end its worker drains.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<StatusChange>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Creates a queue and spawns a worker delivering to `notifier`.
    ///
    /// The worker stops once every clone of the queue has been dropped.
    pub fn start(notifier: Arc<dyn Notifier>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (queue, receiver) = Self::new(capacity);
        let worker = tokio::spawn(run_worker(receiver, notifier));
        (queue, worker)
    }

    /// Hands a message to the worker without waiting.
    ///
    /// Returns false if the message was dropped.
    pub fn enqueue(&self, change: StatusChange) -> bool {
        match self.sender.try_send(change) {
            Ok(()) => true,
            Err(TrySendError::Full(change)) => {
                tracing::warn!(order_id = %change.order_id, "notification queue full, dropping message");
                metrics::counter!("rental_notifications_dropped_total", "reason" => "full")
                    .increment(1);
                false
            }
            Err(TrySendError::Closed(change)) => {
                tracing::warn!(order_id = %change.order_id, "notification worker stopped, dropping message");
                metrics::counter!("rental_notifications_dropped_total", "reason" => "closed")
                    .increment(1);
                false
            }
        }
    }
}

/// Delivers queued messages one at a time until the queue closes.
///
/// Send failures are logged and the message is discarded.
pub async fn run_worker(mut receiver: mpsc::Receiver<StatusChange>, notifier: Arc<dyn Notifier>) {
    while let Some(change) = receiver.recv().await {
        match notifier.send(&change).await {
            Ok(()) => {
                tracing::debug!(order_id = %change.order_id, to = %change.to, "notification sent");
                metrics::counter!("rental_notifications_sent_total").increment(1);
            }
            Err(error) => {
                tracing::warn!(order_id = %change.order_id, %error, "notification failed");
                metrics::counter!("rental_notifications_failed_total").increment(1);
            }
        }
    }
    tracing::debug!("notification worker stopped");
}
