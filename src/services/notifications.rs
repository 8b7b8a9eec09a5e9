//! Book availability notifications
//!
//! Borrow and return publish an event once their transaction has committed.
//! Delivery is best effort: a failed publish is logged and the operation still
//! succeeds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use utoipa::ToSchema;

/// Published whenever a book's availability flips
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BookAvailabilityEvent {
    pub book_id: i64,
    pub isbn: String,
    pub available: bool,
    /// Borrowing that caused the change
    pub borrowing_id: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification channel closed")]
    Closed,

    #[error("notification rejected: {0}")]
    Rejected(String),
}

/// Sink for availability events
#[cfg_attr(test, mockall::automock)]
pub trait AvailabilityNotifier: Send + Sync {
    fn publish(&self, event: BookAvailabilityEvent) -> Result<(), NotifyError>;
}

/// In-process fan-out to every live subscriber (the SSE stream)
#[derive(Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<BookAvailabilityEvent>,
}

impl BroadcastNotifier {
    pub const DEFAULT_CAPACITY: usize = 256;

    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BookAvailabilityEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl AvailabilityNotifier for BroadcastNotifier {
    fn publish(&self, event: BookAvailabilityEvent) -> Result<(), NotifyError> {
        match self.sender.send(event) {
            Ok(receivers) => {
                tracing::debug!(receivers, "availability event delivered");
                Ok(())
            }
            // Nobody listening is not a failure
            Err(broadcast::error::SendError(event)) => {
                tracing::trace!(book_id = event.book_id, "no availability subscribers");
                Ok(())
            }
        }
    }
}

/// Publish and swallow the outcome, logging failures
pub fn publish_best_effort(notifier: &dyn AvailabilityNotifier, event: BookAvailabilityEvent) {
    let book_id = event.book_id;
    if let Err(e) = notifier.publish(event) {
        tracing::warn!(book_id, error = %e, "Failed to publish availability event");
    }
}
