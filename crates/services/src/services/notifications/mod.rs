//! Downstream channels a task change is announced on.
//!
//! Both channels are best effort: they return an explicit result for the
//! caller to log, and no failure here is ever allowed to fail the write that
//! produced the event.

pub mod queue;
pub mod webhook;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::change_event::TaskChangeEvent;

pub use queue::{NoopQueuePublisher, PublishError, QueuePublisher, SqliteQueuePublisher};
pub use webhook::{WebhookNotifier, WebhookSetupError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// The channel is not configured; nothing was sent.
    Skipped,
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("request timed out")]
    Timeout,
    #[error("downstream unavailable: {0}")]
    Unavailable(String),
    #[error("rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("delivery cancelled")]
    Cancelled,
    #[error("failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("queue error: {0}")]
    Queue(#[from] sqlx::Error),
    #[error("unexpected delivery failure: {0}")]
    Unexpected(String),
}

/// Boolean view of a delivery attempt, for logging.
pub trait DeliveryResultExt {
    fn is_delivered(&self) -> bool;
}

impl<E> DeliveryResultExt for Result<DeliveryOutcome, E> {
    fn is_delivered(&self) -> bool {
        matches!(self, Ok(DeliveryOutcome::Delivered))
    }
}

/// Synchronous notification channel (the webhook).
#[async_trait]
pub trait ChangeNotifier: Send + Sync {
    async fn notify(
        &self,
        event: &TaskChangeEvent,
        cancel: &CancellationToken,
    ) -> Result<DeliveryOutcome, DeliveryError>;
}
