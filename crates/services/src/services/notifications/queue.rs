use async_trait::async_trait;
use db::models::queue_message::QueueMessage;
use sqlx::SqlitePool;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::{DeliveryError, DeliveryOutcome};
use crate::services::change_event::{InvalidEventError, TaskChangeEvent};

/// `InvalidEvent` is a producer bug and must reach the caller. `Delivery`
/// covers everything downstream and is safe to discard.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    InvalidEvent(#[from] InvalidEventError),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

/// Asynchronous notification channel (the message queue).
#[async_trait]
pub trait QueuePublisher: Send + Sync {
    async fn publish(
        &self,
        event: &TaskChangeEvent,
        cancel: &CancellationToken,
    ) -> Result<DeliveryOutcome, PublishError>;
}

/// Used when the queue is administratively disabled. Still rejects invalid
/// events so the producer contract does not depend on configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopQueuePublisher;

#[async_trait]
impl QueuePublisher for NoopQueuePublisher {
    async fn publish(
        &self,
        event: &TaskChangeEvent,
        _cancel: &CancellationToken,
    ) -> Result<DeliveryOutcome, PublishError> {
        event.validate()?;
        debug!(
            task_id = %event.task_id(),
            event_type = %event.event_type(),
            "Queue disabled, skipping publish"
        );
        Ok(DeliveryOutcome::Skipped)
    }
}

/// Publishes events into the durable `queue_messages` table.
#[derive(Debug, Clone)]
pub struct SqliteQueuePublisher {
    pool: SqlitePool,
    destination: String,
}

impl SqliteQueuePublisher {
    pub fn new(pool: SqlitePool, destination: impl Into<String>) -> Self {
        Self {
            pool,
            destination: destination.into(),
        }
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    async fn enqueue(
        &self,
        event: &TaskChangeEvent,
        cancel: &CancellationToken,
    ) -> Result<Uuid, DeliveryError> {
        if cancel.is_cancelled() {
            return Err(DeliveryError::Cancelled);
        }
        let payload = serde_json::to_string(event)?;
        let message = QueueMessage::enqueue(&self.pool, &self.destination, &payload).await?;
        Ok(message.id)
    }
}

#[async_trait]
impl QueuePublisher for SqliteQueuePublisher {
    async fn publish(
        &self,
        event: &TaskChangeEvent,
        cancel: &CancellationToken,
    ) -> Result<DeliveryOutcome, PublishError> {
        event.validate()?;

        info!(
            task_id = %event.task_id(),
            event_type = %event.event_type(),
            destination = %self.destination,
            "Publishing task change event"
        );

        match self.enqueue(event, cancel).await {
            Ok(message_id) => {
                info!(
                    task_id = %event.task_id(),
                    message_id = %message_id,
                    destination = %self.destination,
                    "Task change event published"
                );
                Ok(DeliveryOutcome::Delivered)
            }
            Err(DeliveryError::Cancelled) => {
                debug!(task_id = %event.task_id(), "Publish cancelled before enqueue");
                Err(DeliveryError::Cancelled.into())
            }
            Err(e) => {
                error!(
                    task_id = %event.task_id(),
                    destination = %self.destination,
                    error = %e,
                    "Failed to publish task change event"
                );
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use db::DBService;

    use super::*;
    use crate::services::change_event::ChangeEventType;

    fn event(task_id: Uuid) -> TaskChangeEvent {
        TaskChangeEvent::new(task_id, ChangeEventType::Created, "Title", "", "New")
    }

    #[tokio::test]
    async fn test_noop_skips_valid_events() {
        let outcome = NoopQueuePublisher
            .publish(&event(Uuid::new_v4()), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, DeliveryOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_every_publisher_rejects_nil_task_id() {
        let db = DBService::new_in_memory().await.unwrap();
        let sqlite = SqliteQueuePublisher::new(db.pool.clone(), "task-change-events");
        let token = CancellationToken::new();

        let noop = NoopQueuePublisher.publish(&event(Uuid::nil()), &token).await;
        assert!(matches!(noop, Err(PublishError::InvalidEvent(_))));

        let durable = sqlite.publish(&event(Uuid::nil()), &token).await;
        assert!(matches!(durable, Err(PublishError::InvalidEvent(_))));

        assert_eq!(
            QueueMessage::count_pending(&db.pool, "task-change-events")
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_sqlite_publisher_enqueues_wire_payload() {
        let db = DBService::new_in_memory().await.unwrap();
        let publisher = SqliteQueuePublisher::new(db.pool.clone(), "task-change-events");
        let sent = event(Uuid::new_v4());

        let outcome = publisher
            .publish(&sent, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, DeliveryOutcome::Delivered);

        let message = QueueMessage::claim_next(
            &db.pool,
            "task-change-events",
            std::time::Duration::from_secs(30),
        )
        .await
        .unwrap()
        .unwrap();
        let received: TaskChangeEvent = serde_json::from_str(&message.payload).unwrap();
        assert_eq!(received, sent);
    }

    #[tokio::test]
    async fn test_broker_down_is_a_delivery_error() {
        let db = DBService::new_in_memory().await.unwrap();
        let publisher = SqliteQueuePublisher::new(db.pool.clone(), "task-change-events");
        db.pool.close().await;

        let result = publisher
            .publish(&event(Uuid::new_v4()), &CancellationToken::new())
            .await;
        assert!(matches!(
            result,
            Err(PublishError::Delivery(DeliveryError::Queue(_)))
        ));
    }

    #[tokio::test]
    async fn test_cancelled_before_enqueue() {
        let db = DBService::new_in_memory().await.unwrap();
        let publisher = SqliteQueuePublisher::new(db.pool.clone(), "task-change-events");
        let token = CancellationToken::new();
        token.cancel();

        let result = publisher.publish(&event(Uuid::new_v4()), &token).await;
        assert!(matches!(
            result,
            Err(PublishError::Delivery(DeliveryError::Cancelled))
        ));
    }
}
