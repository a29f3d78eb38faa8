//! Consumer side of the queue channel: turn raw payloads into event log
//! entries, and the worker loop that feeds it from the durable queue.

use std::sync::Arc;

use db::models::queue_message::QueueMessage;
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::{sync::Semaphore, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    change_event::TaskChangeEvent,
    config::ConsumerConfig,
    event_log::{EventLog, EventLogEntry, EventLogError, EventSource},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("empty or null payload")]
    EmptyPayload,
    #[error("malformed payload: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConsumeOutcome {
    Logged(EventLogEntry),
    Skipped(SkipReason),
}

/// Validates received change events and records them in the event log.
///
/// A nil task id is only a warning here, even though producers refuse to
/// send one.
#[derive(Clone)]
pub struct TaskChangeEventConsumer {
    log: Arc<dyn EventLog>,
}

impl TaskChangeEventConsumer {
    pub fn new(log: Arc<dyn EventLog>) -> Self {
        Self { log }
    }

    /// Parses and records one raw message. Payloads that can never become an
    /// event are logged and skipped; only an event log failure is an error.
    pub async fn consume(&self, payload: &[u8]) -> Result<ConsumeOutcome, EventLogError> {
        if payload.iter().all(u8::is_ascii_whitespace) {
            error!("Received null task change event");
            return Ok(ConsumeOutcome::Skipped(SkipReason::EmptyPayload));
        }

        let event = match serde_json::from_slice::<Option<TaskChangeEvent>>(payload) {
            Ok(Some(event)) => event,
            Ok(None) => {
                error!("Received null task change event");
                return Ok(ConsumeOutcome::Skipped(SkipReason::EmptyPayload));
            }
            Err(e) => {
                error!(error = %e, "Failed to deserialize task change event");
                return Ok(ConsumeOutcome::Skipped(SkipReason::Malformed(e.to_string())));
            }
        };

        self.record(event).await.map(ConsumeOutcome::Logged)
    }

    pub async fn record(&self, event: TaskChangeEvent) -> Result<EventLogEntry, EventLogError> {
        if event.task_id().is_nil() {
            warn!(
                event_type = %event.event_type(),
                "Received task change event with empty TaskId"
            );
        }

        info!(
            task_id = %event.task_id(),
            event_type = %event.event_type(),
            title = %event.title(),
            status = %event.status(),
            event_timestamp = %event.event_timestamp(),
            "Processing task change event"
        );
        if !event.description().is_empty() {
            debug!(
                task_id = %event.task_id(),
                description = %event.description(),
                "Task description"
            );
        }

        self.log.append(event, EventSource::Queue).await
    }
}

/// Long-lived loop claiming messages from the durable queue.
///
/// Each claimed message is processed on its own task, at most
/// `concurrency` at a time. A processed message is acknowledged; a skipped
/// one is dead-lettered; an event log failure releases it for redelivery
/// until `max_deliveries` is reached.
#[derive(Clone)]
pub struct QueueWorker {
    pool: SqlitePool,
    consumer: TaskChangeEventConsumer,
    config: ConsumerConfig,
}

impl QueueWorker {
    pub fn new(pool: SqlitePool, consumer: TaskChangeEventConsumer, config: ConsumerConfig) -> Self {
        Self {
            pool,
            consumer,
            config,
        }
    }

    /// Runs until `shutdown` is cancelled, then waits for in-flight messages.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            destination = %self.config.destination,
            concurrency = self.config.concurrency,
            "Queue worker started"
        );

        let permits = Arc::new(Semaphore::new(self.config.concurrency));
        let mut in_flight = JoinSet::new();

        loop {
            while let Some(result) = in_flight.try_join_next() {
                if let Err(e) = result {
                    error!(error = %e, "Queue message task panicked");
                }
            }

            let permit = tokio::select! {
                _ = shutdown.cancelled() => break,
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            match QueueMessage::claim_next(
                &self.pool,
                &self.config.destination,
                self.config.visibility_timeout,
            )
            .await
            {
                Ok(Some(message)) => {
                    let worker = self.clone();
                    in_flight.spawn(async move {
                        let _permit = permit;
                        worker.handle(message).await;
                    });
                    continue;
                }
                Ok(None) => drop(permit),
                Err(e) => {
                    drop(permit);
                    error!(error = %e, "Failed to claim queue message");
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        info!(in_flight = in_flight.len(), "Queue worker draining");
        while let Some(result) = in_flight.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Queue message task panicked");
            }
        }
        info!("Queue worker stopped");
    }

    async fn handle(&self, message: QueueMessage) {
        let settled = match self.consumer.consume(message.payload.as_bytes()).await {
            Ok(ConsumeOutcome::Logged(entry)) => {
                debug!(message_id = %message.id, sequence = entry.sequence, "Acknowledging message");
                QueueMessage::ack(&self.pool, message.id).await
            }
            Ok(ConsumeOutcome::Skipped(reason)) => {
                warn!(message_id = %message.id, reason = %reason, "Dead-lettering message");
                QueueMessage::dead_letter(&self.pool, message.id, &reason.to_string()).await
            }
            Err(e) if message.delivery_count >= self.config.max_deliveries => {
                error!(
                    message_id = %message.id,
                    deliveries = message.delivery_count,
                    error = %e,
                    "Giving up on message"
                );
                QueueMessage::dead_letter(&self.pool, message.id, &e.to_string()).await
            }
            Err(e) => {
                warn!(
                    message_id = %message.id,
                    deliveries = message.delivery_count,
                    error = %e,
                    "Event log append failed, releasing message for retry"
                );
                QueueMessage::release(
                    &self.pool,
                    message.id,
                    self.config.retry_delay,
                    &e.to_string(),
                )
                .await
            }
        };

        if let Err(e) = settled {
            error!(message_id = %message.id, error = %e, "Failed to settle queue message");
        }
    }
}
