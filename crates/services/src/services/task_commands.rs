//! Task writes and the change notifications that follow them.
//!
//! Every write persists first. Only a committed change produces an event, and
//! the event is then handed to the webhook notifier and the queue publisher
//! concurrently. Their results are logged and dropped: the signature of each
//! command has no room for a delivery failure.

use std::{sync::Arc, time::Duration};

use db::{
    DBService,
    models::task::{CreateTask, Task, TaskValidationError, UpdateTask},
};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::{
    change_event::{ChangeEventType, InvalidEventError, TaskChangeEvent},
    config::NotificationConfig,
    notifications::{
        ChangeNotifier, DeliveryResultExt, NoopQueuePublisher, PublishError, QueuePublisher,
        SqliteQueuePublisher, WebhookNotifier, WebhookSetupError,
    },
};

/// Determines how change notifications run relative to the command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ExecutionMode {
    /// The command awaits both channels before returning.
    Inline,
    /// Notifications run via `tokio::spawn` with their own cancellation token
    /// and deadline; the command returns immediately.
    Spawned,
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Validation(#[from] TaskValidationError),
    #[error("Task {0} not found")]
    NotFound(Uuid),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("invalid change event: {0}")]
    InvalidChangeEvent(#[from] InvalidEventError),
}

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 50;

/// One-based page request. Out-of-range values are clamped.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    #[serde(default = "default_page_number", alias = "page_number")]
    pub page_number: u32,
    #[serde(default = "default_page_size", alias = "page_size")]
    pub page_size: u32,
}

fn default_page_number() -> u32 {
    1
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page_number: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    fn normalized(self) -> Self {
        Self {
            page_number: self.page_number.max(1),
            page_size: self.page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: u32,
    pub page_size: u32,
    pub total_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

/// Create, update and delete tasks, announcing every committed change.
#[derive(Clone)]
pub struct TaskCommandHandler {
    db: DBService,
    notifier: Arc<dyn ChangeNotifier>,
    publisher: Arc<dyn QueuePublisher>,
    mode: ExecutionMode,
    background_timeout: Duration,
}

impl TaskCommandHandler {
    pub fn new(
        db: DBService,
        notifier: Arc<dyn ChangeNotifier>,
        publisher: Arc<dyn QueuePublisher>,
    ) -> Self {
        Self {
            db,
            notifier,
            publisher,
            mode: ExecutionMode::Inline,
            background_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_execution_mode(mut self, mode: ExecutionMode, background_timeout: Duration) -> Self {
        self.mode = mode;
        self.background_timeout = background_timeout;
        self
    }

    /// Wires the webhook notifier and, when the queue is enabled, the durable
    /// publisher; otherwise the no-op publisher.
    pub fn from_config(
        db: DBService,
        config: &NotificationConfig,
    ) -> Result<Self, WebhookSetupError> {
        let notifier: Arc<dyn ChangeNotifier> = Arc::new(WebhookNotifier::new(&config.webhook)?);
        let publisher: Arc<dyn QueuePublisher> = if config.queue.enabled {
            Arc::new(SqliteQueuePublisher::new(
                db.pool.clone(),
                config.queue.destination.clone(),
            ))
        } else {
            Arc::new(NoopQueuePublisher)
        };
        Ok(Self::new(db, notifier, publisher)
            .with_execution_mode(config.mode, config.background_timeout))
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        self.mode
    }

    pub async fn create(
        &self,
        data: CreateTask,
        cancel: &CancellationToken,
    ) -> Result<Task, CommandError> {
        data.validate()?;
        let task = Task::create(&self.db.pool, &data, Uuid::new_v4()).await?;
        debug!(task_id = %task.id, "Task created");

        self.announce(TaskChangeEvent::from_task(&task, ChangeEventType::Created), cancel)
            .await?;
        Ok(task)
    }

    pub async fn update(
        &self,
        task_id: Uuid,
        data: UpdateTask,
        cancel: &CancellationToken,
    ) -> Result<Task, CommandError> {
        data.validate()?;
        let task = Task::update(&self.db.pool, task_id, &data)
            .await?
            .ok_or(CommandError::NotFound(task_id))?;
        debug!(task_id = %task.id, "Task updated");

        self.announce(TaskChangeEvent::from_task(&task, ChangeEventType::Updated), cancel)
            .await?;
        Ok(task)
    }

    /// Returns the task as it was before deletion.
    pub async fn delete(
        &self,
        task_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Task, CommandError> {
        let task = Task::delete(&self.db.pool, task_id)
            .await?
            .ok_or(CommandError::NotFound(task_id))?;
        debug!(task_id = %task.id, "Task deleted");

        self.announce(TaskChangeEvent::from_task(&task, ChangeEventType::Deleted), cancel)
            .await?;
        Ok(task)
    }

    pub async fn get(&self, task_id: Uuid) -> Result<Task, CommandError> {
        Task::find_by_id(&self.db.pool, task_id)
            .await?
            .ok_or(CommandError::NotFound(task_id))
    }

    /// Newest first.
    pub async fn list(&self, page: PageRequest) -> Result<Page<Task>, CommandError> {
        let page = page.normalized();
        let offset = i64::from(page.page_number - 1) * i64::from(page.page_size);
        let (items, total_count) =
            Task::find_paginated(&self.db.pool, i64::from(page.page_size), offset).await?;

        let total_pages = (total_count as u64).div_ceil(u64::from(page.page_size)) as u32;
        Ok(Page {
            items,
            pagination: Pagination {
                current_page: page.page_number,
                total_pages,
                page_size: page.page_size,
                total_count,
            },
        })
    }

    async fn announce(
        &self,
        event: TaskChangeEvent,
        cancel: &CancellationToken,
    ) -> Result<(), CommandError> {
        event.validate()?;

        match self.mode {
            ExecutionMode::Inline => {
                dispatch(self.notifier.as_ref(), self.publisher.as_ref(), &event, cancel).await;
            }
            ExecutionMode::Spawned => {
                let notifier = Arc::clone(&self.notifier);
                let publisher = Arc::clone(&self.publisher);
                let deadline = self.background_timeout;
                // Not tied to the request: an aborted request must not cancel these.
                let token = CancellationToken::new();

                tokio::spawn(async move {
                    let delivery = dispatch(notifier.as_ref(), publisher.as_ref(), &event, &token);
                    if tokio::time::timeout(deadline, delivery).await.is_err() {
                        token.cancel();
                        warn!(
                            task_id = %event.task_id(),
                            timeout_secs = deadline.as_secs(),
                            "Background notification timed out"
                        );
                    }
                });
            }
        }
        Ok(())
    }
}

/// Runs both channels side by side. Neither outcome affects the other.
async fn dispatch(
    notifier: &dyn ChangeNotifier,
    publisher: &dyn QueuePublisher,
    event: &TaskChangeEvent,
    cancel: &CancellationToken,
) {
    let (webhook, queue) = tokio::join!(
        notifier.notify(event, cancel),
        publisher.publish(event, cancel)
    );

    debug!(
        task_id = %event.task_id(),
        event_type = %event.event_type(),
        webhook_delivered = webhook.is_delivered(),
        queue_delivered = queue.is_delivered(),
        "Change notifications finished"
    );

    if let Err(PublishError::InvalidEvent(e)) = queue {
        error!(
            task_id = %event.task_id(),
            error = %e,
            "Queue publisher rejected a validated event"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_mode_parses_case_insensitively() {
        assert_eq!("inline".parse::<ExecutionMode>().unwrap(), ExecutionMode::Inline);
        assert_eq!("Spawned".parse::<ExecutionMode>().unwrap(), ExecutionMode::Spawned);
        assert!("later".parse::<ExecutionMode>().is_err());
    }

    #[test]
    fn test_page_request_is_clamped() {
        let page = PageRequest {
            page_number: 0,
            page_size: 500,
        }
        .normalized();
        assert_eq!(page.page_number, 1);
        assert_eq!(page.page_size, MAX_PAGE_SIZE);
    }
}
