//! Shared state handed to the axum routers of both binaries.

use std::sync::Arc;

use db::DBService;
use services::services::{
    config::{ConfigError, NotificationConfig},
    event_log::EventLog,
    notifications::WebhookSetupError,
    task_commands::TaskCommandHandler,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Webhook(#[from] WebhookSetupError),
}

/// State of the task API: the command handler wired to both notification
/// channels.
#[derive(Clone)]
pub struct TaskApiDeployment {
    db: DBService,
    tasks: TaskCommandHandler,
}

impl TaskApiDeployment {
    pub async fn new() -> Result<Self, DeploymentError> {
        let db = DBService::new().await?;
        let config = NotificationConfig::from_env()?;
        Self::from_config(db, &config)
    }

    pub fn from_config(db: DBService, config: &NotificationConfig) -> Result<Self, DeploymentError> {
        tracing::info!(
            webhook = config.webhook.base_url.as_ref().map(|u| u.as_str()).unwrap_or("disabled"),
            queue_enabled = config.queue.enabled,
            mode = %config.mode,
            "Notification channels configured"
        );
        let tasks = TaskCommandHandler::from_config(db.clone(), config)?;
        Ok(Self { db, tasks })
    }

    pub fn with_handler(db: DBService, tasks: TaskCommandHandler) -> Self {
        Self { db, tasks }
    }

    pub fn db(&self) -> &DBService {
        &self.db
    }

    pub fn tasks(&self) -> &TaskCommandHandler {
        &self.tasks
    }
}

/// State of the event processor: the event log shared by the webhook
/// receiver, the queue worker and the query routes.
#[derive(Clone)]
pub struct EventProcessorDeployment {
    events: Arc<dyn EventLog>,
}

impl EventProcessorDeployment {
    pub fn new(events: Arc<dyn EventLog>) -> Self {
        Self { events }
    }

    pub fn events(&self) -> &Arc<dyn EventLog> {
        &self.events
    }
}
