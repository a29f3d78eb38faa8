//! The task change event shared by every producer and consumer.
//!
//! One type with one serde representation is the wire contract for both the
//! webhook body and the queue payload.

use chrono::{DateTime, Utc};
use db::models::task::Task;
use serde::{Deserialize, Deserializer, Serialize};
use strum_macros::{Display, EnumString};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum ChangeEventType {
    Created,
    Updated,
    Deleted,
}

/// Returned when a producer tries to emit an event that can never be valid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidEventError {
    #[error("TaskId is required")]
    NilTaskId,
}

/// Snapshot of a task at the moment it was created, updated or deleted.
///
/// Fields are private so an event cannot change after construction. On the
/// wire a missing or null `taskId` becomes the nil UUID and a missing or null
/// `description` becomes the empty string; every other field is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskChangeEvent {
    #[serde(default, deserialize_with = "nil_if_null")]
    task_id: Uuid,
    event_type: ChangeEventType,
    title: String,
    #[serde(default, deserialize_with = "empty_if_null")]
    description: String,
    status: String,
    event_timestamp: DateTime<Utc>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

fn nil_if_null<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Uuid, D::Error> {
    Ok(Option::<Uuid>::deserialize(deserializer)?.unwrap_or_default())
}

fn empty_if_null<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl TaskChangeEvent {
    /// Builds an event without entity timestamps, stamped with the current time.
    pub fn new(
        task_id: Uuid,
        event_type: ChangeEventType,
        title: impl Into<String>,
        description: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        Self {
            task_id,
            event_type,
            title: title.into(),
            description: description.into(),
            status: status.into(),
            event_timestamp: Utc::now(),
            created_at: None,
            updated_at: None,
        }
    }

    /// Snapshot of the committed task state. For `Deleted` this is the row
    /// as it was just before removal.
    pub fn from_task(task: &Task, event_type: ChangeEventType) -> Self {
        Self {
            task_id: task.id,
            event_type,
            title: task.title.clone(),
            description: task.description.clone().unwrap_or_default(),
            status: task.status.to_string(),
            event_timestamp: Utc::now(),
            created_at: Some(task.created_at),
            updated_at: Some(task.updated_at),
        }
    }

    pub fn validate(&self) -> Result<(), InvalidEventError> {
        if self.task_id.is_nil() {
            return Err(InvalidEventError::NilTaskId);
        }
        Ok(())
    }

    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    pub fn event_type(&self) -> ChangeEventType {
        self.event_type
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn event_timestamp(&self) -> DateTime<Utc> {
        self.event_timestamp
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}
