use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use thiserror::Error;
use uuid::Uuid;

pub const MAX_TITLE_LEN: usize = 500;
pub const MAX_DESCRIPTION_LEN: usize = 2000;

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, EnumString, Display, Default,
)]
#[sqlx(type_name = "task_status")]
pub enum TaskStatus {
    #[default]
    New,
    InProgress,
    Completed,
    Pending,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTask {
    pub title: String,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
}

impl CreateTask {
    pub fn from_title_description(title: impl Into<String>, description: Option<String>) -> Self {
        Self {
            title: title.into(),
            description,
            status: Some(TaskStatus::New),
        }
    }

    pub fn validate(&self) -> Result<(), TaskValidationError> {
        validate_fields(&self.title, self.description.as_deref())
    }
}

/// Full replacement of the editable fields; `created_at` is never touched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateTask {
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
}

impl UpdateTask {
    pub fn validate(&self) -> Result<(), TaskValidationError> {
        validate_fields(&self.title, self.description.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskValidationError {
    #[error("Title is required")]
    TitleRequired,
    #[error("Title must not exceed {MAX_TITLE_LEN} characters")]
    TitleTooLong,
    #[error("Description must not exceed {MAX_DESCRIPTION_LEN} characters")]
    DescriptionTooLong,
}

fn validate_fields(title: &str, description: Option<&str>) -> Result<(), TaskValidationError> {
    if title.trim().is_empty() {
        return Err(TaskValidationError::TitleRequired);
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(TaskValidationError::TitleTooLong);
    }
    if description.is_some_and(|d| d.chars().count() > MAX_DESCRIPTION_LEN) {
        return Err(TaskValidationError::DescriptionTooLong);
    }
    Ok(())
}

const TASK_COLUMNS: &str = "id, title, description, status, created_at, updated_at";

impl Task {
    pub async fn create(
        pool: &SqlitePool,
        data: &CreateTask,
        task_id: Uuid,
    ) -> Result<Self, sqlx::Error> {
        let now = Utc::now();
        let status = data.status.unwrap_or_default();
        sqlx::query_as::<_, Task>(&format!(
            "INSERT INTO tasks (id, title, description, status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $5)
             RETURNING {TASK_COLUMNS}"
        ))
        .bind(task_id)
        .bind(&data.title)
        .bind(&data.description)
        .bind(status)
        .bind(now)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Task>(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Newest first. Returns the page together with the total row count.
    pub async fn find_paginated(
        pool: &SqlitePool,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Self>, i64), sqlx::Error> {
        let tasks = sqlx::query_as::<_, Task>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             ORDER BY created_at DESC
             LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

        let total = Self::count(pool).await?;
        Ok((tasks, total))
    }

    pub async fn count(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM tasks")
            .fetch_one(pool)
            .await
    }

    /// Returns `None` when no task has the given id.
    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        data: &UpdateTask,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Task>(&format!(
            "UPDATE tasks
             SET title = $2, description = $3, status = $4, updated_at = $5
             WHERE id = $1
             RETURNING {TASK_COLUMNS}"
        ))
        .bind(id)
        .bind(&data.title)
        .bind(&data.description)
        .bind(data.status)
        .bind(Utc::now())
        .fetch_optional(pool)
        .await
    }

    /// Deletes the task and hands back the row as it was, or `None` if it
    /// did not exist.
    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Task>(&format!(
            "DELETE FROM tasks WHERE id = $1 RETURNING {TASK_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }
}
