use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

/// A message waiting on (or being processed from) a named destination.
///
/// `visible_at` is a unix timestamp in milliseconds. A claimed message is
/// hidden until its visibility timeout runs out, after which another worker
/// may claim it again. Acknowledged messages are deleted; dead-lettered ones
/// stay in the table and are never claimed again.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QueueMessage {
    pub id: Uuid,
    pub destination: String,
    pub payload: String,
    pub enqueued_at: DateTime<Utc>,
    pub visible_at: i64,
    pub delivery_count: i64,
    pub last_error: Option<String>,
    pub dead_lettered_at: Option<DateTime<Utc>>,
}

const QUEUE_COLUMNS: &str = "id, destination, payload, enqueued_at, visible_at, delivery_count, last_error, dead_lettered_at";

fn millis_from_now(delay: Duration) -> i64 {
    Utc::now().timestamp_millis() + delay.as_millis() as i64
}

impl QueueMessage {
    pub async fn enqueue(
        pool: &SqlitePool,
        destination: &str,
        payload: &str,
    ) -> Result<Self, sqlx::Error> {
        let now = Utc::now();
        sqlx::query_as::<_, QueueMessage>(&format!(
            "INSERT INTO queue_messages (id, destination, payload, enqueued_at, visible_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {QUEUE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(destination)
        .bind(payload)
        .bind(now)
        .bind(now.timestamp_millis())
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, QueueMessage>(&format!(
            "SELECT {QUEUE_COLUMNS} FROM queue_messages WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Claims the oldest visible message on `destination`, hiding it for
    /// `visibility` and bumping its delivery count. The select and update run
    /// as one statement so two workers never claim the same message.
    pub async fn claim_next(
        pool: &SqlitePool,
        destination: &str,
        visibility: Duration,
    ) -> Result<Option<Self>, sqlx::Error> {
        let now = Utc::now().timestamp_millis();
        sqlx::query_as::<_, QueueMessage>(&format!(
            "UPDATE queue_messages
             SET visible_at = $1, delivery_count = delivery_count + 1
             WHERE id = (
                 SELECT id FROM queue_messages
                 WHERE destination = $2
                   AND dead_lettered_at IS NULL
                   AND visible_at <= $3
                 ORDER BY enqueued_at ASC, rowid ASC
                 LIMIT 1
             )
             RETURNING {QUEUE_COLUMNS}"
        ))
        .bind(now + visibility.as_millis() as i64)
        .bind(destination)
        .bind(now)
        .fetch_optional(pool)
        .await
    }

    /// Removes a processed message.
    pub async fn ack(pool: &SqlitePool, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM queue_messages WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Makes a claimed message visible again after `delay`, recording why the
    /// attempt failed.
    pub async fn release(
        pool: &SqlitePool,
        id: Uuid,
        delay: Duration,
        error: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE queue_messages SET visible_at = $2, last_error = $3 WHERE id = $1")
            .bind(id)
            .bind(millis_from_now(delay))
            .bind(error)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn dead_letter(pool: &SqlitePool, id: Uuid, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE queue_messages SET dead_lettered_at = $2, last_error = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(Utc::now())
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Messages on `destination` that are not dead-lettered, visible or not.
    pub async fn count_pending(pool: &SqlitePool, destination: &str) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM queue_messages
             WHERE destination = $1 AND dead_lettered_at IS NULL",
        )
        .bind(destination)
        .fetch_one(pool)
        .await
    }

    pub async fn find_dead_lettered(
        pool: &SqlitePool,
        destination: &str,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, QueueMessage>(&format!(
            "SELECT {QUEUE_COLUMNS} FROM queue_messages
             WHERE destination = $1 AND dead_lettered_at IS NOT NULL
             ORDER BY enqueued_at ASC"
        ))
        .bind(destination)
        .fetch_all(pool)
        .await
    }
}
