//! Append-only record of every change event the event processor received.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use strum_macros::Display;
use thiserror::Error;
use uuid::Uuid;

use super::change_event::TaskChangeEvent;

/// Which channel delivered an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
pub enum EventSource {
    Webhook,
    Queue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventLogEntry {
    pub sequence: u64,
    pub received_at: DateTime<Utc>,
    pub source: EventSource,
    #[serde(flatten)]
    pub event: TaskChangeEvent,
}

#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("event log unavailable: {0}")]
    Unavailable(String),
}

/// Storage behind the event processor. Entries are never updated, removed or
/// deduplicated; the same event appended twice is stored twice.
#[async_trait]
pub trait EventLog: Send + Sync {
    async fn append(
        &self,
        event: TaskChangeEvent,
        source: EventSource,
    ) -> Result<EventLogEntry, EventLogError>;

    /// Every entry, in sequence order.
    async fn all_events(&self) -> Result<Vec<EventLogEntry>, EventLogError>;

    /// Entries for one task in sequence order. Unknown ids yield an empty list.
    async fn events_for_task(&self, task_id: Uuid) -> Result<Vec<EventLogEntry>, EventLogError>;
}

/// Process-local log keyed by task id. Retention is unbounded.
#[derive(Debug, Default)]
pub struct InMemoryEventLog {
    entries: DashMap<Uuid, Vec<EventLogEntry>>,
    next_sequence: AtomicU64,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.iter().map(|slot| slot.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventLog for InMemoryEventLog {
    async fn append(
        &self,
        event: TaskChangeEvent,
        source: EventSource,
    ) -> Result<EventLogEntry, EventLogError> {
        // Sequence is taken under the shard lock so per-task order matches it.
        let mut slot = self.entries.entry(event.task_id()).or_default();
        let entry = EventLogEntry {
            sequence: self.next_sequence.fetch_add(1, Ordering::SeqCst),
            received_at: Utc::now(),
            source,
            event,
        };
        slot.push(entry.clone());
        Ok(entry)
    }

    async fn all_events(&self) -> Result<Vec<EventLogEntry>, EventLogError> {
        let mut all: Vec<EventLogEntry> = self
            .entries
            .iter()
            .flat_map(|slot| slot.value().clone())
            .collect();
        all.sort_by_key(|entry| entry.sequence);
        Ok(all)
    }

    async fn events_for_task(&self, task_id: Uuid) -> Result<Vec<EventLogEntry>, EventLogError> {
        Ok(self
            .entries
            .get(&task_id)
            .map(|slot| slot.value().clone())
            .unwrap_or_default())
    }
}
