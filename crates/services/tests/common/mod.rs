//! Shared fixtures for the notification pipeline tests.

#![allow(dead_code)]

use std::{
    fmt,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
};
use serde_json::Value;
use services::services::{
    change_event::TaskChangeEvent,
    event_log::{EventLog, EventLogEntry, EventLogError, EventSource},
    notifications::{
        ChangeNotifier, DeliveryError, DeliveryOutcome, PublishError, QueuePublisher,
    },
};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{
    Event, Level, Subscriber,
    field::{Field, Visit},
};
use tracing_subscriber::{Layer, layer::Context};
use url::Url;

// ============================================================================
// Log capture
// ============================================================================

#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<(Level, String)>>>);

impl CapturedLogs {
    pub fn at(&self, level: Level) -> Vec<String> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

impl<S: Subscriber> Layer<S> for CapturedLogs {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.0
            .lock()
            .unwrap()
            .push((*event.metadata().level(), visitor.0));
    }
}

#[derive(Default)]
struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}

/// Installs a capturing subscriber for the current thread. Use with the
/// current-thread test runtime so every event lands here.
pub fn capture_logs() -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
    use tracing_subscriber::layer::SubscriberExt;

    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::registry().with(logs.clone());
    let guard = tracing::subscriber::set_default(subscriber);
    (logs, guard)
}

// ============================================================================
// Recording channels
// ============================================================================

#[derive(Default)]
pub struct RecordingNotifier {
    pub calls: AtomicUsize,
    pub events: Mutex<Vec<TaskChangeEvent>>,
    pub fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChangeNotifier for RecordingNotifier {
    async fn notify(
        &self,
        event: &TaskChangeEvent,
        _cancel: &CancellationToken,
    ) -> Result<DeliveryOutcome, DeliveryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.events.lock().unwrap().push(event.clone());
        if self.fail {
            Err(DeliveryError::Unavailable("connection refused".to_string()))
        } else {
            Ok(DeliveryOutcome::Delivered)
        }
    }
}

#[derive(Default)]
pub struct RecordingPublisher {
    pub calls: AtomicUsize,
    pub events: Mutex<Vec<TaskChangeEvent>>,
    pub fail: bool,
}

impl RecordingPublisher {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueuePublisher for RecordingPublisher {
    async fn publish(
        &self,
        event: &TaskChangeEvent,
        _cancel: &CancellationToken,
    ) -> Result<DeliveryOutcome, PublishError> {
        event.validate()?;
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.events.lock().unwrap().push(event.clone());
        if self.fail {
            Err(DeliveryError::Unavailable("broker down".to_string()).into())
        } else {
            Ok(DeliveryOutcome::Delivered)
        }
    }
}

/// Blocks every notification until `release` is signalled.
#[derive(Default)]
pub struct GatedNotifier {
    pub release: Notify,
    pub started: AtomicUsize,
    pub completed: AtomicUsize,
}

#[async_trait]
impl ChangeNotifier for GatedNotifier {
    async fn notify(
        &self,
        _event: &TaskChangeEvent,
        _cancel: &CancellationToken,
    ) -> Result<DeliveryOutcome, DeliveryError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        self.release.notified().await;
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(DeliveryOutcome::Delivered)
    }
}

/// Event log whose store is always down.
#[derive(Default)]
pub struct FailingEventLog {
    pub attempts: AtomicUsize,
}

#[async_trait]
impl EventLog for FailingEventLog {
    async fn append(
        &self,
        _event: TaskChangeEvent,
        _source: EventSource,
    ) -> Result<EventLogEntry, EventLogError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(EventLogError::Unavailable("store offline".to_string()))
    }

    async fn all_events(&self) -> Result<Vec<EventLogEntry>, EventLogError> {
        Ok(Vec::new())
    }

    async fn events_for_task(
        &self,
        _task_id: uuid::Uuid,
    ) -> Result<Vec<EventLogEntry>, EventLogError> {
        Ok(Vec::new())
    }
}

// ============================================================================
// Local webhook target
// ============================================================================

#[derive(Clone)]
struct TargetState {
    received: Arc<Mutex<Vec<(HeaderMap, Value)>>>,
    status: StatusCode,
    delay: Duration,
}

pub struct WebhookTarget {
    pub base_url: Url,
    received: Arc<Mutex<Vec<(HeaderMap, Value)>>>,
}

impl WebhookTarget {
    pub async fn start(status: StatusCode, delay: Duration) -> Self {
        let received = Arc::new(Mutex::new(Vec::new()));
        let state = TargetState {
            received: received.clone(),
            status,
            delay,
        };
        let app = Router::new()
            .route("/api/events", post(receive))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: Url::parse(&format!("http://{addr}")).unwrap(),
            received,
        }
    }

    pub fn requests(&self) -> Vec<(HeaderMap, Value)> {
        self.received.lock().unwrap().clone()
    }
}

async fn receive(
    State(state): State<TargetState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, &'static str) {
    state.received.lock().unwrap().push((headers, body));
    tokio::time::sleep(state.delay).await;
    let body = if state.status.is_success() { "ok" } else { "boom" };
    (state.status, body)
}

/// Polls `check` until it holds or five seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
