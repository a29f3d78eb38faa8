//! Receives change events over HTTP and from the durable queue, and serves
//! the resulting event log.

use std::sync::Arc;

use anyhow::Context;
use db::DBService;
use server::{EventProcessorDeployment, LOG_CRATES, routes};
use services::services::{
    config::{ConsumerConfig, QueueConfig, required},
    event_log::{EventLog, InMemoryEventLog},
    queue_consumer::{QueueWorker, TaskChangeEventConsumer},
};
use tokio_util::sync::CancellationToken;
use utils::shutdown::shutdown_signal;

fn env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _sentry = utils::sentry::init_once(concat!(
        "taskforge-event-processor@",
        env!("CARGO_PKG_VERSION")
    ));
    utils::logging::init_tracing(LOG_CRATES)?;

    let events: Arc<dyn EventLog> = Arc::new(InMemoryEventLog::new());
    let shutdown = CancellationToken::new();

    let worker = if QueueConfig::from_lookup(env)?.enabled {
        let db = DBService::new().await.context("failed to open queue database")?;
        let config = ConsumerConfig::from_env()?;
        let consumer = TaskChangeEventConsumer::new(Arc::clone(&events));
        Some(tokio::spawn(
            QueueWorker::new(db.pool.clone(), consumer, config).run(shutdown.clone()),
        ))
    } else {
        tracing::info!("Queue disabled, only the webhook receiver is running");
        None
    };

    let app_router = routes::event_processor_router(EventProcessorDeployment::new(events));

    let port: u16 = required(env, "EVENT_PROCESSOR_PORT")?;
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let listener = tokio::net::TcpListener::bind(format!("{host}:{port}")).await?;
    let actual_port = listener.local_addr()?.port();

    tracing::info!("Event processor running on http://{host}:{actual_port}");

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app_router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            server_shutdown.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Some(worker) = worker {
        worker.await.context("queue worker panicked")?;
    }

    tracing::info!("Event processor stopped");
    Ok(())
}
