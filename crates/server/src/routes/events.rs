use axum::{
    Json, Router,
    extract::{Path, State},
    response::Json as ResponseJson,
    routing::get,
};
use serde::Serialize;
use services::services::{
    change_event::TaskChangeEvent,
    event_log::{EventLog, EventLogEntry, EventSource},
};
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{EventProcessorDeployment, error::ApiError};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventAccepted {
    pub message: String,
    pub task_id: Uuid,
}

/// Webhook receiver. Unlike the queue consumer this rejects events without a
/// task id.
pub async fn receive_event(
    State(deployment): State<EventProcessorDeployment>,
    Json(payload): Json<Option<TaskChangeEvent>>,
) -> Result<ResponseJson<ApiResponse<EventAccepted>>, ApiError> {
    let Some(event) = payload else {
        tracing::warn!("Received null task event");
        return Err(ApiError::BadRequest("Task event is required".to_string()));
    };
    if event.task_id().is_nil() {
        tracing::warn!("Received task event with empty TaskId");
        return Err(ApiError::BadRequest("TaskId is required".to_string()));
    }

    tracing::info!(
        task_id = %event.task_id(),
        event_type = %event.event_type(),
        title = %event.title(),
        status = %event.status(),
        "Received task change event via webhook"
    );

    let entry = deployment
        .events()
        .append(event, EventSource::Webhook)
        .await?;

    Ok(ResponseJson(ApiResponse::success(EventAccepted {
        message: "Event logged successfully".to_string(),
        task_id: entry.event.task_id(),
    })))
}

pub async fn get_events(
    State(deployment): State<EventProcessorDeployment>,
) -> Result<ResponseJson<ApiResponse<Vec<EventLogEntry>>>, ApiError> {
    let events = deployment.events().all_events().await?;
    Ok(ResponseJson(ApiResponse::success(events)))
}

pub async fn get_events_for_task(
    State(deployment): State<EventProcessorDeployment>,
    Path(task_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Vec<EventLogEntry>>>, ApiError> {
    if task_id.is_nil() {
        return Err(ApiError::BadRequest("Invalid task ID".to_string()));
    }
    let events = deployment.events().events_for_task(task_id).await?;
    Ok(ResponseJson(ApiResponse::success(events)))
}

pub fn router() -> Router<EventProcessorDeployment> {
    let inner = Router::new()
        .route("/", get(get_events).post(receive_event))
        .route("/{task_id}", get(get_events_for_task));

    Router::new().nest("/events", inner)
}
