use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::get,
};
use db::models::task::{CreateTask, Task, UpdateTask};
use services::services::task_commands::{Page, PageRequest};
use tokio_util::sync::CancellationToken;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{TaskApiDeployment, error::ApiError};

/// Token cancelled when axum drops the handler future, which aborts any
/// in-flight inline notification.
fn request_token() -> (CancellationToken, tokio_util::sync::DropGuard) {
    let token = CancellationToken::new();
    let guard = token.clone().drop_guard();
    (token, guard)
}

pub async fn get_tasks(
    State(deployment): State<TaskApiDeployment>,
    Query(page): Query<PageRequest>,
) -> Result<ResponseJson<ApiResponse<Page<Task>>>, ApiError> {
    let page = deployment.tasks().list(page).await?;
    Ok(ResponseJson(ApiResponse::success(page)))
}

pub async fn get_task(
    State(deployment): State<TaskApiDeployment>,
    Path(task_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Task>>, ApiError> {
    let task = deployment.tasks().get(task_id).await?;
    Ok(ResponseJson(ApiResponse::success(task)))
}

pub async fn create_task(
    State(deployment): State<TaskApiDeployment>,
    Json(payload): Json<CreateTask>,
) -> Result<ResponseJson<ApiResponse<Task>>, ApiError> {
    tracing::debug!("Creating task '{}'", payload.title);

    let (cancel, _guard) = request_token();
    let task = deployment.tasks().create(payload, &cancel).await?;
    Ok(ResponseJson(ApiResponse::success(task)))
}

pub async fn update_task(
    State(deployment): State<TaskApiDeployment>,
    Path(task_id): Path<Uuid>,
    Json(payload): Json<UpdateTask>,
) -> Result<ResponseJson<ApiResponse<Task>>, ApiError> {
    let (cancel, _guard) = request_token();
    let task = deployment.tasks().update(task_id, payload, &cancel).await?;
    Ok(ResponseJson(ApiResponse::success(task)))
}

pub async fn delete_task(
    State(deployment): State<TaskApiDeployment>,
    Path(task_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Task>>, ApiError> {
    let (cancel, _guard) = request_token();
    let task = deployment.tasks().delete(task_id, &cancel).await?;
    Ok(ResponseJson(ApiResponse::success(task)))
}

pub fn router() -> Router<TaskApiDeployment> {
    let inner = Router::new()
        .route("/", get(get_tasks).post(create_task))
        .route(
            "/{task_id}",
            get(get_task).put(update_task).delete(delete_task),
        );

    Router::new().nest("/tasks", inner)
}
