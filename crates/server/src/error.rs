use axum::{
    http::StatusCode,
    response::{IntoResponse, Json as ResponseJson, Response},
};
use services::services::{event_log::EventLogError, task_commands::CommandError};
use thiserror::Error;
use utils::response::ApiResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    EventLog(#[from] EventLogError),
    #[error("{0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Command(CommandError::Validation(e)) => {
                (StatusCode::BAD_REQUEST, e.to_string())
            }
            ApiError::Command(CommandError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, self.to_string())
            }
            ApiError::Command(CommandError::Database(e)) => {
                tracing::error!(error = %e, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }
            ApiError::Command(CommandError::InvalidChangeEvent(e)) => {
                tracing::error!(error = %e, "Refused to publish an invalid change event");
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            ApiError::EventLog(e) => {
                tracing::error!(error = %e, "Event log error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Event log error".to_string(),
                )
            }
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message.clone()),
        };

        (status, ResponseJson(ApiResponse::<()>::error(message))).into_response()
    }
}
