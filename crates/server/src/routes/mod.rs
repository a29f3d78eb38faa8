use axum::{Router, http::HeaderName};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::{EventProcessorDeployment, TaskApiDeployment};

pub mod events;
pub mod health;
pub mod tasks;

const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

fn with_layers<S: Clone + Send + Sync + 'static>(router: Router<S>) -> Router<S> {
    router
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::new(REQUEST_ID_HEADER))
        .layer(SetRequestIdLayer::new(REQUEST_ID_HEADER, MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

/// Router of the task API binary.
pub fn task_api_router(deployment: TaskApiDeployment) -> Router {
    let api = Router::new()
        .merge(health::router())
        .merge(tasks::router());

    with_layers(Router::new().nest("/api", api)).with_state(deployment)
}

/// Router of the event processor binary.
pub fn event_processor_router(deployment: EventProcessorDeployment) -> Router {
    let api = Router::new()
        .merge(health::router())
        .merge(events::router());

    with_layers(Router::new().nest("/api", api)).with_state(deployment)
}
