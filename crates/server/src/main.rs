use anyhow::{self, Error as AnyhowError};
use server::{DeploymentError, LOG_CRATES, TaskApiDeployment, routes};
use services::services::config::{ConfigError, required};
use thiserror::Error;
use utils::{logging::LoggingError, shutdown::shutdown_signal};

#[derive(Debug, Error)]
pub enum TaskForgeError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Logging(#[from] LoggingError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Deployment(#[from] DeploymentError),
    #[error(transparent)]
    Other(#[from] AnyhowError),
}

fn env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

#[tokio::main]
async fn main() -> Result<(), TaskForgeError> {
    let _sentry = utils::sentry::init_once(concat!("taskforge-server@", env!("CARGO_PKG_VERSION")));
    utils::logging::init_tracing(LOG_CRATES)?;

    let deployment = TaskApiDeployment::new().await?;
    let app_router = routes::task_api_router(deployment);

    let port: u16 = match required::<u16>(env, "BACKEND_PORT") {
        Err(ConfigError::Missing { .. }) => required(env, "PORT")
            .map_err(|_| anyhow::anyhow!("BACKEND_PORT or PORT environment variable must be set"))?,
        port => port?,
    };

    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let listener = tokio::net::TcpListener::bind(format!("{host}:{port}")).await?;
    let actual_port = listener.local_addr()?.port();

    tracing::info!("Task API running on http://{host}:{actual_port}");

    axum::serve(listener, app_router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Task API stopped");
    Ok(())
}
