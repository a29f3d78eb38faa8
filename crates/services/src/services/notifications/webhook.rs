use async_trait::async_trait;
use reqwest::{Client, header::ACCEPT};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use super::{ChangeNotifier, DeliveryError, DeliveryOutcome};
use crate::services::{change_event::TaskChangeEvent, config::WebhookConfig};

const EVENTS_PATH: &str = "/api/events";

#[derive(Debug, Error)]
pub enum WebhookSetupError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
    #[error("cannot derive webhook endpoint from {base}: {source}")]
    Endpoint {
        base: Url,
        #[source]
        source: url::ParseError,
    },
}

/// Posts change events to the event processor's `/api/events` endpoint.
///
/// One attempt per event, no retries. Only a 2xx response counts as
/// delivered.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    endpoint: Option<Url>,
}

impl WebhookNotifier {
    /// Errors when a configured base URL cannot carry the events path.
    pub fn new(config: &WebhookConfig) -> Result<Self, WebhookSetupError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        let endpoint = match &config.base_url {
            Some(base) => Some(base.join(EVENTS_PATH).map_err(|source| {
                WebhookSetupError::Endpoint {
                    base: base.clone(),
                    source,
                }
            })?),
            None => None,
        };
        Ok(Self { client, endpoint })
    }

    /// A notifier that never sends anything.
    pub fn disabled() -> Self {
        Self {
            client: Client::new(),
            endpoint: None,
        }
    }

    pub fn endpoint(&self) -> Option<&Url> {
        self.endpoint.as_ref()
    }
}

#[async_trait]
impl ChangeNotifier for WebhookNotifier {
    async fn notify(
        &self,
        event: &TaskChangeEvent,
        cancel: &CancellationToken,
    ) -> Result<DeliveryOutcome, DeliveryError> {
        let Some(endpoint) = &self.endpoint else {
            debug!(
                task_id = %event.task_id(),
                "Webhook base URL not configured, skipping notification"
            );
            return Ok(DeliveryOutcome::Skipped);
        };

        let request = self
            .client
            .post(endpoint.clone())
            .header(ACCEPT, "application/json")
            .json(event)
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(task_id = %event.task_id(), "Webhook notification cancelled");
                return Err(DeliveryError::Cancelled);
            }
            response = request => response,
        };

        let response = match response {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                warn!(
                    task_id = %event.task_id(),
                    endpoint = %endpoint,
                    "Webhook notification timed out"
                );
                return Err(DeliveryError::Timeout);
            }
            Err(e) if e.is_connect() => {
                warn!(
                    task_id = %event.task_id(),
                    endpoint = %endpoint,
                    error = %e,
                    "Event processor unreachable"
                );
                return Err(DeliveryError::Unavailable(e.to_string()));
            }
            Err(e) => {
                error!(
                    task_id = %event.task_id(),
                    endpoint = %endpoint,
                    error = %e,
                    "Unexpected error sending webhook notification"
                );
                return Err(DeliveryError::Unexpected(e.to_string()));
            }
        };

        let status = response.status();
        if status.is_success() {
            info!(
                task_id = %event.task_id(),
                event_type = %event.event_type(),
                "Webhook notification delivered"
            );
            return Ok(DeliveryOutcome::Delivered);
        }

        let body = match cancel.run_until_cancelled(response.text()).await {
            Some(body) => body.unwrap_or_default(),
            None => {
                debug!(task_id = %event.task_id(), "Webhook notification cancelled");
                return Err(DeliveryError::Cancelled);
            }
        };
        warn!(
            task_id = %event.task_id(),
            status = status.as_u16(),
            body = %body,
            "Webhook notification rejected"
        );
        Err(DeliveryError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}
