//! Start-up configuration read from environment variables.
//!
//! Every `from_env` delegates to `from_lookup`, which takes any key lookup so
//! tests can pass a map instead of touching the process environment.

use std::{fmt::Display, str::FromStr, time::Duration};

use thiserror::Error;
use url::Url;

use super::task_commands::ExecutionMode;

pub const DEFAULT_QUEUE_DESTINATION: &str = "task-change-events";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} is not set")]
    Missing { key: &'static str },
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Webhook target. No base URL means the webhook channel is disabled.
///
/// - `EVENT_PROCESSOR_BASE_URL`: base URL of the event processor (optional)
/// - `WEBHOOK_TIMEOUT_SECS`: client timeout, defaults to 5
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookConfig {
    pub base_url: Option<Url>,
    pub timeout: Duration,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(5),
        }
    }
}

impl WebhookConfig {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let base_url = match non_empty(&lookup, "EVENT_PROCESSOR_BASE_URL") {
            Some(raw) => Some(base_url(&raw)?),
            None => None,
        };
        let timeout_secs = parse_or(&lookup, "WEBHOOK_TIMEOUT_SECS", 5u64)?;
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "WEBHOOK_TIMEOUT_SECS",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(Self {
            base_url,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

/// - `QUEUE_ENABLED`: "true", "1" or "yes" turns on the durable queue publisher
/// - `QUEUE_DESTINATION`: routing key, defaults to `task-change-events`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    pub enabled: bool,
    pub destination: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            destination: DEFAULT_QUEUE_DESTINATION.to_string(),
        }
    }
}

impl QueueConfig {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            enabled: flag(&lookup, "QUEUE_ENABLED"),
            destination: destination(&lookup),
        })
    }
}

/// Everything the task command handler needs to fan out change events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationConfig {
    pub webhook: WebhookConfig,
    pub queue: QueueConfig,
    pub mode: ExecutionMode,
    /// Deadline for notifications running in `ExecutionMode::Spawned`.
    pub background_timeout: Duration,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            webhook: WebhookConfig::default(),
            queue: QueueConfig::default(),
            mode: ExecutionMode::Inline,
            background_timeout: Duration::from_secs(30),
        }
    }
}

impl NotificationConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            webhook: WebhookConfig::from_lookup(&lookup)?,
            queue: QueueConfig::from_lookup(&lookup)?,
            mode: parse_or(&lookup, "NOTIFICATION_MODE", ExecutionMode::Inline)?,
            background_timeout: Duration::from_secs(parse_or(
                &lookup,
                "NOTIFICATION_BACKGROUND_TIMEOUT_SECS",
                30u64,
            )?),
        })
    }
}

/// Settings for the queue worker in the event processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerConfig {
    pub destination: String,
    pub concurrency: usize,
    pub poll_interval: Duration,
    pub visibility_timeout: Duration,
    pub max_deliveries: i64,
    pub retry_delay: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            destination: DEFAULT_QUEUE_DESTINATION.to_string(),
            concurrency: 4,
            poll_interval: Duration::from_millis(500),
            visibility_timeout: Duration::from_secs(30),
            max_deliveries: 3,
            retry_delay: Duration::from_secs(5),
        }
    }
}

impl ConsumerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let concurrency = parse_or(&lookup, "CONSUMER_CONCURRENCY", 4usize)?;
        if concurrency == 0 {
            return Err(ConfigError::Invalid {
                key: "CONSUMER_CONCURRENCY",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        let max_deliveries = parse_or(&lookup, "CONSUMER_MAX_DELIVERIES", 3i64)?;
        if max_deliveries < 1 {
            return Err(ConfigError::Invalid {
                key: "CONSUMER_MAX_DELIVERIES",
                value: max_deliveries.to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            destination: destination(&lookup),
            concurrency,
            poll_interval: Duration::from_millis(parse_or(
                &lookup,
                "CONSUMER_POLL_INTERVAL_MS",
                500u64,
            )?),
            visibility_timeout: Duration::from_secs(parse_or(
                &lookup,
                "CONSUMER_VISIBILITY_TIMEOUT_SECS",
                30u64,
            )?),
            max_deliveries,
            retry_delay: Duration::from_secs(parse_or(&lookup, "CONSUMER_RETRY_DELAY_SECS", 5u64)?),
        })
    }
}

/// Only absolute `http`/`https` URLs can carry the events path.
fn base_url(raw: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        key: "EVENT_PROCESSOR_BASE_URL",
        value: raw.to_string(),
        reason,
    };
    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
        return Err(invalid("expected an http or https base URL".to_string()));
    }
    Ok(url)
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn flag(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> bool {
    non_empty(lookup, key)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

fn destination(lookup: &impl Fn(&str) -> Option<String>) -> String {
    non_empty(lookup, "QUEUE_DESTINATION").unwrap_or_else(|| DEFAULT_QUEUE_DESTINATION.to_string())
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match non_empty(lookup, key) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

/// Reads a required value, used by the binaries for their bind ports.
pub fn required<T>(
    lookup: impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = non_empty(&lookup, key).ok_or(ConfigError::Missing { key })?;
    raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value: raw.clone(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_nothing_is_set() {
        let config = NotificationConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, NotificationConfig::default());
        assert!(config.webhook.base_url.is_none());
        assert!(!config.queue.enabled);
        assert_eq!(config.queue.destination, "task-change-events");

        assert_eq!(
            ConsumerConfig::from_lookup(lookup(&[])).unwrap(),
            ConsumerConfig::default()
        );
    }

    #[test]
    fn test_reads_notification_settings() {
        let config = NotificationConfig::from_lookup(lookup(&[
            ("EVENT_PROCESSOR_BASE_URL", "http://localhost:5001"),
            ("WEBHOOK_TIMEOUT_SECS", "2"),
            ("QUEUE_ENABLED", "YES"),
            ("QUEUE_DESTINATION", "audit"),
            ("NOTIFICATION_MODE", "spawned"),
        ]))
        .unwrap();

        assert_eq!(
            config.webhook.base_url.unwrap().as_str(),
            "http://localhost:5001/"
        );
        assert_eq!(config.webhook.timeout, Duration::from_secs(2));
        assert!(config.queue.enabled);
        assert_eq!(config.queue.destination, "audit");
        assert_eq!(config.mode, ExecutionMode::Spawned);
    }

    #[test]
    fn test_blank_base_url_disables_webhook() {
        let config =
            WebhookConfig::from_lookup(lookup(&[("EVENT_PROCESSOR_BASE_URL", "  ")])).unwrap();
        assert!(config.base_url.is_none());
    }

    #[test]
    fn test_base_url_without_scheme_is_rejected() {
        for raw in ["localhost:5001", "ftp://localhost:5001", "mailto:ops@example.com"] {
            let err = WebhookConfig::from_lookup(lookup(&[("EVENT_PROCESSOR_BASE_URL", raw)]))
                .unwrap_err();
            assert!(
                matches!(
                    err,
                    ConfigError::Invalid {
                        key: "EVENT_PROCESSOR_BASE_URL",
                        ..
                    }
                ),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn test_zero_webhook_timeout_is_rejected() {
        let err = WebhookConfig::from_lookup(lookup(&[("WEBHOOK_TIMEOUT_SECS", "0")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "WEBHOOK_TIMEOUT_SECS",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            }
        );
    }

    #[test]
    fn test_invalid_values_are_reported() {
        let err = NotificationConfig::from_lookup(lookup(&[("WEBHOOK_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "WEBHOOK_TIMEOUT_SECS",
                ..
            }
        ));

        let err =
            ConsumerConfig::from_lookup(lookup(&[("CONSUMER_CONCURRENCY", "0")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "CONSUMER_CONCURRENCY",
                ..
            }
        ));

        assert!(
            NotificationConfig::from_lookup(lookup(&[("NOTIFICATION_MODE", "later")])).is_err()
        );
    }

    #[test]
    fn test_required_port() {
        assert_eq!(
            required::<u16>(lookup(&[]), "BACKEND_PORT"),
            Err(ConfigError::Missing {
                key: "BACKEND_PORT"
            })
        );
        assert_eq!(
            required::<u16>(lookup(&[("BACKEND_PORT", "8080")]), "BACKEND_PORT").unwrap(),
            8080
        );
    }
}
