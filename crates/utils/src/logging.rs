use thiserror::Error;
use tracing_subscriber::{EnvFilter, filter::ParseError, prelude::*, util::TryInitError};

use crate::sentry::sentry_layer;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid tracing filter: {0}")]
    Filter(#[from] ParseError),
    #[error(transparent)]
    Init(#[from] TryInitError),
}

/// Builds the filter string used by every binary: `warn` for dependencies and
/// `RUST_LOG` (default `info`) for the workspace crates.
pub fn filter_string(crates: &[&str], level: &str) -> String {
    let mut filter = String::from("warn");
    for krate in crates {
        filter.push(',');
        filter.push_str(krate);
        filter.push('=');
        filter.push_str(level);
    }
    filter
}

/// Installs the global subscriber: fmt output (JSON when `LOG_FORMAT=json`)
/// plus the sentry layer.
pub fn init_tracing(crates: &[&str]) -> Result<(), LoggingError> {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = filter_string(crates, &log_level);
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let json_layer = if json {
        Some(
            tracing_subscriber::fmt::layer()
                .json()
                .with_filter(EnvFilter::try_new(&filter)?),
        )
    } else {
        None
    };
    let text_layer = if json {
        None
    } else {
        Some(tracing_subscriber::fmt::layer().with_filter(EnvFilter::try_new(&filter)?))
    };

    tracing_subscriber::registry()
        .with(json_layer)
        .with(text_layer)
        .with(sentry_layer())
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_string_lists_each_crate() {
        assert_eq!(
            filter_string(&["server", "services"], "debug"),
            "warn,server=debug,services=debug"
        );
    }

    #[test]
    fn test_filter_string_parses() {
        let filter = filter_string(&["server", "services", "db", "utils"], "info");
        assert!(EnvFilter::try_new(filter).is_ok());
    }
}
