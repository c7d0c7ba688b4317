//! Tracing subscriber initialization
//!
//! `RUST_LOG` takes precedence over the configured filter so log levels can
//! be raised on a running deployment without editing configuration.

use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Logging configuration (`logging.*`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directives (e.g. "info", "infrastructure=debug,application=info")
    #[serde(default = "default_filter")]
    pub filter: String,

    /// Emit one JSON object per event instead of human-readable lines
    #[serde(default)]
    pub json: bool,
}

fn default_filter() -> String {
    "ranking_cache=info,infrastructure=info,application=info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            json: false,
        }
    }
}

/// Error type for logging initialization
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The configured filter directives could not be parsed
    #[error("Invalid log filter '{filter}': {reason}")]
    Filter { filter: String, reason: String },

    /// Failed to install the global subscriber
    #[error("Failed to initialize tracing: {0}")]
    Init(String),
}

/// Resolve the filter: `RUST_LOG` if set and valid, the configured directives otherwise
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, TelemetryError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.filter).map_err(|e| TelemetryError::Filter {
        filter: config.filter.clone(),
        reason: e.to_string(),
    })
}

/// Install the global tracing subscriber
///
/// Fails if a global subscriber is already installed.
///
/// # Example
///
/// ```ignore
/// use infrastructure::telemetry::{LoggingConfig, init_logging};
///
/// init_logging(&LoggingConfig::default()).expect("logging already initialized");
/// ```
pub fn init_logging(config: &LoggingConfig) -> Result<(), TelemetryError> {
    let env_filter = build_filter(config)?;

    let (plain, json) = if config.json {
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true);
        (None, Some(layer))
    } else {
        let layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);
        (Some(layer), None)
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(plain)
        .with(json)
        .try_init()
        .map_err(|e| TelemetryError::Init(e.to_string()))?;

    info!(json = config.json, "Logging initialized");
    Ok(())
}
