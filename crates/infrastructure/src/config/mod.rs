//! Application configuration
//!
//! Split into focused sub-modules:
//! - `cache`: tier TTLs, capacity, sweeper, per-operation overrides, fetch timeout
//!
//! The remaining sections reuse the settings types of the layers they
//! configure (metrics thresholds, analysis settings, retry, circuit
//! breaker, logging).
//!
//! Sources are layered: built-in defaults, then an optional `config.toml`,
//! then `RANKING_CACHE_*` environment variables with `__` separating nested
//! keys (e.g. `RANKING_CACHE_CACHE__FAST_TTL_SECS=30`).

mod cache;

use std::path::Path;

use application::{AnalysisSettings, ApplicationError, MetricsThresholds};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use cache::{CacheConfig, FetchConfig};

use crate::{
    circuit_breaker::CircuitBreakerConfig, retry::RetryConfig, telemetry::LoggingConfig,
};

/// Prefix of configuration environment variables
pub const ENV_PREFIX: &str = "RANKING_CACHE";

/// Separator between nested keys in environment variable names
pub const ENV_SEPARATOR: &str = "__";

/// Shared default for boolean `true` fields across config structs
pub(crate) const fn default_true() -> bool {
    true
}

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Tiered cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Upstream fetch configuration
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Rolling-window alert thresholds
    #[serde(default)]
    pub metrics: MetricsThresholds,

    /// Ranking analysis thresholds
    #[serde(default)]
    pub analysis: AnalysisSettings,

    /// Backoff for retried upstream calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Fail-fast guard around the upstream
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    /// Log filter and format
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from the environment and an optional `config.toml`
    /// in the working directory
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::build(
            config::File::with_name("config").required(false),
            environment(),
        )
    }

    /// Load configuration from the environment and the given file, which must exist
    pub fn load_from(path: &Path) -> Result<Self, config::ConfigError> {
        Self::build(config::File::from(path).required(true), environment())
    }

    fn build<F>(file: F, env: config::Environment) -> Result<Self, config::ConfigError>
    where
        F: config::Source + Send + Sync + 'static,
    {
        let builder = config::Config::builder()
            // Start with defaults
            .set_default("cache.fast_ttl_secs", 60)?
            .set_default("cache.slow_ttl_secs", 300)?
            .set_default("fetch.timeout_secs", 30)?
            // Load from file if exists
            .add_source(file)
            // Override with environment variables
            .add_source(env);

        let config: Self = builder.build()?.try_deserialize()?;
        debug!(
            fast_ttl_secs = config.cache.fast_ttl_secs,
            slow_ttl_secs = config.cache.slow_ttl_secs,
            shards = config.cache.shard_count,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Check cross-field constraints serde cannot express
    ///
    /// # Errors
    ///
    /// Returns [`ApplicationError::Configuration`] naming the first offending key.
    pub fn validate(&self) -> Result<(), ApplicationError> {
        self.cache
            .validate()
            .map_err(ApplicationError::Configuration)?;

        if self.fetch.timeout_secs == 0 {
            return Err(ApplicationError::Configuration(
                "fetch.timeout_secs must be greater than 0".to_string(),
            ));
        }

        self.metrics.validate()?;
        validate_analysis(&self.analysis)?;
        self.retry
            .validate()
            .map_err(ApplicationError::Configuration)?;
        self.circuit_breaker
            .validate()
            .map_err(ApplicationError::Configuration)?;
        Ok(())
    }
}

fn validate_analysis(analysis: &AnalysisSettings) -> Result<(), ApplicationError> {
    let positive = |value: f64| value.is_finite() && value > 0.0;

    if !positive(analysis.z_score_threshold) {
        return Err(ApplicationError::Configuration(format!(
            "analysis.z_score_threshold must be positive, got {}",
            analysis.z_score_threshold
        )));
    }
    if !positive(analysis.ratio_threshold_percent) {
        return Err(ApplicationError::Configuration(format!(
            "analysis.ratio_threshold_percent must be positive, got {}",
            analysis.ratio_threshold_percent
        )));
    }
    if analysis.history_window == 0 {
        return Err(ApplicationError::Configuration(
            "analysis.history_window must be greater than 0".to_string(),
        ));
    }
    if analysis.concentration_top_n == 0 {
        return Err(ApplicationError::Configuration(
            "analysis.concentration_top_n must be greater than 0".to_string(),
        ));
    }
    Ok(())
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator(ENV_SEPARATOR)
        .try_parsing(true)
}
