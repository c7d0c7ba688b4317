//! Retry with exponential backoff for upstream fetches
//!
//! The fetch coordinator never retries on its own: a failed fetch reaches
//! every waiter as-is. Callers that want retries wrap their fetch closure
//! here before handing it to the coordinator, so the whole retry sequence
//! still counts as a single in-flight fetch for the key.
//!
//! # Example
//!
//! ```rust,ignore
//! use infrastructure::retry::{RetryConfig, retrying_fetch};
//!
//! let fetch = retrying_fetch(RetryConfig::default(), move || client.volume_ranking(market));
//! let ranking: Ranking = coordinator.get_or_fetch(&key, options, fetch).await?;
//! ```

use std::future::Future;
use std::time::{Duration, Instant};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Backoff settings (`retry.*` in the configuration)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Initial delay before first retry in milliseconds (default: 100ms)
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Maximum delay between retries in milliseconds (default: 10000ms = 10s)
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Maximum jitter factor (0.0 to 1.0, default: 0.1 = 10%), 0 disables jitter
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

const fn default_initial_delay() -> u64 {
    100
}

const fn default_max_delay() -> u64 {
    10_000
}

const fn default_multiplier() -> f64 {
    2.0
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_jitter_factor() -> f64 {
    0.1
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            multiplier: default_multiplier(),
            max_retries: default_max_retries(),
            jitter_factor: default_jitter_factor(),
        }
    }
}

impl RetryConfig {
    /// Create a retry configuration with the default jitter
    #[must_use]
    pub const fn new(
        initial_delay_ms: u64,
        max_delay_ms: u64,
        multiplier: f64,
        max_retries: u32,
    ) -> Self {
        Self {
            initial_delay_ms,
            max_delay_ms,
            multiplier,
            max_retries,
            jitter_factor: default_jitter_factor(),
        }
    }

    /// A configuration that never retries
    #[must_use]
    pub const fn disabled() -> Self {
        Self::new(0, 0, 1.0, 0).without_jitter()
    }

    /// Disable jitter
    #[must_use]
    pub const fn without_jitter(mut self) -> Self {
        self.jitter_factor = 0.0;
        self
    }

    /// Check ranges
    pub fn validate(&self) -> Result<(), String> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(format!(
                "retry.multiplier must be at least 1.0, got {}",
                self.multiplier
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(format!(
                "retry.jitter_factor must be within 0.0 - 1.0, got {}",
                self.jitter_factor
            ));
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(format!(
                "retry.initial_delay_ms ({}) must not exceed retry.max_delay_ms ({})",
                self.initial_delay_ms, self.max_delay_ms
            ));
        }
        Ok(())
    }

    /// Delay before retry number `attempt` (0-indexed)
    ///
    /// `initial_delay * multiplier^attempt`, capped at `max_delay`, then
    /// spread by up to `jitter_factor` in either direction.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_wrap,
        clippy::cast_sign_loss,
        clippy::cast_possible_truncation
    )]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let base_delay = (self.initial_delay_ms as f64) * self.multiplier.powi(exponent);
        let capped_delay = base_delay.min(self.max_delay_ms as f64);

        let final_delay = if self.jitter_factor > 0.0 && capped_delay > 0.0 {
            let jitter_range = capped_delay * self.jitter_factor;
            let jitter = rand::rng().random_range(-jitter_range..=jitter_range);
            (capped_delay + jitter).max(0.0)
        } else {
            capped_delay
        };

        Duration::from_millis(final_delay as u64)
    }
}

/// Errors that know whether another attempt can succeed
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for application::ApplicationError {
    fn is_retryable(&self) -> bool {
        Self::is_retryable(self)
    }
}

/// Outcome of a retried operation
#[derive(Debug)]
pub struct RetryResult<T, E> {
    pub result: Result<T, E>,
    /// Number of attempts made (1 = no retries)
    pub attempts: u32,
    /// Total time spent including backoff
    pub total_duration: Duration,
}

impl<T, E> RetryResult<T, E> {
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    #[must_use]
    pub const fn is_err(&self) -> bool {
        self.result.is_err()
    }

    pub fn into_result(self) -> Result<T, E> {
        self.result
    }
}

/// Run `operation`, retrying errors accepted by `should_retry`
#[allow(clippy::cast_possible_truncation)]
pub async fn with_retry_when<F, Fut, T, E, P>(
    config: &RetryConfig,
    mut operation: F,
    should_retry: P,
) -> RetryResult<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let start = Instant::now();
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let err = match operation().await {
            Ok(value) => {
                if attempts > 1 {
                    debug!(
                        attempts,
                        duration_ms = start.elapsed().as_millis() as u64,
                        "Fetch succeeded after retries"
                    );
                }
                return RetryResult {
                    result: Ok(value),
                    attempts,
                    total_duration: start.elapsed(),
                };
            },
            Err(err) => err,
        };

        let retry_attempt = attempts - 1;
        if !should_retry(&err) {
            debug!(attempts, error = %err, "Fetch failed with non-retryable error");
            return RetryResult {
                result: Err(err),
                attempts,
                total_duration: start.elapsed(),
            };
        }
        if retry_attempt >= config.max_retries {
            warn!(
                attempts,
                max_retries = config.max_retries,
                error = %err,
                "Fetch failed after max retries"
            );
            return RetryResult {
                result: Err(err),
                attempts,
                total_duration: start.elapsed(),
            };
        }

        let delay = config.delay_for_attempt(retry_attempt);
        warn!(
            attempt = attempts,
            max_retries = config.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Fetch failed, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}

/// Run `operation`, retrying errors that report themselves retryable
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, operation: F) -> RetryResult<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    with_retry_when(config, operation, |err: &E| err.is_retryable()).await
}

/// Wrap an upstream call into a one-shot fetch closure that retries every error
///
/// The returned closure matches what the fetch coordinator expects, so the
/// retries happen inside the single in-flight fetch and under its timeout.
pub fn retrying_fetch<F, Fut, T, E>(
    config: RetryConfig,
    operation: F,
) -> impl FnOnce() -> std::pin::Pin<Box<dyn Future<Output = Result<T, E>> + Send>> + Send + 'static
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    move || {
        Box::pin(async move {
            with_retry_when(&config, operation, |_| true)
                .await
                .into_result()
        })
    }
}
