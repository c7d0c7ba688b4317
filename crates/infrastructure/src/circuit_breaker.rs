//! Circuit breaker guarding the upstream market-data source
//!
//! After `failure_threshold` consecutive failed fetches the circuit opens and
//! every fetch fails fast until `half_open_timeout_secs` have passed. The
//! circuit then lets fetches through again; `success_threshold` successes
//! close it, while one failure opens it again.
//!
//! Like [`retrying_fetch`](crate::retry::retrying_fetch), [`guarded_fetch`]
//! wraps a fetch closure before it is handed to the coordinator, so the
//! guarded call is still a single in-flight fetch for its key.
//!
//! # States
//!
//! - **Closed**: normal operation, fetches pass through
//! - **Open**: upstream considered down, fetches fail fast
//! - **Half-Open**: testing whether the upstream has recovered

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Circuit breaker settings (`circuit_breaker.*` in the configuration)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit (default: 5)
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Successes in Half-Open that close the circuit (default: 1)
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,

    /// Seconds the circuit stays open before letting fetches through (default: 30)
    #[serde(default = "default_half_open_timeout")]
    pub half_open_timeout_secs: u64,
}

const fn default_failure_threshold() -> u32 {
    5
}

const fn default_success_threshold() -> u32 {
    1
}

const fn default_half_open_timeout() -> u64 {
    30
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
            half_open_timeout_secs: default_half_open_timeout(),
        }
    }
}

impl CircuitBreakerConfig {
    /// Creates a custom configuration
    #[must_use]
    pub const fn new(
        failure_threshold: u32,
        success_threshold: u32,
        half_open_timeout_secs: u64,
    ) -> Self {
        Self {
            failure_threshold,
            success_threshold,
            half_open_timeout_secs,
        }
    }

    /// Get the open period as a Duration
    #[must_use]
    pub const fn half_open_timeout(&self) -> Duration {
        Duration::from_secs(self.half_open_timeout_secs)
    }

    /// Check that both thresholds are positive
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("circuit_breaker.failure_threshold must be greater than 0".to_string());
        }
        if self.success_threshold == 0 {
            return Err("circuit_breaker.success_threshold must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// State of a circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, fetches pass through
    Closed,
    /// Upstream is down, fetches fail fast
    Open,
    /// Testing if the upstream has recovered
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Error of a fetch made through a circuit breaker
#[derive(Debug, Error)]
pub enum CircuitBreakerError<E> {
    /// The circuit is open and the fetch was not attempted
    #[error("Circuit breaker '{name}' is open: upstream temporarily unavailable")]
    Open { name: String },

    /// The fetch ran and failed
    #[error(transparent)]
    Upstream(E),
}

impl<E> CircuitBreakerError<E> {
    /// Whether the fetch was rejected without running
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    opened_at: Option<Instant>,
}

/// Consecutive-failure circuit breaker
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                opened_at: None,
            }),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state, moving Open to Half-Open once the open period elapsed
    #[must_use]
    pub fn state(&self) -> CircuitState {
        let mut state = self.state.lock();
        self.refresh(&mut state);
        state.state
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    fn refresh(&self, state: &mut BreakerState) {
        if state.state != CircuitState::Open {
            return;
        }
        let elapsed = state.opened_at.as_ref().map_or(Duration::MAX, Instant::elapsed);
        if elapsed >= self.config.half_open_timeout() {
            debug!(
                circuit = %self.name,
                elapsed_secs = elapsed.as_secs(),
                "Circuit transitioning from Open to HalfOpen"
            );
            state.state = CircuitState::HalfOpen;
            state.success_count = 0;
        }
    }

    fn on_success(&self) {
        let mut state = self.state.lock();
        state.failure_count = 0;

        if state.state == CircuitState::HalfOpen {
            state.success_count += 1;
            if state.success_count >= self.config.success_threshold {
                info!(
                    circuit = %self.name,
                    successes = state.success_count,
                    "Circuit transitioning from HalfOpen to Closed"
                );
                state.state = CircuitState::Closed;
                state.success_count = 0;
                state.opened_at = None;
            }
        }
    }

    fn on_failure(&self) {
        let mut state = self.state.lock();
        state.failure_count += 1;
        state.success_count = 0;

        let open = match state.state {
            CircuitState::Closed => state.failure_count >= self.config.failure_threshold,
            CircuitState::HalfOpen => true,
            CircuitState::Open => false,
        };
        if open {
            warn!(
                circuit = %self.name,
                from = %state.state,
                failures = state.failure_count,
                "Circuit opened"
            );
            state.state = CircuitState::Open;
            state.opened_at = Some(Instant::now());
            state.failure_count = 0;
        }
    }

    /// Run `f` unless the circuit is open, recording its outcome
    ///
    /// # Errors
    ///
    /// - [`CircuitBreakerError::Open`] without calling `f` while the circuit is open
    /// - [`CircuitBreakerError::Upstream`] with the error `f` returned
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let current = self.state();
        if current == CircuitState::Open {
            warn!(circuit = %self.name, "Circuit breaker rejected upstream fetch");
            return Err(CircuitBreakerError::Open {
                name: self.name.clone(),
            });
        }

        match f().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            },
            Err(err) => {
                warn!(circuit = %self.name, state = %current, error = %err, "Upstream fetch failed");
                self.on_failure();
                Err(CircuitBreakerError::Upstream(err))
            },
        }
    }
}

/// Wrap a fetch closure so it runs through `breaker`
///
/// Hand the result to the coordinator in place of the bare closure.
pub fn guarded_fetch<F, Fut, T, E>(
    breaker: Arc<CircuitBreaker>,
    fetch: F,
) -> impl FnOnce() -> Pin<Box<dyn Future<Output = Result<T, CircuitBreakerError<E>>> + Send>> + Send + 'static
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: fmt::Display + Send + 'static,
{
    move || Box::pin(async move { breaker.call(fetch).await })
}
