//! Alert port definition
//!
//! Threshold alerts raised by the metrics recorder leave the application
//! layer through this port. Delivery is best-effort: the recorder logs and
//! discards every error a sink returns.

use std::fmt;

use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::error::ApplicationError;

/// Kind of threshold alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Average latency over the window exceeded the latency threshold
    HighLatency,
    /// Cache hit rate over the window fell below the hit-rate threshold
    LowCacheHitRate,
}

impl AlertKind {
    /// Stable label for logs and metrics
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::HighLatency => "high_latency",
            Self::LowCacheHitRate => "low_cache_hit_rate",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A raised alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub kind: AlertKind,
    /// Human-readable description
    pub message: String,
    /// Observed value (seconds for latency, 0.0 - 1.0 for hit rate)
    pub observed: f64,
    /// Threshold that was crossed, same unit as `observed`
    pub threshold: f64,
    pub raised_at: DateTime<Utc>,
}

impl Alert {
    /// Create an alert stamped with the current time
    #[must_use]
    pub fn new(kind: AlertKind, observed: f64, threshold: f64) -> Self {
        let message = match kind {
            AlertKind::HighLatency => format!(
                "average latency {observed:.3}s exceeds threshold {threshold:.3}s"
            ),
            AlertKind::LowCacheHitRate => format!(
                "cache hit rate {:.1}% below threshold {:.1}%",
                observed * 100.0,
                threshold * 100.0
            ),
        };
        Self {
            kind,
            message,
            observed,
            threshold,
            raised_at: Utc::now(),
        }
    }
}

/// Sink for threshold alerts
///
/// Called synchronously from the recording path; implementations must not
/// block for long.
#[cfg_attr(test, automock)]
pub trait AlertPort: Send + Sync {
    /// Deliver one alert
    fn notify(&self, alert: &Alert) -> Result<(), ApplicationError>;
}
