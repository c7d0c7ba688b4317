//! Per-call latency sample

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One observed call: which operation, how long it took, whether the cache
/// served it. Samples are appended and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// Operation name (cache key prefix)
    pub operation_name: String,
    /// Wall-clock latency of the call
    pub latency: Duration,
    /// Whether any cache tier served the call
    pub cache_hit: bool,
    /// When the sample was recorded
    pub timestamp: DateTime<Utc>,
}

impl MetricSample {
    /// Create a sample stamped with the current time
    pub fn now(operation_name: impl Into<String>, latency: Duration, cache_hit: bool) -> Self {
        Self {
            operation_name: operation_name.into(),
            latency,
            cache_hit,
            timestamp: Utc::now(),
        }
    }

    /// Latency in fractional seconds
    #[must_use]
    pub fn latency_secs(&self) -> f64 {
        self.latency.as_secs_f64()
    }
}
