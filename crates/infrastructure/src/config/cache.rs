//! Cache and fetch configuration.

use std::{collections::HashMap, time::Duration};

use application::services::{
    DEFAULT_FAST_TTL_SECS, DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_SLOW_TTL_SECS,
};
use serde::{Deserialize, Serialize};

use super::default_true;
use crate::cache::{DEFAULT_MAX_ENTRIES, DEFAULT_SHARD_COUNT, OperationTtl};

/// Tiered cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Fast-tier TTL for operations without their own TTLs (default: 60s)
    #[serde(default = "default_fast_ttl")]
    pub fast_ttl_secs: u64,

    /// Slow-tier TTL for operations without their own TTLs (default: 5 minutes)
    #[serde(default = "default_slow_ttl")]
    pub slow_ttl_secs: u64,

    /// Maximum number of cached keys across all shards
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Number of independently locked shards
    #[serde(default = "default_shard_count")]
    pub shard_count: usize,

    /// Interval of the background expiry sweep; no sweeper when unset
    #[serde(default)]
    pub sweep_interval_secs: Option<u64>,

    /// How long expired entries stay available for stale reads (default: 1 hour)
    #[serde(default = "default_stale_retention")]
    pub stale_retention_secs: u64,

    /// Per-operation TTL overrides
    #[serde(default)]
    pub operations: HashMap<String, OperationTtl>,

    /// Halve TTLs while the market is open and double them while closed
    #[serde(default = "default_true")]
    pub market_hours_scaling: bool,
}

const fn default_fast_ttl() -> u64 {
    DEFAULT_FAST_TTL_SECS
}

const fn default_slow_ttl() -> u64 {
    DEFAULT_SLOW_TTL_SECS
}

const fn default_max_entries() -> usize {
    DEFAULT_MAX_ENTRIES
}

const fn default_shard_count() -> usize {
    DEFAULT_SHARD_COUNT
}

const fn default_stale_retention() -> u64 {
    60 * 60 // 1 hour
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            fast_ttl_secs: default_fast_ttl(),
            slow_ttl_secs: default_slow_ttl(),
            max_entries: default_max_entries(),
            shard_count: default_shard_count(),
            sweep_interval_secs: None,
            stale_retention_secs: default_stale_retention(),
            operations: HashMap::new(),
            market_hours_scaling: true,
        }
    }
}

impl CacheConfig {
    /// Get the sweep interval as a Duration, if the sweeper is enabled
    #[must_use]
    pub fn sweep_interval(&self) -> Option<Duration> {
        self.sweep_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Get the stale retention as a Duration
    #[must_use]
    pub const fn stale_retention(&self) -> Duration {
        Duration::from_secs(self.stale_retention_secs)
    }

    /// Check TTL ordering and sizes
    pub fn validate(&self) -> Result<(), String> {
        OperationTtl::new(self.fast_ttl_secs, self.slow_ttl_secs)
            .validate()
            .map_err(|e| format!("cache: {e}"))?;

        for (operation, ttl) in &self.operations {
            ttl.validate()
                .map_err(|e| format!("cache.operations.{operation}: {e}"))?;
        }

        if self.max_entries == 0 {
            return Err("cache.max_entries must be greater than 0".to_string());
        }
        if self.shard_count == 0 {
            return Err("cache.shard_count must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Upstream fetch configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Upper bound on one upstream call in seconds (default: 30)
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
}

const fn default_fetch_timeout() -> u64 {
    DEFAULT_FETCH_TIMEOUT_SECS
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
        }
    }
}

impl FetchConfig {
    /// Get the timeout as a Duration
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
