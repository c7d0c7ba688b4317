//! Per-operation TTL selection
//!
//! Every upstream operation has its own freshness needs: a volume ranking
//! moves every few seconds during the session, a market-cap ranking barely
//! changes within the hour. TTLs are resolved from configured overrides, then
//! the built-in table, then the configured defaults, and finally scaled by
//! market hours (halved while the market is open, doubled while closed).

use std::{collections::HashMap, time::Duration};

use application::services::FetchOptions;
use serde::{Deserialize, Serialize};

use crate::config::{CacheConfig, FetchConfig};

/// Fast / Slow TTL pair for one operation, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationTtl {
    pub fast_ttl_secs: u64,
    pub slow_ttl_secs: u64,
}

impl OperationTtl {
    #[must_use]
    pub const fn new(fast_ttl_secs: u64, slow_ttl_secs: u64) -> Self {
        Self {
            fast_ttl_secs,
            slow_ttl_secs,
        }
    }

    #[must_use]
    pub const fn fast_ttl(&self) -> Duration {
        Duration::from_secs(self.fast_ttl_secs)
    }

    #[must_use]
    pub const fn slow_ttl(&self) -> Duration {
        Duration::from_secs(self.slow_ttl_secs)
    }

    /// Halve while the market is open (never below one second), double otherwise
    #[must_use]
    pub const fn scaled(self, market_open: bool) -> Self {
        if market_open {
            Self::new(half(self.fast_ttl_secs), half(self.slow_ttl_secs))
        } else {
            Self::new(
                self.fast_ttl_secs.saturating_mul(2),
                self.slow_ttl_secs.saturating_mul(2),
            )
        }
    }

    /// Check that both TTLs are set and Fast expires before Slow
    pub fn validate(&self) -> Result<(), String> {
        if self.fast_ttl_secs == 0 {
            return Err("fast_ttl_secs must be greater than 0".to_string());
        }
        if self.fast_ttl_secs >= self.slow_ttl_secs {
            return Err(format!(
                "fast_ttl_secs ({}) must be less than slow_ttl_secs ({})",
                self.fast_ttl_secs, self.slow_ttl_secs
            ));
        }
        Ok(())
    }
}

const fn half(secs: u64) -> u64 {
    if secs / 2 == 0 { 1 } else { secs / 2 }
}

/// Built-in TTLs for the known ranking operations
#[must_use]
pub fn builtin_ttl(operation: &str) -> Option<OperationTtl> {
    let ttl = match operation {
        "volume_ranking" => OperationTtl::new(30, 150),
        "investor_ranking" | "unusual_volume" => OperationTtl::new(60, 300),
        "volume_change" => OperationTtl::new(120, 600),
        "sector_volume" => OperationTtl::new(300, 1500),
        "market_cap" => OperationTtl::new(600, 3000),
        _ => return None,
    };
    Some(ttl)
}

/// Turns configuration into [`FetchOptions`] per operation call
#[derive(Debug, Clone)]
pub struct TtlPolicy {
    default: OperationTtl,
    overrides: HashMap<String, OperationTtl>,
    market_hours_scaling: bool,
    timeout: Duration,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default(), &FetchConfig::default())
    }
}

impl TtlPolicy {
    /// Create a policy with the given fallback TTLs and fetch timeout
    #[must_use]
    pub fn new(default: OperationTtl, timeout: Duration) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
            market_hours_scaling: true,
            timeout,
        }
    }

    /// Build the policy from the cache and fetch sections
    #[must_use]
    pub fn from_config(cache: &CacheConfig, fetch: &FetchConfig) -> Self {
        Self {
            default: OperationTtl::new(cache.fast_ttl_secs, cache.slow_ttl_secs),
            overrides: cache.operations.clone(),
            market_hours_scaling: cache.market_hours_scaling,
            timeout: fetch.timeout(),
        }
    }

    /// Override the TTLs of one operation
    #[must_use]
    pub fn with_override(mut self, operation: impl Into<String>, ttl: OperationTtl) -> Self {
        self.overrides.insert(operation.into(), ttl);
        self
    }

    /// Enable or disable market-hours scaling
    #[must_use]
    pub const fn with_market_hours_scaling(mut self, enabled: bool) -> Self {
        self.market_hours_scaling = enabled;
        self
    }

    /// Unscaled TTLs for `operation`
    #[must_use]
    pub fn ttl_for(&self, operation: &str) -> OperationTtl {
        self.overrides
            .get(operation)
            .copied()
            .or_else(|| builtin_ttl(operation))
            .unwrap_or(self.default)
    }

    /// Fetch options for one call of `operation`
    ///
    /// Stale payloads are served only while the market is closed.
    #[must_use]
    pub fn options_for(&self, operation: &str, market_open: bool) -> FetchOptions {
        let mut ttl = self.ttl_for(operation);
        if self.market_hours_scaling {
            ttl = ttl.scaled(market_open);
        }
        FetchOptions::new(ttl.fast_ttl(), ttl.slow_ttl())
            .with_timeout(self.timeout)
            .with_serve_stale(!market_open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_covers_ranking_operations() {
        assert_eq!(builtin_ttl("volume_ranking"), Some(OperationTtl::new(30, 150)));
        assert_eq!(builtin_ttl("market_cap"), Some(OperationTtl::new(600, 3000)));
        assert_eq!(builtin_ttl("unknown_operation"), None);
    }

    #[test]
    fn builtin_ttls_are_valid() {
        for op in [
            "volume_ranking",
            "investor_ranking",
            "volume_change",
            "sector_volume",
            "market_cap",
            "unusual_volume",
        ] {
            assert!(builtin_ttl(op).unwrap().validate().is_ok(), "{op}");
        }
    }

    #[test]
    fn open_market_halves_ttls() {
        let policy = TtlPolicy::default();
        let options = policy.options_for("volume_ranking", true);
        assert_eq!(options.fast_ttl, Duration::from_secs(15));
        assert_eq!(options.slow_ttl, Duration::from_secs(75));
        assert!(!options.serve_stale);
    }

    #[test]
    fn closed_market_doubles_ttls_and_serves_stale() {
        let policy = TtlPolicy::default();
        let options = policy.options_for("sector_volume", false);
        assert_eq!(options.fast_ttl, Duration::from_secs(600));
        assert_eq!(options.slow_ttl, Duration::from_secs(3000));
        assert!(options.serve_stale);
    }

    #[test]
    fn unknown_operation_uses_defaults() {
        let policy = TtlPolicy::default().with_market_hours_scaling(false);
        let options = policy.options_for("health_check", true);
        assert_eq!(options.fast_ttl, Duration::from_secs(60));
        assert_eq!(options.slow_ttl, Duration::from_secs(300));
        assert_eq!(options.timeout, Duration::from_secs(30));
    }

    #[test]
    fn override_wins_over_builtin() {
        let policy = TtlPolicy::new(OperationTtl::new(60, 300), Duration::from_secs(5))
            .with_override("volume_ranking", OperationTtl::new(10, 20))
            .with_market_hours_scaling(false);
        let options = policy.options_for("volume_ranking", false);
        assert_eq!(options.fast_ttl, Duration::from_secs(10));
        assert_eq!(options.slow_ttl, Duration::from_secs(20));
        assert_eq!(options.timeout, Duration::from_secs(5));
        assert!(options.serve_stale);
    }

    #[test]
    fn halving_never_reaches_zero() {
        let ttl = OperationTtl::new(1, 3).scaled(true);
        assert_eq!(ttl, OperationTtl::new(1, 1));
    }

    #[test]
    fn validate_rejects_inverted_tiers() {
        assert!(OperationTtl::new(300, 60).validate().is_err());
        assert!(OperationTtl::new(60, 60).validate().is_err());
        assert!(OperationTtl::new(0, 60).validate().is_err());
        assert!(OperationTtl::new(60, 300).validate().is_ok());
    }
}
