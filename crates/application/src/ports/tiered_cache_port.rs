//! Tiered cache port definition
//!
//! Defines the two-tier (Fast / Slow) store sitting between callers and the
//! upstream market-data source. Payloads are stored as immutable byte buffers
//! holding a JSON encoding; callers handle typing through
//! [`TieredCachePortExt`].

use std::time::Duration;

use bytes::Bytes;
use domain::{CacheKey, Tier};
#[cfg(test)]
use mockall::automock;
use serde::{Serialize, de::DeserializeOwned};

use crate::error::ApplicationError;

/// Two-tier TTL store
///
/// Implementations are synchronous and in-memory; every operation completes
/// without suspension. Expiry is lazy: an expired entry is reported absent by
/// [`get`](Self::get) but may still be returned by
/// [`get_stale`](Self::get_stale) until it is purged or evicted.
#[cfg_attr(test, automock)]
pub trait TieredCachePort: Send + Sync + std::fmt::Debug {
    /// Fresh payload for `key` in `tier`, `None` if missing or expired
    fn get(&self, key: &CacheKey, tier: Tier) -> Option<Bytes>;

    /// Newest physically present payload for `key` regardless of expiry
    ///
    /// Prefers the Fast tier when both entries were written together.
    fn get_stale(&self, key: &CacheKey) -> Option<Bytes>;

    /// Unconditionally overwrite the entry for `(key, tier)`
    fn put(&self, key: &CacheKey, payload: Bytes, tier: Tier, ttl: Duration);

    /// Copy a fresh Slow entry into the Fast tier and return its payload
    ///
    /// Runs as one step with respect to `key`: a fresh Fast entry written
    /// concurrently is returned as is and never overwritten with the older
    /// Slow payload. `None` when neither tier holds a fresh entry.
    fn promote(&self, key: &CacheKey, fast_ttl: Duration) -> Option<Bytes>;

    /// Write both tiers for `key` in one step
    fn put_all(&self, key: &CacheKey, payload: Bytes, fast_ttl: Duration, slow_ttl: Duration);

    /// Remove every entry in every tier whose key contains `pattern`
    ///
    /// Returns the number of removed entries (a key present in both tiers
    /// counts twice).
    fn invalidate_by_substring(&self, pattern: &str) -> usize;

    /// Drop entries that expired more than `retention` ago
    fn purge_expired(&self, retention: Duration) -> usize;

    /// Snapshot of lookup and occupancy counters
    fn stats(&self) -> CacheStats;
}

/// Extension trait for typed cache operations
///
/// Provides typed get/put methods on top of the raw byte interface.
pub trait TieredCachePortExt: TieredCachePort {
    /// Get a typed value from `tier`
    fn get_typed<T>(&self, key: &CacheKey, tier: Tier) -> Result<Option<T>, ApplicationError>
    where
        T: DeserializeOwned,
    {
        self.get(key, tier)
            .map(|bytes| decode_payload(&bytes))
            .transpose()
    }

    /// Encode `value` and write it to both tiers
    fn put_typed<T>(
        &self,
        key: &CacheKey,
        value: &T,
        fast_ttl: Duration,
        slow_ttl: Duration,
    ) -> Result<(), ApplicationError>
    where
        T: Serialize,
    {
        let payload = encode_payload(value)?;
        self.put_all(key, payload, fast_ttl, slow_ttl);
        Ok(())
    }
}

// Blanket implementation for all TieredCachePort implementors
impl<T: TieredCachePort + ?Sized> TieredCachePortExt for T {}

/// Encode a payload the way the cache stores it
pub fn encode_payload<T: Serialize>(value: &T) -> Result<Bytes, ApplicationError> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| ApplicationError::Serialization(format!("Cache serialization error: {e}")))
}

/// Decode a stored payload into an owned value
pub fn decode_payload<T: DeserializeOwned>(bytes: &Bytes) -> Result<T, ApplicationError> {
    serde_json::from_slice(bytes)
        .map_err(|e| ApplicationError::Serialization(format!("Cache deserialization error: {e}")))
}

/// Cache statistics for monitoring
///
/// Hit and miss counters are per tier lookup, not per request: a request that
/// misses Fast and hits Slow counts one Fast miss and one Slow hit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Fresh Fast-tier lookups that returned a payload
    pub fast_hits: u64,
    /// Fresh Slow-tier lookups that returned a payload
    pub slow_hits: u64,
    /// Stale lookups that returned a payload
    pub stale_hits: u64,
    /// Lookups of any kind that returned nothing
    pub misses: u64,
    /// Current Fast-tier entries (including not yet purged expired ones)
    pub fast_entries: u64,
    /// Current Slow-tier entries (including not yet purged expired ones)
    pub slow_entries: u64,
    /// Keys dropped to make room
    pub evictions: u64,
    /// Entries removed by substring invalidation
    pub invalidations: u64,
    /// Entries removed by expiry purges
    pub purged: u64,
}

impl CacheStats {
    /// Total successful lookups across tiers
    #[must_use]
    pub const fn hits(&self) -> u64 {
        self.fast_hits + self.slow_hits + self.stale_hits
    }

    /// Calculate the lookup hit rate (0.0 - 1.0)
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub const fn hit_rate(&self) -> f64 {
        let hits = self.hits();
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            // Precision loss is acceptable for statistics display
            hits as f64 / total as f64
        }
    }

    /// Entries across both tiers
    #[must_use]
    pub const fn entries(&self) -> u64 {
        self.fast_entries + self.slow_entries
    }
}
