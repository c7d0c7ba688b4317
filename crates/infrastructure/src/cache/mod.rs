//! Cache implementations
//!
//! Provides the caching adapters for the application layer:
//! - `TieredCache`: sharded in-memory Fast / Slow store with per-entry TTL
//! - `TtlPolicy`: per-operation TTLs scaled by market hours
//! - `derive_cache_key`: deterministic keys from an operation and its parameters
//! - `spawn_expiry_sweeper`: periodic purge of long-expired entries

mod sweeper;
mod tiered_cache;
mod ttl_policy;

use domain::{CacheKey, DomainError, QueryParams, validate_operation};

pub use sweeper::spawn_expiry_sweeper;
pub use tiered_cache::{DEFAULT_MAX_ENTRIES, DEFAULT_SHARD_COUNT, TieredCache};
pub use ttl_policy::{OperationTtl, TtlPolicy, builtin_ttl};

/// Derive the cache key for an operation call using a blake3 hash
///
/// Parameters are hashed in name order, so the insertion order of the set
/// does not matter. Every name and value is prefixed with its byte length,
/// which keeps `{"a": "bc"}` and `{"ab": "c"}` apart.
pub fn derive_cache_key(operation: &str, params: &QueryParams) -> Result<CacheKey, DomainError> {
    validate_operation(operation)?;

    let mut hasher = blake3::Hasher::new();
    hasher.update(&(params.len() as u64).to_le_bytes());
    for (name, value) in params.iter() {
        update_prefixed(&mut hasher, name);
        update_prefixed(&mut hasher, value);
    }
    let hash = hasher.finalize();
    CacheKey::new(operation, hash.to_hex().as_str())
}

fn update_prefixed(hasher: &mut blake3::Hasher, field: &str) {
    hasher.update(&(field.len() as u64).to_le_bytes());
    hasher.update(field.as_bytes());
}

/// Pattern matching every key of `operation` for substring invalidation
#[must_use]
pub fn operation_pattern(operation: &str) -> String {
    format!("{operation}{}", domain::KEY_SEPARATOR)
}
