//! Infrastructure layer - Adapters for external systems
//!
//! Implements ports defined in the application layer: the sharded tiered
//! cache, alert sinks and the metrics exporter. Also holds configuration
//! loading, logging setup, the retry and circuit breaker helpers, and the [`MarketDataCache`]
//! composition root.

pub mod adapters;
pub mod cache;
pub mod circuit_breaker;
pub mod config;
mod market_data_cache;
pub mod retry;
pub mod telemetry;

pub use adapters::*;
pub use cache::{
    OperationTtl, TieredCache, TtlPolicy, derive_cache_key, operation_pattern,
    spawn_expiry_sweeper,
};
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState, guarded_fetch,
};
pub use config::{AppConfig, CacheConfig, FetchConfig};
pub use market_data_cache::{MarketDataCache, MarketDataCacheBuilder};
pub use retry::{RetryConfig, RetryResult, Retryable, retrying_fetch, with_retry, with_retry_when};
pub use telemetry::{LoggingConfig, TelemetryError, init_logging};
