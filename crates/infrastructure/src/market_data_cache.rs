//! Composition root for the market-data cache
//!
//! Wires the sharded store, fetch coordinator, metrics recorder, TTL policy
//! and ranking analyzer from one [`AppConfig`], and owns the upstream circuit
//! breaker and the optional expiry sweeper. Dropping the [`MarketDataCache`]
//! stops the sweeper.

use std::future::Future;
use std::sync::Arc;

use application::ports::{AlertPort, CacheStats, SampleObserverPort, TieredCachePort};
use application::services::{
    FetchCoordinator, FetchStats, MetricsRecorder, MetricsSummary, RankingAnalyzer, WindowStats,
};
use application::ApplicationError;
use domain::{CacheKey, QueryParams};
use serde::{Serialize, de::DeserializeOwned};
use tokio::task::JoinHandle;
use tracing::{info, instrument};

use crate::adapters::MetricsExporter;
use crate::cache::{
    TieredCache, TtlPolicy, derive_cache_key, operation_pattern, spawn_expiry_sweeper,
};
use crate::circuit_breaker::{CircuitBreaker, guarded_fetch};
use crate::config::AppConfig;
use crate::retry::retrying_fetch;

/// Builder collecting the alert sinks and sample observers
pub struct MarketDataCacheBuilder {
    config: AppConfig,
    alert_sinks: Vec<Arc<dyn AlertPort>>,
    observers: Vec<Arc<dyn SampleObserverPort>>,
}

impl std::fmt::Debug for MarketDataCacheBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketDataCacheBuilder")
            .field("config", &self.config)
            .field("alert_sinks", &self.alert_sinks.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl MarketDataCacheBuilder {
    /// Deliver threshold alerts to `sink`
    #[must_use]
    pub fn alert_sink(mut self, sink: Arc<dyn AlertPort>) -> Self {
        self.alert_sinks.push(sink);
        self
    }

    /// Forward every recorded sample to `observer`
    #[must_use]
    pub fn observer(mut self, observer: Arc<dyn SampleObserverPort>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Validate the configuration and assemble the cache
    ///
    /// Starts the expiry sweeper when `cache.sweep_interval_secs` is set,
    /// which requires a running tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ApplicationError::Configuration`] for an invalid
    /// configuration or a sweeper requested outside a tokio runtime.
    pub fn build(self) -> Result<MarketDataCache, ApplicationError> {
        let Self {
            config,
            alert_sinks,
            observers,
        } = self;
        config.validate()?;

        let store = Arc::new(TieredCache::new(
            config.cache.max_entries,
            config.cache.shard_count,
        ));
        let cache: Arc<dyn TieredCachePort> = store.clone();

        let recorder = alert_sinks.into_iter().fold(
            MetricsRecorder::new(config.metrics.clone()),
            MetricsRecorder::with_alert_sink,
        );
        let recorder = Arc::new(
            observers
                .into_iter()
                .fold(recorder, MetricsRecorder::with_observer),
        );

        let coordinator =
            FetchCoordinator::new(Arc::clone(&cache)).with_recorder(Arc::clone(&recorder));
        let policy = TtlPolicy::from_config(&config.cache, &config.fetch);
        let analyzer = RankingAnalyzer::new(config.analysis.clone())?;
        let breaker = Arc::new(CircuitBreaker::new(
            "upstream",
            config.circuit_breaker.clone(),
        ));

        let sweeper = match config.cache.sweep_interval() {
            Some(interval) => {
                if tokio::runtime::Handle::try_current().is_err() {
                    return Err(ApplicationError::Configuration(
                        "cache.sweep_interval_secs requires a tokio runtime".to_string(),
                    ));
                }
                Some(spawn_expiry_sweeper(
                    Arc::clone(&cache),
                    interval,
                    config.cache.stale_retention(),
                ))
            },
            None => None,
        };

        info!(
            max_entries = config.cache.max_entries,
            shards = store.shard_count(),
            sweeper = sweeper.is_some(),
            "Market data cache ready"
        );

        Ok(MarketDataCache {
            config,
            store,
            coordinator,
            recorder,
            policy,
            analyzer,
            breaker,
            sweeper,
        })
    }
}

/// Cached access to the upstream market-data source
///
/// Every call goes through [`get_or_fetch`](Self::get_or_fetch): the key is
/// derived from the operation and its parameters, the TTLs from the
/// operation and the market-hours flag, and concurrent misses on one key
/// share a single upstream fetch.
pub struct MarketDataCache {
    config: AppConfig,
    store: Arc<TieredCache>,
    coordinator: FetchCoordinator,
    recorder: Arc<MetricsRecorder>,
    policy: TtlPolicy,
    analyzer: RankingAnalyzer,
    breaker: Arc<CircuitBreaker>,
    sweeper: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for MarketDataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketDataCache")
            .field("store", &self.store)
            .field("coordinator", &self.coordinator)
            .field("breaker", &self.breaker)
            .field("sweeper", &self.sweeper.is_some())
            .finish_non_exhaustive()
    }
}

impl MarketDataCache {
    /// Start building from `config`
    #[must_use]
    pub fn builder(config: AppConfig) -> MarketDataCacheBuilder {
        MarketDataCacheBuilder {
            config,
            alert_sinks: Vec::new(),
            observers: Vec::new(),
        }
    }

    /// Build with no alert sinks or observers
    ///
    /// # Errors
    ///
    /// See [`MarketDataCacheBuilder::build`].
    pub fn new(config: AppConfig) -> Result<Self, ApplicationError> {
        Self::builder(config).build()
    }

    /// Cache key for one call of `operation`
    pub fn key_for(
        &self,
        operation: &str,
        params: &QueryParams,
    ) -> Result<CacheKey, ApplicationError> {
        Ok(derive_cache_key(operation, params)?)
    }

    /// Return the cached result of `operation(params)`, fetching it on a miss
    ///
    /// While the market is closed an expired payload is served instead of
    /// fetching, if one is still held.
    ///
    /// # Errors
    ///
    /// [`ApplicationError::Domain`] for an invalid operation name, otherwise
    /// see [`FetchCoordinator::get_or_fetch`].
    #[instrument(level = "debug", skip(self, params, fetch_fn))]
    pub async fn get_or_fetch<T, F, Fut, E>(
        &self,
        operation: &str,
        params: &QueryParams,
        market_open: bool,
        fetch_fn: F,
    ) -> Result<T, ApplicationError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let key = self.key_for(operation, params)?;
        let options = self.policy.options_for(operation, market_open);
        self.coordinator.get_or_fetch(&key, options, fetch_fn).await
    }

    /// Like [`get_or_fetch`](Self::get_or_fetch), with the upstream call
    /// retried per `retry.*` and guarded by the circuit breaker
    ///
    /// The retries and the breaker check all run inside the single
    /// in-flight fetch, under its timeout. While the circuit is open a miss
    /// fails without calling `fetch_fn`; cached and stale payloads are
    /// still served.
    ///
    /// # Errors
    ///
    /// As [`get_or_fetch`](Self::get_or_fetch). An open circuit surfaces as
    /// [`ApplicationError::FetchFailed`] whose source is a
    /// [`CircuitBreakerError::Open`](crate::CircuitBreakerError::Open).
    pub async fn get_or_fetch_resilient<T, F, Fut, E>(
        &self,
        operation: &str,
        params: &QueryParams,
        market_open: bool,
        fetch_fn: F,
    ) -> Result<T, ApplicationError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let retrying = retrying_fetch(self.config.retry.clone(), fetch_fn);
        let guarded = guarded_fetch(Arc::clone(&self.breaker), retrying);
        self.get_or_fetch(operation, params, market_open, guarded)
            .await
    }

    /// Drop every cached entry of `operation` in both tiers
    pub fn invalidate_operation(&self, operation: &str) -> usize {
        self.coordinator.invalidate(&operation_pattern(operation))
    }

    /// Drop every cached entry whose key contains `pattern`
    pub fn invalidate(&self, pattern: &str) -> usize {
        self.coordinator.invalidate(pattern)
    }

    /// Drop entries expired for longer than the configured stale retention
    pub fn purge_expired(&self) -> usize {
        self.store.purge_expired(self.config.cache.stale_retention())
    }

    /// Publish cache and fetch counters through `exporter`
    pub fn export_stats(&self, exporter: &MetricsExporter) {
        exporter.export_cache_stats(&self.cache_stats());
        exporter.export_fetch_stats(&self.fetch_stats());
    }

    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.store.stats()
    }

    #[must_use]
    pub fn fetch_stats(&self) -> FetchStats {
        self.coordinator.stats()
    }

    #[must_use]
    pub fn metrics_summary(&self) -> MetricsSummary {
        self.recorder.summary()
    }

    #[must_use]
    pub fn window_stats(&self) -> Option<WindowStats> {
        self.recorder.window_stats()
    }

    #[must_use]
    pub const fn analyzer(&self) -> &RankingAnalyzer {
        &self.analyzer
    }

    #[must_use]
    pub const fn coordinator(&self) -> &FetchCoordinator {
        &self.coordinator
    }

    #[must_use]
    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    #[must_use]
    pub const fn policy(&self) -> &TtlPolicy {
        &self.policy
    }

    #[must_use]
    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Whether the background expiry sweeper is running
    #[must_use]
    pub fn has_sweeper(&self) -> bool {
        self.sweeper.as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for MarketDataCache {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.take() {
            handle.abort();
        }
    }
}
