//! Fetch coordination service
//!
//! Sits between callers and an expensive upstream fetch. A request is served
//! from the Fast tier, then the Slow tier (promoting into Fast), then, while
//! the market is closed, from any stale payload. Only a full miss reaches the
//! upstream, and concurrent misses for one key share a single fetch.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use domain::{CacheKey, Tier};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::sync::oneshot;
use tracing::{debug, instrument, warn};

use crate::error::ApplicationError;
use crate::ports::{TieredCachePort, decode_payload, encode_payload};
use crate::services::MetricsRecorder;

/// Default Fast tier TTL in seconds
pub const DEFAULT_FAST_TTL_SECS: u64 = 60;

/// Default Slow tier TTL in seconds
pub const DEFAULT_SLOW_TTL_SECS: u64 = 300;

/// Default upstream fetch timeout in seconds
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

type FetchResult = Result<Bytes, ApplicationError>;
type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;
type InFlightMap = Arc<Mutex<HashMap<CacheKey, SharedFetch>>>;

/// Per-call cache and fetch policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    /// TTL written to the Fast tier on fetch and on promotion
    pub fast_ttl: Duration,
    /// TTL written to the Slow tier on fetch
    pub slow_ttl: Duration,
    /// Upper bound on one upstream call
    pub timeout: Duration,
    /// Serve an expired payload instead of fetching (market closed)
    pub serve_stale: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            fast_ttl: Duration::from_secs(DEFAULT_FAST_TTL_SECS),
            slow_ttl: Duration::from_secs(DEFAULT_SLOW_TTL_SECS),
            timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            serve_stale: false,
        }
    }
}

impl FetchOptions {
    /// Options with the given TTLs and the default timeout
    #[must_use]
    pub const fn new(fast_ttl: Duration, slow_ttl: Duration) -> Self {
        Self {
            fast_ttl,
            slow_ttl,
            timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            serve_stale: false,
        }
    }

    /// Set the upstream timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enable or disable the stale-only policy
    #[must_use]
    pub const fn with_serve_stale(mut self, serve_stale: bool) -> Self {
        self.serve_stale = serve_stale;
        self
    }
}

/// How a call was answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchSource {
    Fast,
    Slow,
    Stale,
    Fetched,
    Joined,
}

impl FetchSource {
    const fn is_cache_hit(self) -> bool {
        matches!(self, Self::Fast | Self::Slow | Self::Stale)
    }
}

enum Flight {
    Ready(Bytes),
    Pending(SharedFetch, FetchSource),
}

/// Request-level coordinator counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchStats {
    /// Requests answered from the Fast tier
    pub fast_hits: u64,
    /// Requests answered from the Slow tier (and promoted)
    pub slow_hits: u64,
    /// Requests answered with an expired payload
    pub stale_hits: u64,
    /// Upstream fetches started
    pub fetches: u64,
    /// Requests that joined a fetch already in flight
    pub coalesced: u64,
    /// Fetches that returned an error (including encoding errors)
    pub failures: u64,
    /// Fetches that exceeded their timeout
    pub timeouts: u64,
    /// Fetches that ended without a result
    pub aborted: u64,
}

#[derive(Debug, Default)]
struct FetchCounters {
    fast_hits: AtomicU64,
    slow_hits: AtomicU64,
    stale_hits: AtomicU64,
    fetches: AtomicU64,
    coalesced: AtomicU64,
    failures: AtomicU64,
    timeouts: AtomicU64,
    aborted: AtomicU64,
}

impl FetchCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> FetchStats {
        FetchStats {
            fast_hits: self.fast_hits.load(Ordering::Relaxed),
            slow_hits: self.slow_hits.load(Ordering::Relaxed),
            stale_hits: self.stale_hits.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            aborted: self.aborted.load(Ordering::Relaxed),
        }
    }
}

/// Removes the in-flight record when the fetch task ends, including on panic
struct InFlightGuard {
    in_flight: InFlightMap,
    key: CacheKey,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.key);
    }
}

/// Two-tier read-through cache with single-flight fetches
///
/// Cloning is cheap and clones share the cache, the in-flight table and the
/// counters.
#[derive(Clone)]
pub struct FetchCoordinator {
    cache: Arc<dyn TieredCachePort>,
    in_flight: InFlightMap,
    counters: Arc<FetchCounters>,
    recorder: Option<Arc<MetricsRecorder>>,
}

impl fmt::Debug for FetchCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchCoordinator")
            .field("cache", &self.cache)
            .field("in_flight", &self.in_flight_count())
            .field("recorder", &self.recorder.is_some())
            .finish()
    }
}

impl FetchCoordinator {
    /// Create a coordinator over `cache`
    #[must_use]
    pub fn new(cache: Arc<dyn TieredCachePort>) -> Self {
        Self {
            cache,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            counters: Arc::new(FetchCounters::default()),
            recorder: None,
        }
    }

    /// Record a latency sample for every call
    #[must_use]
    pub fn with_recorder(mut self, recorder: Arc<MetricsRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Return the cached value for `key`, fetching it at most once concurrently
    ///
    /// `fetch_fn` is invoked only on a full miss and only by the caller that
    /// starts the fetch; callers arriving while it runs await the same
    /// outcome. The fetch runs on its own task, so dropping this future never
    /// cancels it. Failures leave the cache untouched and are not cached.
    ///
    /// # Errors
    ///
    /// - [`ApplicationError::FetchFailed`] when `fetch_fn` returns an error
    /// - [`ApplicationError::FetchTimeout`] when it exceeds `options.timeout`
    /// - [`ApplicationError::FetchAborted`] when the fetch task panics
    /// - [`ApplicationError::Serialization`] when the payload cannot be
    ///   encoded or decoded as `T`
    #[instrument(level = "debug", skip(self, key, options, fetch_fn), fields(key = %key))]
    pub async fn get_or_fetch<T, F, Fut, E>(
        &self,
        key: &CacheKey,
        options: FetchOptions,
        fetch_fn: F,
    ) -> Result<T, ApplicationError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let started = Instant::now();
        let outcome = self.resolve(key, options, fetch_fn).await;

        let cache_hit = matches!(&outcome, Ok((_, source)) if source.is_cache_hit());
        if let Some(recorder) = &self.recorder {
            recorder.record(key.operation(), started.elapsed(), cache_hit);
        }

        let (bytes, _) = outcome?;
        decode_payload(&bytes)
    }

    async fn resolve<T, F, Fut, E>(
        &self,
        key: &CacheKey,
        options: FetchOptions,
        fetch_fn: F,
    ) -> Result<(Bytes, FetchSource), ApplicationError>
    where
        T: Serialize + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        if let Some(bytes) = self.cache.get(key, Tier::Fast) {
            debug!("fast tier hit");
            FetchCounters::bump(&self.counters.fast_hits);
            return Ok((bytes, FetchSource::Fast));
        }

        if let Some(bytes) = self.cache.promote(key, options.fast_ttl) {
            debug!("slow tier hit, promoted to fast tier");
            FetchCounters::bump(&self.counters.slow_hits);
            return Ok((bytes, FetchSource::Slow));
        }

        let stale = if options.serve_stale {
            self.cache.get_stale(key)
        } else {
            None
        };
        if let Some(bytes) = stale {
            debug!("market closed, serving stale payload");
            FetchCounters::bump(&self.counters.stale_hits);
            return Ok((bytes, FetchSource::Stale));
        }

        match self.join_or_start(key, options, fetch_fn) {
            Flight::Ready(bytes) => Ok((bytes, FetchSource::Fast)),
            Flight::Pending(fetch, source) => fetch.await.map(|bytes| (bytes, source)),
        }
    }

    /// Join the fetch in flight for `key`, or register and start a new one
    fn join_or_start<T, F, Fut, E>(&self, key: &CacheKey, options: FetchOptions, fetch_fn: F) -> Flight
    where
        T: Serialize + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let (tx, fetch) = {
            let mut in_flight = self.in_flight.lock();

            // A fetch may have settled between the tier checks and this lock
            if let Some(bytes) = self.cache.get(key, Tier::Fast) {
                FetchCounters::bump(&self.counters.fast_hits);
                return Flight::Ready(bytes);
            }

            if let Some(existing) = in_flight.get(key) {
                debug!("joining in-flight fetch");
                FetchCounters::bump(&self.counters.coalesced);
                return Flight::Pending(existing.clone(), FetchSource::Joined);
            }

            let (tx, rx) = oneshot::channel::<FetchResult>();
            let abort_key = key.clone();
            let counters = Arc::clone(&self.counters);
            let fetch: SharedFetch = async move {
                rx.await.unwrap_or_else(|_| {
                    FetchCounters::bump(&counters.aborted);
                    warn!(key = %abort_key, "fetch task ended without a result");
                    Err(ApplicationError::FetchAborted {
                        key: abort_key,
                        reason: "fetch task panicked or was cancelled".to_string(),
                    })
                })
            }
            .boxed()
            .shared();

            in_flight.insert(key.clone(), fetch.clone());
            (tx, fetch)
        };

        FetchCounters::bump(&self.counters.fetches);
        debug!("starting upstream fetch");
        self.spawn_fetch(key.clone(), options, fetch_fn, tx);
        Flight::Pending(fetch, FetchSource::Fetched)
    }

    fn spawn_fetch<T, F, Fut, E>(
        &self,
        key: CacheKey,
        options: FetchOptions,
        fetch_fn: F,
        tx: oneshot::Sender<FetchResult>,
    ) where
        T: Serialize + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let cache = Arc::clone(&self.cache);
        let counters = Arc::clone(&self.counters);
        let guard = InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            key: key.clone(),
        };

        tokio::spawn(async move {
            let result = match tokio::time::timeout(options.timeout, fetch_fn()).await {
                Ok(Ok(value)) => encode_payload(&value),
                Ok(Err(err)) => Err(ApplicationError::fetch_failed(key.clone(), err)),
                Err(_) => Err(ApplicationError::FetchTimeout {
                    key: key.clone(),
                    timeout: options.timeout,
                }),
            };

            match &result {
                Ok(bytes) => {
                    cache.put_all(&key, bytes.clone(), options.fast_ttl, options.slow_ttl);
                    debug!(key = %key, bytes = bytes.len(), "fetched payload stored in both tiers");
                },
                Err(ApplicationError::FetchTimeout { timeout, .. }) => {
                    FetchCounters::bump(&counters.timeouts);
                    warn!(key = %key, ?timeout, "upstream fetch timed out");
                },
                Err(err) => {
                    FetchCounters::bump(&counters.failures);
                    warn!(key = %key, error = %err, "upstream fetch failed");
                },
            }

            drop(guard);
            // Every waiter holds the shared receiver; a send error means none is left
            let _ = tx.send(result);
        });
    }

    /// Remove every cached entry whose key contains `pattern`
    ///
    /// Fetches already in flight are not affected.
    #[instrument(level = "debug", skip(self))]
    pub fn invalidate(&self, pattern: &str) -> usize {
        let removed = self.cache.invalidate_by_substring(pattern);
        debug!(removed, "invalidated cache entries");
        removed
    }

    /// Number of fetches currently in flight
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Snapshot of the coordinator counters
    #[must_use]
    pub fn stats(&self) -> FetchStats {
        self.counters.snapshot()
    }

    /// Underlying cache store
    #[must_use]
    pub fn cache(&self) -> &Arc<dyn TieredCachePort> {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use thiserror::Error;

    use super::*;
    use crate::ports::{CacheStats, TieredCachePortExt};
    use crate::services::MetricsThresholds;

    /// Minimal map-backed store with real expiry
    #[derive(Debug, Default)]
    struct MemoryCache {
        entries: Mutex<HashMap<(CacheKey, Tier), (Bytes, Instant)>>,
    }

    impl TieredCachePort for MemoryCache {
        fn get(&self, key: &CacheKey, tier: Tier) -> Option<Bytes> {
            let entries = self.entries.lock();
            entries
                .get(&(key.clone(), tier))
                .filter(|(_, expires_at)| Instant::now() < *expires_at)
                .map(|(bytes, _)| bytes.clone())
        }

        fn get_stale(&self, key: &CacheKey) -> Option<Bytes> {
            let entries = self.entries.lock();
            Tier::ALL
                .iter()
                .find_map(|tier| entries.get(&(key.clone(), *tier)))
                .map(|(bytes, _)| bytes.clone())
        }

        fn put(&self, key: &CacheKey, payload: Bytes, tier: Tier, ttl: Duration) {
            self.entries
                .lock()
                .insert((key.clone(), tier), (payload, Instant::now() + ttl));
        }

        fn promote(&self, key: &CacheKey, fast_ttl: Duration) -> Option<Bytes> {
            let now = Instant::now();
            let mut entries = self.entries.lock();
            let fresh = |entry: Option<&(Bytes, Instant)>| {
                entry
                    .filter(|(_, expires_at)| now < *expires_at)
                    .map(|(bytes, _)| bytes.clone())
            };
            if let Some(bytes) = fresh(entries.get(&(key.clone(), Tier::Fast))) {
                return Some(bytes);
            }
            let bytes = fresh(entries.get(&(key.clone(), Tier::Slow)))?;
            entries.insert((key.clone(), Tier::Fast), (bytes.clone(), now + fast_ttl));
            Some(bytes)
        }

        fn put_all(&self, key: &CacheKey, payload: Bytes, fast_ttl: Duration, slow_ttl: Duration) {
            let now = Instant::now();
            let mut entries = self.entries.lock();
            entries.insert((key.clone(), Tier::Fast), (payload.clone(), now + fast_ttl));
            entries.insert((key.clone(), Tier::Slow), (payload, now + slow_ttl));
        }

        fn invalidate_by_substring(&self, pattern: &str) -> usize {
            let mut entries = self.entries.lock();
            let before = entries.len();
            entries.retain(|(key, _), _| !key.contains(pattern));
            before - entries.len()
        }

        fn purge_expired(&self, _retention: Duration) -> usize {
            0
        }

        fn stats(&self) -> CacheStats {
            CacheStats::default()
        }
    }

    #[derive(Debug, Error)]
    #[error("upstream unavailable")]
    struct UpstreamDown;

    fn key(operation: &str) -> CacheKey {
        CacheKey::new(operation, "0f1e2d3c").unwrap()
    }

    fn coordinator() -> (FetchCoordinator, Arc<MemoryCache>) {
        let cache = Arc::new(MemoryCache::default());
        (FetchCoordinator::new(cache.clone()), cache)
    }

    fn options() -> FetchOptions {
        FetchOptions::new(Duration::from_secs(60), Duration::from_secs(300))
    }

    #[tokio::test]
    async fn miss_fetches_and_fills_both_tiers() {
        let (coordinator, cache) = coordinator();
        let key = key("volume_ranking");

        let value: Vec<u32> = coordinator
            .get_or_fetch(&key, options(), || async { Ok::<_, UpstreamDown>(vec![1, 2, 3]) })
            .await
            .unwrap();

        assert_eq!(value, vec![1, 2, 3]);
        assert!(cache.get(&key, Tier::Fast).is_some());
        assert!(cache.get(&key, Tier::Slow).is_some());
        assert_eq!(coordinator.stats().fetches, 1);
        assert_eq!(coordinator.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn fast_hit_skips_fetch() {
        let (coordinator, cache) = coordinator();
        let key = key("volume_ranking");
        cache
            .put_typed(&key, &"cached", Duration::from_secs(60), Duration::from_secs(300))
            .unwrap();

        let value: String = coordinator
            .get_or_fetch(&key, options(), || async {
                Err::<String, _>(UpstreamDown)
            })
            .await
            .unwrap();

        assert_eq!(value, "cached");
        let stats = coordinator.stats();
        assert_eq!(stats.fast_hits, 1);
        assert_eq!(stats.fetches, 0);
    }

    #[tokio::test]
    async fn slow_hit_promotes_to_fast() {
        let (coordinator, cache) = coordinator();
        let key = key("market_cap");
        cache.put(
            &key,
            Bytes::from_static(b"42"),
            Tier::Slow,
            Duration::from_secs(300),
        );
        assert!(cache.get(&key, Tier::Fast).is_none());

        let value: u32 = coordinator
            .get_or_fetch(&key, options(), || async { Ok::<u32, UpstreamDown>(0) })
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(cache.get(&key, Tier::Fast), Some(Bytes::from_static(b"42")));
        assert_eq!(coordinator.stats().slow_hits, 1);
        assert_eq!(coordinator.stats().fetches, 0);
    }

    #[tokio::test]
    async fn concurrent_misses_share_one_fetch() {
        let (coordinator, _cache) = coordinator();
        let key = key("investor_ranking");
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..10)
            .map(|_| {
                let coordinator = coordinator.clone();
                let key = key.clone();
                let calls = Arc::clone(&calls);
                tokio::spawn(async move {
                    coordinator
                        .get_or_fetch(&key, options(), move || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Ok::<_, UpstreamDown>("shared".to_string())
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), "shared");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stats = coordinator.stats();
        assert_eq!(stats.fetches, 1);
        // Late arrivals may hit the Fast tier instead of joining
        assert_eq!(stats.coalesced + stats.fast_hits, 9);
    }

    #[tokio::test]
    async fn failure_reaches_every_waiter_and_is_not_cached() {
        let (coordinator, cache) = coordinator();
        let key = key("sector_volume");

        let first = {
            let coordinator = coordinator.clone();
            let key = key.clone();
            tokio::spawn(async move {
                coordinator
                    .get_or_fetch(&key, options(), || async {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Err::<String, _>(UpstreamDown)
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second: Result<String, _> = coordinator
            .get_or_fetch(&key, options(), || async { Ok::<_, UpstreamDown>("late".into()) })
            .await;

        let first = first.await.unwrap();
        assert!(matches!(first, Err(ApplicationError::FetchFailed { .. })));
        assert!(matches!(second, Err(ApplicationError::FetchFailed { .. })));
        assert!(cache.get_stale(&key).is_none());
        assert_eq!(coordinator.stats().failures, 1);
        assert_eq!(coordinator.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn failure_does_not_block_next_fetch() {
        let (coordinator, _cache) = coordinator();
        let key = key("unusual_volume");

        let failed: Result<u8, _> = coordinator
            .get_or_fetch(&key, options(), || async { Err::<u8, _>(UpstreamDown) })
            .await;
        assert!(failed.is_err());

        let recovered: u8 = coordinator
            .get_or_fetch(&key, options(), || async { Ok::<u8, UpstreamDown>(7) })
            .await
            .unwrap();
        assert_eq!(recovered, 7);
        assert_eq!(coordinator.stats().fetches, 2);
    }

    #[tokio::test]
    async fn timeout_fails_all_waiters() {
        let (coordinator, cache) = coordinator();
        let key = key("volume_change");
        let options = options().with_timeout(Duration::from_millis(20));

        let result: Result<String, _> = coordinator
            .get_or_fetch(&key, options, || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, UpstreamDown>("too late".into())
            })
            .await;

        assert!(matches!(result, Err(ApplicationError::FetchTimeout { .. })));
        assert!(cache.get_stale(&key).is_none());
        assert_eq!(coordinator.stats().timeouts, 1);
    }

    #[tokio::test]
    #[allow(unreachable_code)]
    async fn panic_in_fetch_is_reported_as_aborted() {
        let (coordinator, _cache) = coordinator();
        let key = key("market_cap");

        let result: Result<String, _> = coordinator
            .get_or_fetch(&key, options(), || async {
                panic!("upstream client bug");
                Ok::<String, UpstreamDown>(String::new())
            })
            .await;

        assert!(matches!(result, Err(ApplicationError::FetchAborted { .. })));
        assert_eq!(coordinator.in_flight_count(), 0);
        assert_eq!(coordinator.stats().aborted, 1);
    }

    #[tokio::test]
    async fn stale_payload_served_when_market_closed() {
        let (coordinator, cache) = coordinator();
        let key = key("volume_ranking");
        cache.put_all(&key, Bytes::from_static(b"\"old\""), Duration::ZERO, Duration::ZERO);

        let closed = options().with_serve_stale(true);
        let value: String = coordinator
            .get_or_fetch(&key, closed, || async { Ok::<_, UpstreamDown>("new".into()) })
            .await
            .unwrap();
        assert_eq!(value, "old");
        assert_eq!(coordinator.stats().stale_hits, 1);

        let value: String = coordinator
            .get_or_fetch(&key, options(), || async { Ok::<_, UpstreamDown>("new".into()) })
            .await
            .unwrap();
        assert_eq!(value, "new");
    }

    #[tokio::test]
    async fn stale_policy_fetches_when_nothing_cached() {
        let (coordinator, _cache) = coordinator();
        let key = key("volume_ranking");
        let value: String = coordinator
            .get_or_fetch(&key, options().with_serve_stale(true), || async {
                Ok::<_, UpstreamDown>("fresh".into())
            })
            .await
            .unwrap();
        assert_eq!(value, "fresh");
        assert_eq!(coordinator.stats().fetches, 1);
    }

    #[tokio::test]
    async fn dropped_waiter_does_not_cancel_fetch() {
        let (coordinator, cache) = coordinator();
        let key = key("investor_ranking");

        let waiter = {
            let coordinator = coordinator.clone();
            let key = key.clone();
            tokio::spawn(async move {
                coordinator
                    .get_or_fetch(&key, options(), || async {
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        Ok::<_, UpstreamDown>(5u32)
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        waiter.abort();

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(cache.get(&key, Tier::Fast), Some(Bytes::from_static(b"5")));
        assert_eq!(coordinator.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn invalidate_removes_matching_entries() {
        let (coordinator, cache) = coordinator();
        let volume = key("volume_ranking");
        let cap = key("market_cap");
        cache.put_all(&volume, Bytes::from_static(b"1"), Duration::from_secs(60), Duration::from_secs(300));
        cache.put_all(&cap, Bytes::from_static(b"2"), Duration::from_secs(60), Duration::from_secs(300));

        assert_eq!(coordinator.invalidate("volume_ranking"), 2);
        assert!(cache.get_stale(&volume).is_none());
        assert!(cache.get(&cap, Tier::Fast).is_some());
    }

    #[tokio::test]
    async fn undecodable_payload_is_a_serialization_error() {
        let (coordinator, cache) = coordinator();
        let key = key("market_cap");
        cache.put_all(&key, Bytes::from_static(b"\"text\""), Duration::from_secs(60), Duration::from_secs(300));

        let result: Result<u32, _> = coordinator
            .get_or_fetch(&key, options(), || async { Ok::<u32, UpstreamDown>(1) })
            .await;
        assert!(matches!(result, Err(ApplicationError::Serialization(_))));
    }

    #[tokio::test]
    async fn recorder_sees_hits_and_misses() {
        let cache = Arc::new(MemoryCache::default());
        let recorder = Arc::new(MetricsRecorder::new(MetricsThresholds::default()));
        let coordinator = FetchCoordinator::new(cache).with_recorder(Arc::clone(&recorder));
        let key = key("volume_ranking");

        for _ in 0..3 {
            let _: u8 = coordinator
                .get_or_fetch(&key, options(), || async { Ok::<u8, UpstreamDown>(1) })
                .await
                .unwrap();
        }

        let summary = recorder.summary();
        assert_eq!(summary.total_requests, 3);
        let per_op = &summary.per_operation["volume_ranking"];
        assert_eq!(per_op.count, 3);
        assert!((per_op.cache_hit_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn default_options() {
        let options = FetchOptions::default();
        assert_eq!(options.fast_ttl, Duration::from_secs(60));
        assert_eq!(options.slow_ttl, Duration::from_secs(300));
        assert_eq!(options.timeout, Duration::from_secs(30));
        assert!(!options.serve_stale);
    }
}
