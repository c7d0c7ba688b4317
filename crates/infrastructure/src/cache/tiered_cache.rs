//! Sharded in-memory two-tier cache
//!
//! Keys are spread over a fixed number of shards, each behind its own
//! `RwLock`. Both tier entries of one key live in the same slot, so every
//! mutation of a key happens under a single lock acquisition while unrelated
//! shards never contend.

use std::{
    collections::HashMap,
    hash::{BuildHasher, RandomState},
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use application::ports::{CacheStats, TieredCachePort};
use bytes::Bytes;
use domain::{CacheKey, Tier};
use parking_lot::RwLock;
use tracing::{debug, instrument};

/// Default maximum number of keys across all shards
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

/// Default number of shards
pub const DEFAULT_SHARD_COUNT: usize = 16;

/// Longest TTL an entry can carry (ten years)
const MAX_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

#[derive(Debug, Clone)]
struct Entry {
    payload: Bytes,
    created_at: Instant,
    expires_at: Instant,
}

impl Entry {
    fn new(payload: Bytes, now: Instant, ttl: Duration) -> Self {
        Self {
            payload,
            created_at: now,
            expires_at: now + ttl.min(MAX_TTL),
        }
    }

    fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }

    /// Expired for at least `retention`
    fn is_purgeable(&self, now: Instant, retention: Duration) -> bool {
        !self.is_fresh(now)
            && now
                .checked_duration_since(self.expires_at)
                .is_some_and(|age| age >= retention)
    }
}

/// Both tier entries of one key
#[derive(Debug, Default)]
struct Slot {
    fast: Option<Entry>,
    slow: Option<Entry>,
}

impl Slot {
    const fn entry(&self, tier: Tier) -> Option<&Entry> {
        match tier {
            Tier::Fast => self.fast.as_ref(),
            Tier::Slow => self.slow.as_ref(),
        }
    }

    const fn entry_mut(&mut self, tier: Tier) -> &mut Option<Entry> {
        match tier {
            Tier::Fast => &mut self.fast,
            Tier::Slow => &mut self.slow,
        }
    }

    fn entry_count(&self) -> usize {
        usize::from(self.fast.is_some()) + usize::from(self.slow.is_some())
    }

    fn is_empty(&self) -> bool {
        self.fast.is_none() && self.slow.is_none()
    }

    fn is_fully_expired(&self, now: Instant) -> bool {
        !Tier::ALL
            .iter()
            .filter_map(|tier| self.entry(*tier))
            .any(|entry| entry.is_fresh(now))
    }

    /// Expiry used to pick an eviction victim: Slow first, Fast otherwise
    fn eviction_deadline(&self) -> Option<Instant> {
        self.slow
            .as_ref()
            .or(self.fast.as_ref())
            .map(|entry| entry.expires_at)
    }

    /// Remove entries expired for at least `retention`, returning how many
    fn purge(&mut self, now: Instant, retention: Duration) -> usize {
        let mut removed = 0;
        for tier in Tier::ALL {
            let slot = self.entry_mut(tier);
            if slot.as_ref().is_some_and(|e| e.is_purgeable(now, retention)) {
                *slot = None;
                removed += 1;
            }
        }
        removed
    }
}

type Shard = HashMap<CacheKey, Slot>;

#[derive(Debug, Default)]
struct CacheCounters {
    fast_hits: AtomicU64,
    slow_hits: AtomicU64,
    stale_hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    invalidations: AtomicU64,
    purged: AtomicU64,
}

impl CacheCounters {
    fn hit(&self, tier: Tier) {
        match tier {
            Tier::Fast => self.fast_hits.fetch_add(1, Ordering::Relaxed),
            Tier::Slow => self.slow_hits.fetch_add(1, Ordering::Relaxed),
        };
    }

    fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }
}

/// Sharded two-tier TTL cache
///
/// Expiry is lazy: expired entries are reported absent by [`get`] but stay
/// in memory, available to [`get_stale`], until they are purged, evicted or
/// overwritten. Capacity is enforced per shard; a full shard first drops
/// fully expired keys, then the key whose Slow entry expires soonest.
///
/// [`get`]: TieredCachePort::get
/// [`get_stale`]: TieredCachePort::get_stale
pub struct TieredCache {
    shards: Box<[RwLock<Shard>]>,
    shard_capacity: usize,
    hasher: RandomState,
    counters: CacheCounters,
}

impl std::fmt::Debug for TieredCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredCache")
            .field("shards", &self.shards.len())
            .field("shard_capacity", &self.shard_capacity)
            .field("keys", &self.len())
            .finish_non_exhaustive()
    }
}

impl Default for TieredCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES, DEFAULT_SHARD_COUNT)
    }
}

impl TieredCache {
    /// Create a cache holding at most `max_entries` keys over `shard_count` shards
    ///
    /// Both values are raised to at least one. The per-shard capacity is
    /// `max_entries / shard_count` rounded up.
    #[must_use]
    pub fn new(max_entries: usize, shard_count: usize) -> Self {
        let shard_count = shard_count.max(1);
        let shard_capacity = max_entries.max(1).div_ceil(shard_count);
        let shards = (0..shard_count)
            .map(|_| RwLock::new(HashMap::new()))
            .collect();

        debug!(shard_count, shard_capacity, "Tiered cache created");

        Self {
            shards,
            shard_capacity,
            hasher: RandomState::new(),
            counters: CacheCounters::default(),
        }
    }

    /// Number of shards
    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Number of keys with at least one physically present entry
    #[must_use]
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().len()).sum()
    }

    /// Whether no key is present
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|shard| shard.read().is_empty())
    }

    /// Remove every entry
    pub fn clear(&self) {
        for shard in &*self.shards {
            shard.write().clear();
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn shard_for(&self, key: &CacheKey) -> &RwLock<Shard> {
        let index = self.hasher.hash_one(key) as usize % self.shards.len();
        &self.shards[index]
    }

    /// Write `entries` for `key`, making room first if the key is new
    fn write_slot(&self, key: &CacheKey, entries: &[(Tier, Duration)], payload: &Bytes) {
        let now = Instant::now();
        let mut shard = self.shard_for(key).write();

        if !shard.contains_key(key) && shard.len() >= self.shard_capacity {
            self.make_room(&mut shard, now);
        }

        let slot = shard.entry(key.clone()).or_default();
        for (tier, ttl) in entries {
            *slot.entry_mut(*tier) = Some(Entry::new(payload.clone(), now, *ttl));
        }
    }

    fn make_room(&self, shard: &mut Shard, now: Instant) {
        let before = shard.len();
        shard.retain(|_, slot| !slot.is_fully_expired(now));
        let mut evicted = before - shard.len();

        if shard.len() >= self.shard_capacity {
            let victim = shard
                .iter()
                .filter_map(|(key, slot)| slot.eviction_deadline().map(|at| (key, at)))
                .min_by_key(|(_, at)| *at)
                .map(|(key, _)| key.clone());
            if let Some(victim) = victim {
                shard.remove(&victim);
                evicted += 1;
                debug!(key = %victim, "Evicted soonest-expiring key");
            }
        }

        CacheCounters::add(&self.counters.evictions, evicted);
    }
}

impl TieredCachePort for TieredCache {
    fn get(&self, key: &CacheKey, tier: Tier) -> Option<Bytes> {
        let now = Instant::now();
        let payload = self
            .shard_for(key)
            .read()
            .get(key)
            .and_then(|slot| slot.entry(tier))
            .filter(|entry| entry.is_fresh(now))
            .map(|entry| entry.payload.clone());

        if payload.is_some() {
            self.counters.hit(tier);
            debug!(key = %key, tier = %tier, "Cache hit");
        } else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, tier = %tier, "Cache miss");
        }
        payload
    }

    fn get_stale(&self, key: &CacheKey) -> Option<Bytes> {
        let shard = self.shard_for(key).read();
        let payload = shard.get(key).and_then(|slot| {
            let newest = match (slot.fast.as_ref(), slot.slow.as_ref()) {
                (Some(fast), Some(slow)) if slow.created_at > fast.created_at => Some(slow),
                (Some(fast), _) => Some(fast),
                (None, slow) => slow,
            };
            newest.map(|entry| entry.payload.clone())
        });
        drop(shard);

        if payload.is_some() {
            self.counters.stale_hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Stale cache hit");
        } else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
        }
        payload
    }

    fn put(&self, key: &CacheKey, payload: Bytes, tier: Tier, ttl: Duration) {
        self.write_slot(key, &[(tier, ttl)], &payload);
        debug!(key = %key, tier = %tier, ttl_secs = ttl.as_secs(), "Cache set");
    }

    fn promote(&self, key: &CacheKey, fast_ttl: Duration) -> Option<Bytes> {
        let now = Instant::now();
        let mut shard = self.shard_for(key).write();
        let Some(slot) = shard.get_mut(key) else {
            drop(shard);
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        if let Some(fast) = slot.fast.as_ref().filter(|entry| entry.is_fresh(now)) {
            let payload = fast.payload.clone();
            drop(shard);
            self.counters.hit(Tier::Fast);
            debug!(key = %key, "Fast entry written before promotion, kept");
            return Some(payload);
        }

        let payload = slot
            .slow
            .as_ref()
            .filter(|entry| entry.is_fresh(now))
            .map(|entry| entry.payload.clone());
        if let Some(payload) = &payload {
            slot.fast = Some(Entry::new(payload.clone(), now, fast_ttl));
        }
        drop(shard);

        if payload.is_some() {
            self.counters.hit(Tier::Slow);
            debug!(key = %key, fast_ttl_secs = fast_ttl.as_secs(), "Promoted slow entry to fast tier");
        } else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
        }
        payload
    }

    fn put_all(&self, key: &CacheKey, payload: Bytes, fast_ttl: Duration, slow_ttl: Duration) {
        self.write_slot(
            key,
            &[(Tier::Fast, fast_ttl), (Tier::Slow, slow_ttl)],
            &payload,
        );
        debug!(
            key = %key,
            fast_ttl_secs = fast_ttl.as_secs(),
            slow_ttl_secs = slow_ttl.as_secs(),
            "Cache set in both tiers"
        );
    }

    #[instrument(skip(self), level = "debug")]
    fn invalidate_by_substring(&self, pattern: &str) -> usize {
        let mut removed = 0;
        for shard in &*self.shards {
            shard.write().retain(|key, slot| {
                if key.contains(pattern) {
                    removed += slot.entry_count();
                    false
                } else {
                    true
                }
            });
        }

        CacheCounters::add(&self.counters.invalidations, removed);
        debug!(removed, "Invalidated entries by pattern");
        removed
    }

    #[instrument(skip(self), level = "debug")]
    fn purge_expired(&self, retention: Duration) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        for shard in &*self.shards {
            shard.write().retain(|_, slot| {
                removed += slot.purge(now, retention);
                !slot.is_empty()
            });
        }

        CacheCounters::add(&self.counters.purged, removed);
        if removed > 0 {
            debug!(removed, "Purged expired entries");
        }
        removed
    }

    fn stats(&self) -> CacheStats {
        let (mut fast_entries, mut slow_entries) = (0_u64, 0_u64);
        for shard in &*self.shards {
            for slot in shard.read().values() {
                fast_entries += u64::from(slot.fast.is_some());
                slow_entries += u64::from(slot.slow.is_some());
            }
        }

        CacheStats {
            fast_hits: self.counters.fast_hits.load(Ordering::Relaxed),
            slow_hits: self.counters.slow_hits.load(Ordering::Relaxed),
            stale_hits: self.counters.stale_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            fast_entries,
            slow_entries,
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
            purged: self.counters.purged.load(Ordering::Relaxed),
        }
    }
}
