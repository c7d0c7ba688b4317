//! `metrics` facade exporter
//!
//! Publishes recorded samples and cache counters through the `metrics`
//! macros. Whatever recorder the process installs (Prometheus, StatsD, ...)
//! receives them; without one the calls are no-ops.

use application::ports::{CacheStats, SampleObserverPort};
use application::services::FetchStats;
use domain::MetricSample;
use metrics::{counter, gauge, histogram};

/// Sample observer forwarding to the `metrics` facade
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsExporter;

impl MetricsExporter {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Publish a cache statistics snapshot as gauges
    #[allow(clippy::cast_precision_loss)]
    pub fn export_cache_stats(&self, stats: &CacheStats) {
        let tiers = [
            ("fast", stats.fast_hits, stats.fast_entries),
            ("slow", stats.slow_hits, stats.slow_entries),
        ];
        for (tier, hits, entries) in tiers {
            gauge!("ranking_cache_tier_hits", "tier" => tier).set(hits as f64);
            gauge!("ranking_cache_tier_entries", "tier" => tier).set(entries as f64);
        }
        gauge!("ranking_cache_stale_hits").set(stats.stale_hits as f64);
        gauge!("ranking_cache_misses").set(stats.misses as f64);
        gauge!("ranking_cache_evictions").set(stats.evictions as f64);
        gauge!("ranking_cache_invalidations").set(stats.invalidations as f64);
        gauge!("ranking_cache_purged").set(stats.purged as f64);
        gauge!("ranking_cache_hit_rate").set(stats.hit_rate());
    }

    /// Publish fetch coordinator counters as gauges
    #[allow(clippy::cast_precision_loss)]
    pub fn export_fetch_stats(&self, stats: &FetchStats) {
        gauge!("ranking_cache_fetches").set(stats.fetches as f64);
        gauge!("ranking_cache_fetches_coalesced").set(stats.coalesced as f64);
        gauge!("ranking_cache_fetch_failures").set(stats.failures as f64);
        gauge!("ranking_cache_fetch_timeouts").set(stats.timeouts as f64);
    }
}

impl SampleObserverPort for MetricsExporter {
    fn observe(&self, sample: &MetricSample) {
        let labels = [
            ("operation", sample.operation_name.clone()),
            ("cache", if sample.cache_hit { "hit" } else { "miss" }.to_string()),
        ];

        counter!("ranking_cache_requests_total", &labels).increment(1);
        histogram!("ranking_cache_request_duration_seconds", &labels)
            .record(sample.latency_secs());
    }
}

/// Run `f` against a debugging recorder and return what it published
#[cfg(test)]
pub(crate) fn capture_metrics(
    f: impl FnOnce(),
) -> Vec<(String, Vec<(String, String)>, metrics_util::debugging::DebugValue)> {
    let recorder = metrics_util::debugging::DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    metrics::with_local_recorder(&recorder, f);

    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(key, _, _, value)| {
            let (_, key) = key.into_parts();
            let labels = key
                .labels()
                .map(|label| (label.key().to_string(), label.value().to_string()))
                .collect();
            (key.name().to_string(), labels, value)
        })
        .collect()
}
