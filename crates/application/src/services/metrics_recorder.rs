//! Metrics recording service
//!
//! Keeps a rolling window of the most recent call samples plus cumulative
//! per-operation counters, and raises threshold alerts once the window is
//! full. Recording never fails and never awaits: alert sinks and sample
//! observers are called synchronously, their errors are logged and their
//! panics are caught.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};

use domain::MetricSample;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ApplicationError;
use crate::ports::{Alert, AlertKind, AlertPort, SampleObserverPort};

/// Default rolling window size
pub const DEFAULT_WINDOW_SIZE: usize = 100;

/// Default average-latency alert threshold in seconds
pub const DEFAULT_LATENCY_THRESHOLD_SECS: f64 = 2.0;

/// Default minimum cache hit rate
pub const DEFAULT_HIT_RATE_THRESHOLD: f64 = 0.70;

/// Default per-kind alert cooldown in seconds
pub const DEFAULT_ALERT_COOLDOWN_SECS: u64 = 300;

/// Alerting thresholds and window size
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsThresholds {
    /// Number of most recent samples evaluated (default: 100)
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Average latency above which `HighLatency` fires, in seconds (default: 2.0)
    #[serde(default = "default_latency_threshold")]
    pub latency_threshold_secs: f64,

    /// Hit rate below which `LowCacheHitRate` fires, 0.0 - 1.0 (default: 0.70)
    #[serde(default = "default_hit_rate_threshold")]
    pub hit_rate_threshold: f64,

    /// Minimum time between two alerts of the same kind, in seconds (default: 300)
    #[serde(default = "default_alert_cooldown")]
    pub alert_cooldown_secs: u64,
}

const fn default_window_size() -> usize {
    DEFAULT_WINDOW_SIZE
}

const fn default_latency_threshold() -> f64 {
    DEFAULT_LATENCY_THRESHOLD_SECS
}

const fn default_hit_rate_threshold() -> f64 {
    DEFAULT_HIT_RATE_THRESHOLD
}

const fn default_alert_cooldown() -> u64 {
    DEFAULT_ALERT_COOLDOWN_SECS
}

impl Default for MetricsThresholds {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            latency_threshold_secs: default_latency_threshold(),
            hit_rate_threshold: default_hit_rate_threshold(),
            alert_cooldown_secs: default_alert_cooldown(),
        }
    }
}

impl MetricsThresholds {
    /// Validate ranges
    ///
    /// # Errors
    ///
    /// Returns [`ApplicationError::Configuration`] for a zero window, a
    /// non-positive latency threshold or a hit-rate threshold outside 0.0 - 1.0.
    pub fn validate(&self) -> Result<(), ApplicationError> {
        if self.window_size == 0 {
            return Err(ApplicationError::Configuration(
                "metrics.window_size must be greater than 0".to_string(),
            ));
        }
        if !self.latency_threshold_secs.is_finite() || self.latency_threshold_secs <= 0.0 {
            return Err(ApplicationError::Configuration(format!(
                "metrics.latency_threshold_secs must be positive, got {}",
                self.latency_threshold_secs
            )));
        }
        if !(0.0..=1.0).contains(&self.hit_rate_threshold) {
            return Err(ApplicationError::Configuration(format!(
                "metrics.hit_rate_threshold must be within 0.0 - 1.0, got {}",
                self.hit_rate_threshold
            )));
        }
        Ok(())
    }

    /// Alert cooldown as a duration
    #[must_use]
    pub const fn alert_cooldown(&self) -> Duration {
        Duration::from_secs(self.alert_cooldown_secs)
    }
}

/// Cumulative figures for one operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationSummary {
    pub count: u64,
    pub average_latency: Duration,
    /// 0.0 - 1.0
    pub cache_hit_rate: f64,
}

/// Cumulative figures since the recorder was created
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub total_requests: u64,
    pub average_latency: Duration,
    /// 0.0 - 1.0
    pub cache_hit_rate: f64,
    pub per_operation: BTreeMap<String, OperationSummary>,
}

/// Latency distribution over the current window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowStats {
    pub samples: usize,
    pub min: Duration,
    pub max: Duration,
    pub mean: Duration,
    pub p50: Duration,
    pub p95: Duration,
    pub p99: Duration,
    /// 0.0 - 1.0
    pub cache_hit_rate: f64,
}

#[derive(Debug, Default, Clone, Copy)]
struct Totals {
    count: u64,
    hits: u64,
    latency: Duration,
}

impl Totals {
    fn add(&mut self, latency: Duration, cache_hit: bool) {
        self.count += 1;
        self.latency = self.latency.saturating_add(latency);
        if cache_hit {
            self.hits += 1;
        }
    }

    fn average_latency(&self) -> Duration {
        average(self.latency, self.count)
    }

    #[allow(clippy::cast_precision_loss)]
    fn hit_rate(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.hits as f64 / self.count as f64
        }
    }
}

#[derive(Debug, Default)]
struct RecorderState {
    window: VecDeque<MetricSample>,
    totals: Totals,
    per_operation: HashMap<String, Totals>,
    last_alert: HashMap<AlertKind, Instant>,
}

/// Rolling-window latency and hit-rate recorder with threshold alerts
pub struct MetricsRecorder {
    thresholds: MetricsThresholds,
    state: Mutex<RecorderState>,
    alert_sinks: Vec<Arc<dyn AlertPort>>,
    observers: Vec<Arc<dyn SampleObserverPort>>,
}

impl fmt::Debug for MetricsRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsRecorder")
            .field("thresholds", &self.thresholds)
            .field("alert_sinks", &self.alert_sinks.len())
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

impl MetricsRecorder {
    /// Create a recorder without sinks or observers
    ///
    /// A zero window size is treated as one.
    #[must_use]
    pub fn new(mut thresholds: MetricsThresholds) -> Self {
        thresholds.window_size = thresholds.window_size.max(1);
        let window = VecDeque::with_capacity(thresholds.window_size);
        Self {
            thresholds,
            state: Mutex::new(RecorderState {
                window,
                ..RecorderState::default()
            }),
            alert_sinks: Vec::new(),
            observers: Vec::new(),
        }
    }

    /// Add an alert sink
    #[must_use]
    pub fn with_alert_sink(mut self, sink: Arc<dyn AlertPort>) -> Self {
        self.alert_sinks.push(sink);
        self
    }

    /// Add a sample observer
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn SampleObserverPort>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Configured thresholds
    #[must_use]
    pub const fn thresholds(&self) -> &MetricsThresholds {
        &self.thresholds
    }

    /// Record one call
    pub fn record(&self, operation_name: &str, latency: Duration, cache_hit: bool) {
        let sample = MetricSample::now(operation_name, latency, cache_hit);

        let alerts = {
            let mut state = self.state.lock();
            state.totals.add(latency, cache_hit);
            state
                .per_operation
                .entry(operation_name.to_string())
                .or_default()
                .add(latency, cache_hit);

            if state.window.len() == self.thresholds.window_size {
                state.window.pop_front();
            }
            state.window.push_back(sample.clone());

            self.evaluate(&mut state)
        };

        for observer in &self.observers {
            let outcome = catch_unwind(AssertUnwindSafe(|| observer.observe(&sample)));
            if outcome.is_err() {
                warn!(operation = operation_name, "sample observer panicked");
            }
        }

        for alert in &alerts {
            self.dispatch(alert);
        }
    }

    /// Evaluate thresholds over a full window, returning alerts past their cooldown
    fn evaluate(&self, state: &mut RecorderState) -> Vec<Alert> {
        if state.window.len() < self.thresholds.window_size {
            return Vec::new();
        }

        let (latency_sum, hits) = state
            .window
            .iter()
            .fold((Duration::ZERO, 0u64), |(sum, hits), sample| {
                (
                    sum.saturating_add(sample.latency),
                    hits + u64::from(sample.cache_hit),
                )
            });
        let samples = state.window.len() as u64;
        let average_latency = average(latency_sum, samples).as_secs_f64();
        let hit_rate = ratio(hits, samples);

        let mut candidates = Vec::with_capacity(2);
        if average_latency > self.thresholds.latency_threshold_secs {
            candidates.push(Alert::new(
                AlertKind::HighLatency,
                average_latency,
                self.thresholds.latency_threshold_secs,
            ));
        }
        if hit_rate < self.thresholds.hit_rate_threshold {
            candidates.push(Alert::new(
                AlertKind::LowCacheHitRate,
                hit_rate,
                self.thresholds.hit_rate_threshold,
            ));
        }

        let cooldown = self.thresholds.alert_cooldown();
        let now = Instant::now();
        candidates.retain(|alert| {
            let cooling = state
                .last_alert
                .get(&alert.kind)
                .is_some_and(|last| now.duration_since(*last) < cooldown);
            if cooling {
                debug!(kind = %alert.kind, "alert suppressed by cooldown");
            } else {
                state.last_alert.insert(alert.kind, now);
            }
            !cooling
        });
        candidates
    }

    fn dispatch(&self, alert: &Alert) {
        warn!(kind = %alert.kind, observed = alert.observed, threshold = alert.threshold, "{}", alert.message);
        for sink in &self.alert_sinks {
            match catch_unwind(AssertUnwindSafe(|| sink.notify(alert))) {
                Ok(Ok(())) => {},
                Ok(Err(e)) => warn!(kind = %alert.kind, error = %e, "alert sink failed"),
                Err(_) => warn!(kind = %alert.kind, "alert sink panicked"),
            }
        }
    }

    /// Cumulative summary since creation
    #[must_use]
    pub fn summary(&self) -> MetricsSummary {
        let state = self.state.lock();
        let per_operation = state
            .per_operation
            .iter()
            .map(|(name, totals)| {
                (
                    name.clone(),
                    OperationSummary {
                        count: totals.count,
                        average_latency: totals.average_latency(),
                        cache_hit_rate: totals.hit_rate(),
                    },
                )
            })
            .collect();

        MetricsSummary {
            total_requests: state.totals.count,
            average_latency: state.totals.average_latency(),
            cache_hit_rate: state.totals.hit_rate(),
            per_operation,
        }
    }

    /// Latency distribution over the current window, `None` when empty
    #[must_use]
    pub fn window_stats(&self) -> Option<WindowStats> {
        let (mut latencies, hits) = {
            let state = self.state.lock();
            let latencies: Vec<Duration> = state.window.iter().map(|s| s.latency).collect();
            let hits = state.window.iter().filter(|s| s.cache_hit).count();
            (latencies, hits)
        };
        if latencies.is_empty() {
            return None;
        }
        latencies.sort_unstable();

        let samples = latencies.len();
        let total = latencies
            .iter()
            .fold(Duration::ZERO, |sum, latency| sum.saturating_add(*latency));

        Some(WindowStats {
            samples,
            min: latencies[0],
            max: latencies[samples - 1],
            mean: average(total, samples as u64),
            p50: percentile(&latencies, 50),
            p95: percentile(&latencies, 95),
            p99: percentile(&latencies, 99),
            cache_hit_rate: ratio(hits as u64, samples as u64),
        })
    }

    /// Samples currently in the window, oldest first
    #[must_use]
    pub fn recent_samples(&self) -> Vec<MetricSample> {
        self.state.lock().window.iter().cloned().collect()
    }
}

fn average(total: Duration, count: u64) -> Duration {
    if count == 0 {
        return Duration::ZERO;
    }
    let nanos = total.as_nanos() / u128::from(count);
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

#[allow(clippy::cast_precision_loss)]
fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// Nearest-rank percentile over sorted, non-empty input
fn percentile(sorted: &[Duration], pct: usize) -> Duration {
    let rank = (pct * sorted.len()).div_ceil(100).max(1);
    sorted[rank.min(sorted.len()) - 1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{MockAlertPort, MockSampleObserverPort};

    fn thresholds(window_size: usize, cooldown_secs: u64) -> MetricsThresholds {
        MetricsThresholds {
            window_size,
            alert_cooldown_secs: cooldown_secs,
            ..MetricsThresholds::default()
        }
    }

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn default_thresholds() {
        let t = MetricsThresholds::default();
        assert_eq!(t.window_size, 100);
        assert!((t.latency_threshold_secs - 2.0).abs() < f64::EPSILON);
        assert!((t.hit_rate_threshold - 0.70).abs() < f64::EPSILON);
        assert_eq!(t.alert_cooldown(), Duration::from_secs(300));
        assert!(t.validate().is_ok());
    }

    #[test]
    fn thresholds_deserialize_with_defaults() {
        let t: MetricsThresholds = serde_json::from_str(r#"{"window_size": 10}"#).unwrap();
        assert_eq!(t.window_size, 10);
        assert_eq!(t.alert_cooldown_secs, 300);
    }

    #[test]
    fn invalid_thresholds_are_rejected() {
        assert!(thresholds(0, 0).validate().is_err());
        let bad_rate = MetricsThresholds {
            hit_rate_threshold: 1.5,
            ..MetricsThresholds::default()
        };
        assert!(bad_rate.validate().is_err());
        let bad_latency = MetricsThresholds {
            latency_threshold_secs: 0.0,
            ..MetricsThresholds::default()
        };
        assert!(bad_latency.validate().is_err());
    }

    #[test]
    fn summary_tracks_cumulative_counters() {
        let recorder = MetricsRecorder::new(thresholds(2, 0));
        recorder.record("volume_ranking", ms(100), true);
        recorder.record("volume_ranking", ms(300), false);
        recorder.record("market_cap", ms(200), true);

        let summary = recorder.summary();
        assert_eq!(summary.total_requests, 3);
        assert_eq!(summary.average_latency, ms(200));
        assert!((summary.cache_hit_rate - 2.0 / 3.0).abs() < 1e-9);

        let volume = &summary.per_operation["volume_ranking"];
        assert_eq!(volume.count, 2);
        assert_eq!(volume.average_latency, ms(200));
        assert!((volume.cache_hit_rate - 0.5).abs() < f64::EPSILON);

        // window keeps only the last two, totals keep everything
        assert_eq!(recorder.recent_samples().len(), 2);
    }

    #[test]
    fn empty_recorder() {
        let recorder = MetricsRecorder::new(MetricsThresholds::default());
        let summary = recorder.summary();
        assert_eq!(summary.total_requests, 0);
        assert_eq!(summary.average_latency, Duration::ZERO);
        assert!(recorder.window_stats().is_none());
    }

    #[test]
    fn no_alert_before_window_is_full() {
        let mut sink = MockAlertPort::new();
        sink.expect_notify().never();
        let recorder = MetricsRecorder::new(thresholds(5, 0)).with_alert_sink(Arc::new(sink));

        for _ in 0..4 {
            recorder.record("volume_ranking", Duration::from_secs(10), false);
        }
    }

    #[test]
    fn high_latency_alert_fires_once_window_is_full() {
        let mut sink = MockAlertPort::new();
        sink.expect_notify()
            .withf(|alert| alert.kind == AlertKind::HighLatency && alert.observed > 2.0)
            .times(1)
            .returning(|_| Ok(()));
        let recorder = MetricsRecorder::new(thresholds(3, 300)).with_alert_sink(Arc::new(sink));

        for _ in 0..3 {
            recorder.record("investor_ranking", Duration::from_secs(3), true);
        }
    }

    #[test]
    fn low_hit_rate_alert() {
        let mut sink = MockAlertPort::new();
        sink.expect_notify()
            .withf(|alert| {
                alert.kind == AlertKind::LowCacheHitRate
                    && (alert.observed - 0.5).abs() < f64::EPSILON
            })
            .times(1)
            .returning(|_| Ok(()));
        let recorder = MetricsRecorder::new(thresholds(4, 300)).with_alert_sink(Arc::new(sink));

        for hit in [true, false, true, false] {
            recorder.record("sector_volume", ms(10), hit);
        }
    }

    #[test]
    fn cooldown_suppresses_repeats() {
        let mut sink = MockAlertPort::new();
        sink.expect_notify().times(1).returning(|_| Ok(()));
        let recorder = MetricsRecorder::new(thresholds(2, 300)).with_alert_sink(Arc::new(sink));

        for _ in 0..10 {
            recorder.record("volume_ranking", ms(10), false);
        }
    }

    #[test]
    fn zero_cooldown_alerts_on_every_full_window() {
        let mut sink = MockAlertPort::new();
        // window full from the 2nd sample on: 9 evaluations
        sink.expect_notify().times(9).returning(|_| Ok(()));
        let recorder = MetricsRecorder::new(thresholds(2, 0)).with_alert_sink(Arc::new(sink));

        for _ in 0..10 {
            recorder.record("volume_ranking", ms(10), false);
        }
    }

    #[test]
    fn failing_sink_does_not_affect_recording() {
        let mut failing = MockAlertPort::new();
        failing
            .expect_notify()
            .returning(|_| Err(ApplicationError::AlertDelivery("channel closed".into())));
        let mut healthy = MockAlertPort::new();
        healthy.expect_notify().times(1).returning(|_| Ok(()));

        let recorder = MetricsRecorder::new(thresholds(1, 300))
            .with_alert_sink(Arc::new(failing))
            .with_alert_sink(Arc::new(healthy));
        recorder.record("volume_ranking", ms(10), false);
        assert_eq!(recorder.summary().total_requests, 1);
    }

    #[derive(Debug)]
    struct PanickingSink;

    impl AlertPort for PanickingSink {
        fn notify(&self, _alert: &Alert) -> Result<(), ApplicationError> {
            panic!("sink bug");
        }
    }

    #[test]
    fn panicking_sink_is_contained() {
        let recorder =
            MetricsRecorder::new(thresholds(1, 0)).with_alert_sink(Arc::new(PanickingSink));
        recorder.record("volume_ranking", ms(10), false);
        recorder.record("volume_ranking", ms(10), false);
        assert_eq!(recorder.summary().total_requests, 2);
    }

    #[test]
    fn observers_see_every_sample() {
        let mut observer = MockSampleObserverPort::new();
        observer
            .expect_observe()
            .withf(|sample| sample.operation_name == "market_cap")
            .times(3)
            .return_const(());
        let recorder = MetricsRecorder::new(MetricsThresholds::default())
            .with_observer(Arc::new(observer));

        for _ in 0..3 {
            recorder.record("market_cap", ms(5), true);
        }
    }

    #[test]
    fn window_stats_percentiles() {
        let recorder = MetricsRecorder::new(thresholds(100, 0));
        for millis in 1..=100 {
            recorder.record("volume_ranking", ms(millis), millis % 2 == 0);
        }

        let stats = recorder.window_stats().unwrap();
        assert_eq!(stats.samples, 100);
        assert_eq!(stats.min, ms(1));
        assert_eq!(stats.max, ms(100));
        assert_eq!(stats.p50, ms(50));
        assert_eq!(stats.p95, ms(95));
        assert_eq!(stats.p99, ms(99));
        assert_eq!(stats.mean, Duration::from_micros(50_500));
        assert!((stats.cache_hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn percentile_of_single_sample() {
        let sorted = [ms(7)];
        assert_eq!(percentile(&sorted, 50), ms(7));
        assert_eq!(percentile(&sorted, 99), ms(7));
    }
}
