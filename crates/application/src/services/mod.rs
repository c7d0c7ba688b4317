//! Application services - Use case implementations

mod fetch_coordinator;
mod metrics_recorder;
mod ranking_analyzer;

pub use fetch_coordinator::{
    DEFAULT_FAST_TTL_SECS, DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_SLOW_TTL_SECS, FetchCoordinator,
    FetchOptions, FetchStats,
};
pub use metrics_recorder::{
    MetricsRecorder, MetricsSummary, MetricsThresholds, OperationSummary, WindowStats,
};
pub use ranking_analyzer::{AnalysisSettings, RankingAnalyzer, RankingReport, UnusualVolumeFlag};
