//! Infrastructure adapters
//!
//! Adapters connect application ports to concrete implementations.

mod alert_sink;
mod metrics_exporter;

pub use alert_sink::{ChannelAlertSink, TracingAlertSink};
pub use metrics_exporter::MetricsExporter;
#[cfg(test)]
pub(crate) use metrics_exporter::capture_metrics;
