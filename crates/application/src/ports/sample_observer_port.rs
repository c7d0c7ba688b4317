//! Sample observer port
//!
//! Receives every recorded [`MetricSample`] so it can be exported to an
//! external metrics pipeline.

use domain::MetricSample;
#[cfg(test)]
use mockall::automock;

/// Observer of recorded samples
#[cfg_attr(test, automock)]
pub trait SampleObserverPort: Send + Sync {
    /// Called once per recorded sample, outside the recorder's lock
    fn observe(&self, sample: &MetricSample);
}
