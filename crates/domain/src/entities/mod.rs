//! Domain entities - Rankings and observed samples

mod metric_sample;
mod ranking;

pub use metric_sample::MetricSample;
pub use ranking::{Ranking, RankingItem};
