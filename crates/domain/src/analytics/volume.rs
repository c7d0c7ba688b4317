//! Volume change, trend and pattern helpers

use std::fmt;

use serde::{Deserialize, Serialize};

use super::guarded_percentage;

/// Slope fraction of the latest value that counts as a trend
const TREND_SLOPE_FRACTION: f64 = 0.05;

/// Price move, in percent, that splits surges into rise, fall and neutral
const SURGE_PRICE_MOVE_PCT: f64 = 3.0;

/// Percent change from `previous` to `current`
///
/// Returns `0.0` when `previous` is zero.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn volume_change_rate(current: u64, previous: u64) -> f64 {
    let delta = current as f64 - previous as f64;
    guarded_percentage(delta, previous as f64)
}

/// Direction of a volume series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeTrend {
    Increasing,
    Decreasing,
    Stable,
}

impl fmt::Display for VolumeTrend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Increasing => "increasing",
            Self::Decreasing => "decreasing",
            Self::Stable => "stable",
        };
        f.write_str(label)
    }
}

/// Classify a series, oldest value first
///
/// Fits a least-squares line over the index; the series trends when the slope
/// exceeds 5% of the latest value in either direction. Fewer than two points
/// is [`VolumeTrend::Stable`].
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn volume_trend(series: &[u64]) -> VolumeTrend {
    let Some(&last) = series.last() else {
        return VolumeTrend::Stable;
    };
    if series.len() < 2 {
        return VolumeTrend::Stable;
    }

    let n = series.len() as f64;
    let (mut x_sum, mut y_sum, mut xy_sum, mut x2_sum) = (0.0, 0.0, 0.0, 0.0);
    for (index, value) in series.iter().enumerate() {
        let x = index as f64;
        let y = *value as f64;
        x_sum += x;
        y_sum += y;
        xy_sum += x * y;
        x2_sum += x * x;
    }

    let denominator = n.mul_add(x2_sum, -(x_sum * x_sum));
    if denominator == 0.0 {
        return VolumeTrend::Stable;
    }
    let slope = n.mul_add(xy_sum, -(x_sum * y_sum)) / denominator;
    let band = last as f64 * TREND_SLOPE_FRACTION;

    if slope > band {
        VolumeTrend::Increasing
    } else if slope < -band {
        VolumeTrend::Decreasing
    } else {
        VolumeTrend::Stable
    }
}

/// Bucket a volume ratio (percent of average) into a 0–5 score
///
/// Boundaries: <100, <200, <300, <500, <1000, then 5. Non-finite or negative
/// ratios score 0.
#[must_use]
pub fn anomaly_score(ratio_percent: f64) -> u8 {
    if !ratio_percent.is_finite() {
        return 0;
    }
    match ratio_percent {
        r if r < 100.0 => 0,
        r if r < 200.0 => 1,
        r if r < 300.0 => 2,
        r if r < 500.0 => 3,
        r if r < 1000.0 => 4,
        _ => 5,
    }
}

/// Shape of a volume move together with the accompanying price move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VolumePattern {
    Normal,
    Moderate,
    HighWithRise,
    HighWithFall,
    SurgeWithRise,
    SurgeWithFall,
    SurgeNeutral,
}

impl VolumePattern {
    /// Whether the pattern is one of the surge variants
    #[must_use]
    pub const fn is_surge(self) -> bool {
        matches!(
            self,
            Self::SurgeWithRise | Self::SurgeWithFall | Self::SurgeNeutral
        )
    }
}

/// Classify a volume ratio (percent) and price change (percent)
///
/// Below 150% is normal. From 500% a move is a surge, split at ±3% price
/// change. From 200% it is high, split by the sign of the price change (a
/// flat price counts as a fall). Anything in between is moderate.
#[must_use]
pub fn classify_volume_pattern(ratio_percent: f64, price_change_pct: f64) -> VolumePattern {
    if ratio_percent < 150.0 || ratio_percent.is_nan() {
        VolumePattern::Normal
    } else if ratio_percent >= 500.0 {
        if price_change_pct > SURGE_PRICE_MOVE_PCT {
            VolumePattern::SurgeWithRise
        } else if price_change_pct < -SURGE_PRICE_MOVE_PCT {
            VolumePattern::SurgeWithFall
        } else {
            VolumePattern::SurgeNeutral
        }
    } else if ratio_percent >= 200.0 {
        if price_change_pct > 0.0 {
            VolumePattern::HighWithRise
        } else {
            VolumePattern::HighWithFall
        }
    } else {
        VolumePattern::Moderate
    }
}

/// Trading value as a percentage of market capitalisation
///
/// Returns `0.0` when `market_cap` is zero.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn market_cap_ratio(trading_value: u64, market_cap: u64) -> f64 {
    guarded_percentage(trading_value as f64, market_cap as f64)
}
