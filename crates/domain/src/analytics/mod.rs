//! Numeric analytics over ranking data
//!
//! Pure, deterministic transforms. Zero denominators never surface as errors
//! or as NaN/inf: they yield a defined `0.0`. Malformed input (negative or
//! non-finite values, out-of-range ratios) is rejected with
//! [`DomainError::InvalidParameters`](crate::DomainError::InvalidParameters).

mod concentration;
mod sector;
mod trading;
mod turnover;
mod unusual_volume;
mod volume;

pub use concentration::{concentration_ratio, concentration_ratio_of_values};
pub use sector::{SectorSummary, UNCLASSIFIED_SECTOR, group_by_sector, summarize_sectors};
pub use trading::{
    average_trading_price, market_impact_ratio, net_trading_amount, volume_weighted_price,
};
pub use turnover::{turnover_rate, turnover_rate_with_free_float};
pub use unusual_volume::{
    DEFAULT_RATIO_THRESHOLD, DEFAULT_Z_THRESHOLD, STD_EPSILON, UnusualVolumeDetector,
    VolumeAnomaly, detect_unusual_volume, mean, population_std_dev, volume_volatility,
};
pub use volume::{
    VolumePattern, VolumeTrend, anomaly_score, classify_volume_pattern, market_cap_ratio,
    volume_change_rate, volume_trend,
};

use crate::DomainError;

/// `numerator / denominator * 100`, or `0.0` when the denominator is zero
pub(crate) fn guarded_percentage(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator * 100.0
    }
}

/// Reject negative or non-finite measurements
pub(crate) fn ensure_measurement(name: &str, value: f64) -> Result<f64, DomainError> {
    if !value.is_finite() {
        return Err(DomainError::invalid_parameters(format!(
            "{name} must be finite, got {value}"
        )));
    }
    if value < 0.0 {
        return Err(DomainError::invalid_parameters(format!(
            "{name} must not be negative, got {value}"
        )));
    }
    Ok(value)
}
