//! Turnover rate

use crate::DomainError;

use super::guarded_percentage;

/// Traded volume as a percentage of all outstanding shares
///
/// Returns `0.0` when `total_shares` is zero.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn turnover_rate(volume: u64, total_shares: u64) -> f64 {
    guarded_percentage(volume as f64, total_shares as f64)
}

/// Traded volume as a percentage of freely tradable shares
///
/// `free_float_ratio` is the tradable fraction of outstanding shares and must
/// lie in `(0, 1]`. Returns `0.0` when `total_shares` is zero.
#[allow(clippy::cast_precision_loss)]
pub fn turnover_rate_with_free_float(
    volume: u64,
    total_shares: u64,
    free_float_ratio: f64,
) -> Result<f64, DomainError> {
    if !free_float_ratio.is_finite() || free_float_ratio <= 0.0 || free_float_ratio > 1.0 {
        return Err(DomainError::invalid_parameters(format!(
            "free float ratio must be in (0, 1], got {free_float_ratio}"
        )));
    }
    if total_shares == 0 {
        return Ok(0.0);
    }
    let float_shares = total_shares as f64 * free_float_ratio;
    Ok(guarded_percentage(volume as f64, float_shares))
}
