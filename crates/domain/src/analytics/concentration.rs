//! Concentration ratio

use crate::{DomainError, RankingItem};

use super::{ensure_measurement, guarded_percentage};

/// Share of total trading value held by the first `top_n` items, in percent
///
/// Items are taken in the order given, which for a [`Ranking`](crate::Ranking)
/// is best-first. Returns `0.0` for empty input or a zero total.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn concentration_ratio(items: &[RankingItem], top_n: usize) -> f64 {
    let total: u128 = items
        .iter()
        .map(|item| u128::from(item.trading_value))
        .sum();
    if total == 0 {
        return 0.0;
    }
    let top: u128 = items
        .iter()
        .take(top_n)
        .map(|item| u128::from(item.trading_value))
        .sum();

    guarded_percentage(top as f64, total as f64)
}

/// Concentration ratio over raw trading values already ordered best-first
pub fn concentration_ratio_of_values(values: &[f64], top_n: usize) -> Result<f64, DomainError> {
    let mut total = 0.0;
    let mut top = 0.0;
    for (index, value) in values.iter().enumerate() {
        let value = ensure_measurement("trading value", *value)?;
        total += value;
        if index < top_n {
            top += value;
        }
    }
    Ok(guarded_percentage(top, total))
}
