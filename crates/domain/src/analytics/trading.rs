//! Investor trading figures

use crate::DomainError;

use super::{ensure_measurement, guarded_percentage};

/// Buy amount minus sell amount
#[must_use]
pub fn net_trading_amount(buy_amount: u64, sell_amount: u64) -> i128 {
    i128::from(buy_amount) - i128::from(sell_amount)
}

/// Total traded amount divided by total traded volume, `0.0` for zero volume
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn average_trading_price(total_amount: u64, total_volume: u64) -> f64 {
    if total_volume == 0 {
        return 0.0;
    }
    total_amount as f64 / total_volume as f64
}

/// Absolute investor amount as a percentage of the whole market amount
///
/// Net selling counts the same as net buying. Returns `0.0` when the market
/// amount is zero.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn market_impact_ratio(investor_amount: i128, total_market_amount: u64) -> f64 {
    guarded_percentage(
        investor_amount.unsigned_abs() as f64,
        total_market_amount as f64,
    )
}

/// Volume-weighted average price
///
/// `prices` and `volumes` pair up by index. Empty input or zero total volume
/// yields `0.0`; slices of different length are rejected.
#[allow(clippy::cast_precision_loss)]
pub fn volume_weighted_price(prices: &[f64], volumes: &[u64]) -> Result<f64, DomainError> {
    if prices.len() != volumes.len() {
        return Err(DomainError::invalid_parameters(format!(
            "{} prices but {} volumes",
            prices.len(),
            volumes.len()
        )));
    }

    let mut amount = 0.0;
    let mut total_volume: u128 = 0;
    for (price, volume) in prices.iter().zip(volumes) {
        let price = ensure_measurement("price", *price)?;
        amount += price * *volume as f64;
        total_volume += u128::from(*volume);
    }

    if total_volume == 0 {
        return Ok(0.0);
    }
    Ok(amount / total_volume as f64)
}
