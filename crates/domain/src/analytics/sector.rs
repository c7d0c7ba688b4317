//! Sector grouping

use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;

use serde::{Deserialize, Serialize};

use crate::RankingItem;

use super::guarded_percentage;

/// Bucket for items with no sector mapping
pub const UNCLASSIFIED_SECTOR: &str = "unclassified";

/// Partition items by sector
///
/// Items without an entry in `mapping` land in [`UNCLASSIFIED_SECTOR`].
/// Order within each bucket follows the input order.
pub fn group_by_sector<S: BuildHasher>(
    items: &[RankingItem],
    mapping: &HashMap<String, String, S>,
) -> BTreeMap<String, Vec<RankingItem>> {
    let mut groups: BTreeMap<String, Vec<RankingItem>> = BTreeMap::new();
    for item in items {
        let sector = mapping
            .get(&item.identifier)
            .map_or(UNCLASSIFIED_SECTOR, String::as_str);
        groups
            .entry(sector.to_string())
            .or_default()
            .push(item.clone());
    }
    groups
}

/// Aggregate view of one sector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorSummary {
    pub sector: String,
    pub stock_count: usize,
    pub total_trading_value: u128,
    /// Identifier with the highest trading value in the sector
    pub leading_identifier: Option<String>,
    /// Sector total as a percentage of the total across all sectors
    pub share_percent: f64,
}

/// Summarise grouped items, largest total trading value first
///
/// Ties keep sector-name order. The leader of a sector is the first item with
/// the maximum trading value.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn summarize_sectors(groups: &BTreeMap<String, Vec<RankingItem>>) -> Vec<SectorSummary> {
    let grand_total: u128 = groups
        .values()
        .flatten()
        .map(|item| u128::from(item.trading_value))
        .sum();

    let mut summaries: Vec<SectorSummary> = groups
        .iter()
        .map(|(sector, items)| {
            let total: u128 = items.iter().map(|item| u128::from(item.trading_value)).sum();
            let leader = items
                .iter()
                .reduce(|best, item| {
                    if item.trading_value > best.trading_value {
                        item
                    } else {
                        best
                    }
                })
                .map(|item| item.identifier.clone());
            SectorSummary {
                sector: sector.clone(),
                stock_count: items.len(),
                total_trading_value: total,
                leading_identifier: leader,
                share_percent: guarded_percentage(total as f64, grand_total as f64),
            }
        })
        .collect();

    summaries.sort_by(|a, b| b.total_trading_value.cmp(&a.total_trading_value));
    summaries
}
