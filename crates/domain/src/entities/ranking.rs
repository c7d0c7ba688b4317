//! Trading-value ranking entities

use serde::{Deserialize, Serialize};

use crate::DomainError;

/// One ranked security
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingItem {
    /// 1-based position in the ranking
    pub rank: u32,
    /// Security identifier (e.g. ticker or short code)
    pub identifier: String,
    /// Display name, empty when unknown
    #[serde(default)]
    pub name: String,
    /// Price × traded volume, the ranking metric
    pub trading_value: u64,
    /// Traded share volume
    #[serde(default)]
    pub volume: u64,
}

impl RankingItem {
    /// Create a ranking item with the mandatory fields
    pub fn new(rank: u32, identifier: impl Into<String>, trading_value: u64) -> Self {
        Self {
            rank,
            identifier: identifier.into(),
            name: String::new(),
            trading_value,
            volume: 0,
        }
    }

    /// Set the display name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the traded volume
    #[must_use]
    pub const fn with_volume(mut self, volume: u64) -> Self {
        self.volume = volume;
        self
    }
}

/// An ordered ranking
///
/// Ranks run `1..=n` without gaps and trading value never increases with
/// rank. Both properties are checked on construction and deserialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<RankingItem>", into = "Vec<RankingItem>")]
pub struct Ranking {
    items: Vec<RankingItem>,
}

impl Ranking {
    /// Wrap already-ranked items, validating the ordering invariant
    pub fn new(items: Vec<RankingItem>) -> Result<Self, DomainError> {
        for (index, item) in items.iter().enumerate() {
            let expected = u32::try_from(index + 1)
                .map_err(|_| DomainError::invariant("ranking too long"))?;
            if item.rank != expected {
                return Err(DomainError::invariant(format!(
                    "expected rank {expected} at position {index}, found {}",
                    item.rank
                )));
            }
        }
        if let Some(pair) = items
            .windows(2)
            .find(|pair| pair[1].trading_value > pair[0].trading_value)
        {
            return Err(DomainError::invariant(format!(
                "trading value increases from rank {} ({}) to rank {} ({})",
                pair[0].rank, pair[0].trading_value, pair[1].rank, pair[1].trading_value
            )));
        }
        Ok(Self { items })
    }

    /// Sort items by trading value (descending, stable) and assign ranks
    pub fn from_unsorted(mut items: Vec<RankingItem>) -> Self {
        items.sort_by(|a, b| b.trading_value.cmp(&a.trading_value));
        for (rank, item) in (1u32..).zip(items.iter_mut()) {
            item.rank = rank;
        }
        Self { items }
    }

    /// Ranked items, best first
    #[must_use]
    pub fn items(&self) -> &[RankingItem] {
        &self.items
    }

    /// First `n` items (fewer if the ranking is shorter)
    #[must_use]
    pub fn top(&self, n: usize) -> &[RankingItem] {
        &self.items[..n.min(self.items.len())]
    }

    /// Look up an item by identifier
    #[must_use]
    pub fn find(&self, identifier: &str) -> Option<&RankingItem> {
        self.items.iter().find(|item| item.identifier == identifier)
    }

    /// Sum of all trading values
    #[must_use]
    pub fn total_trading_value(&self) -> u128 {
        self.items
            .iter()
            .map(|item| u128::from(item.trading_value))
            .sum()
    }

    /// Number of ranked items
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the ranking is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Consume the ranking, returning its items
    #[must_use]
    pub fn into_items(self) -> Vec<RankingItem> {
        self.items
    }
}

impl TryFrom<Vec<RankingItem>> for Ranking {
    type Error = DomainError;

    fn try_from(items: Vec<RankingItem>) -> Result<Self, Self::Error> {
        Self::new(items)
    }
}

impl From<Ranking> for Vec<RankingItem> {
    fn from(ranking: Ranking) -> Self {
        ranking.items
    }
}
