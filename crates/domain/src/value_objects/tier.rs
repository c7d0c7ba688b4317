//! Cache tier value object

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the two cache layers
///
/// `Fast` is short-lived and is always repopulated from `Slow` (promotion)
/// or from a fresh fetch. `Slow` holds the longer-lived copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Short-TTL promotion target, checked first
    Fast,
    /// Long-TTL backing layer
    Slow,
}

impl Tier {
    /// Both tiers in lookup order
    pub const ALL: [Self; 2] = [Self::Fast, Self::Slow];

    /// Short label used in logs and metrics
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Slow => "slow",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
