//! Ranking analysis service
//!
//! Applies the domain analytics to fetched rankings using configured
//! thresholds: concentration at a fixed top-n, unusual-volume scanning
//! against per-identifier histories, and sector breakdowns.

use std::collections::HashMap;
use std::hash::BuildHasher;

use domain::analytics::{
    DEFAULT_RATIO_THRESHOLD, DEFAULT_Z_THRESHOLD, SectorSummary, UnusualVolumeDetector,
    VolumeAnomaly, VolumePattern, VolumeTrend, anomaly_score, classify_volume_pattern,
    concentration_ratio, group_by_sector, summarize_sectors, volume_trend,
};
use domain::{Ranking, RankingItem};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ApplicationError;

/// Default number of leading items used for concentration
pub const DEFAULT_CONCENTRATION_TOP_N: usize = 5;

/// Default number of most recent periods used as history
pub const DEFAULT_HISTORY_WINDOW: usize = 20;

/// Analysis configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSettings {
    /// Z-score threshold for unusual volume (default: 2.0)
    #[serde(default = "default_z_score_threshold")]
    pub z_score_threshold: f64,

    /// Volume ratio threshold in percent of the mean (default: 200.0)
    #[serde(default = "default_ratio_threshold")]
    pub ratio_threshold_percent: f64,

    /// Most recent periods considered as history (default: 20)
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Leading items summed for the concentration ratio (default: 5)
    #[serde(default = "default_concentration_top_n")]
    pub concentration_top_n: usize,
}

const fn default_z_score_threshold() -> f64 {
    DEFAULT_Z_THRESHOLD
}

const fn default_ratio_threshold() -> f64 {
    DEFAULT_RATIO_THRESHOLD
}

const fn default_history_window() -> usize {
    DEFAULT_HISTORY_WINDOW
}

const fn default_concentration_top_n() -> usize {
    DEFAULT_CONCENTRATION_TOP_N
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            z_score_threshold: default_z_score_threshold(),
            ratio_threshold_percent: default_ratio_threshold(),
            history_window: default_history_window(),
            concentration_top_n: default_concentration_top_n(),
        }
    }
}

/// An item flagged as trading unusual volume
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnusualVolumeFlag {
    pub item: RankingItem,
    pub anomaly: VolumeAnomaly,
    /// 0 - 5 bucket of the volume ratio
    pub score: u8,
    /// Direction of the history the item was compared against
    pub trend: VolumeTrend,
}

/// Headline figures for one ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingReport {
    pub item_count: usize,
    pub total_trading_value: u128,
    /// Share of the leading items, in percent
    pub concentration: f64,
    pub sectors: Vec<SectorSummary>,
}

/// Analyzer bound to one set of settings
#[derive(Debug, Clone)]
pub struct RankingAnalyzer {
    settings: AnalysisSettings,
    detector: UnusualVolumeDetector,
}

impl RankingAnalyzer {
    /// Create an analyzer
    ///
    /// # Errors
    ///
    /// Returns [`ApplicationError::Domain`] when a threshold is not positive,
    /// or [`ApplicationError::Configuration`] for a zero history window.
    pub fn new(settings: AnalysisSettings) -> Result<Self, ApplicationError> {
        if settings.history_window == 0 {
            return Err(ApplicationError::Configuration(
                "analysis.history_window must be greater than 0".to_string(),
            ));
        }
        let detector =
            UnusualVolumeDetector::new(settings.z_score_threshold, settings.ratio_threshold_percent)?;
        Ok(Self { settings, detector })
    }

    /// Configured settings
    #[must_use]
    pub const fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    /// Concentration ratio of the configured number of leading items
    #[must_use]
    pub fn concentration(&self, ranking: &Ranking) -> f64 {
        concentration_ratio(ranking.items(), self.settings.concentration_top_n)
    }

    /// Check `current` against the most recent `history_window` periods
    ///
    /// `history` is ordered oldest first.
    ///
    /// # Errors
    ///
    /// Propagates [`ApplicationError::Domain`] for invalid measurements.
    #[allow(clippy::cast_precision_loss)]
    pub fn detect(&self, current: u64, history: &[u64]) -> Result<VolumeAnomaly, ApplicationError> {
        let recent = self.recent(history);
        let values: Vec<f64> = recent.iter().map(|v| *v as f64).collect();
        Ok(self.detector.detect(current as f64, &values)?)
    }

    /// Flag ranking items whose volume is unusual against their own history
    ///
    /// Items without a history entry are skipped. Flags are ordered by volume
    /// ratio, highest first.
    ///
    /// # Errors
    ///
    /// Propagates [`ApplicationError::Domain`] for invalid measurements.
    pub fn scan_unusual<S: BuildHasher>(
        &self,
        ranking: &Ranking,
        histories: &HashMap<String, Vec<u64>, S>,
    ) -> Result<Vec<UnusualVolumeFlag>, ApplicationError> {
        let mut flags = Vec::new();
        for item in ranking.items() {
            let Some(history) = histories.get(&item.identifier) else {
                continue;
            };
            let anomaly = self.detect(item.volume, history)?;
            if anomaly.is_unusual {
                flags.push(UnusualVolumeFlag {
                    item: item.clone(),
                    anomaly,
                    score: anomaly_score(anomaly.ratio_percent),
                    trend: volume_trend(self.recent(history)),
                });
            }
        }

        flags.sort_by(|a, b| b.anomaly.ratio_percent.total_cmp(&a.anomaly.ratio_percent));
        debug!(
            scanned = ranking.len(),
            flagged = flags.len(),
            "unusual volume scan complete"
        );
        Ok(flags)
    }

    /// Classify a flag's volume move together with the price change in percent
    #[must_use]
    pub fn pattern(flag: &UnusualVolumeFlag, price_change_pct: f64) -> VolumePattern {
        classify_volume_pattern(flag.anomaly.ratio_percent, price_change_pct)
    }

    /// Sector breakdown of a ranking, largest sector first
    #[must_use]
    pub fn sectors<S: BuildHasher>(
        &self,
        ranking: &Ranking,
        mapping: &HashMap<String, String, S>,
    ) -> Vec<SectorSummary> {
        summarize_sectors(&group_by_sector(ranking.items(), mapping))
    }

    /// Headline figures and sector breakdown
    #[must_use]
    pub fn report<S: BuildHasher>(
        &self,
        ranking: &Ranking,
        mapping: &HashMap<String, String, S>,
    ) -> RankingReport {
        RankingReport {
            item_count: ranking.len(),
            total_trading_value: ranking.total_trading_value(),
            concentration: self.concentration(ranking),
            sectors: self.sectors(ranking, mapping),
        }
    }

    fn recent<'a>(&self, history: &'a [u64]) -> &'a [u64] {
        let start = history.len().saturating_sub(self.settings.history_window);
        &history[start..]
    }
}

impl Default for RankingAnalyzer {
    fn default() -> Self {
        Self {
            settings: AnalysisSettings::default(),
            detector: UnusualVolumeDetector::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use domain::DomainError;

    use super::*;

    fn ranking() -> Ranking {
        Ranking::from_unsorted(vec![
            RankingItem::new(0, "005930", 5_000).with_volume(5_000_000),
            RankingItem::new(0, "000660", 3_000).with_volume(1_000_000),
            RankingItem::new(0, "035420", 1_000).with_volume(3_000_000),
            RankingItem::new(0, "051910", 500).with_volume(100),
            RankingItem::new(0, "006400", 300).with_volume(100),
            RankingItem::new(0, "035720", 200).with_volume(100),
        ])
    }

    fn histories() -> HashMap<String, Vec<u64>> {
        let typical = vec![900_000, 950_000, 1_100_000, 1_050_000, 980_000];
        HashMap::from([
            ("005930".to_string(), typical.clone()),
            ("000660".to_string(), typical.clone()),
            ("035420".to_string(), typical),
        ])
    }

    #[test]
    fn default_settings() {
        let settings = AnalysisSettings::default();
        assert_eq!(settings.concentration_top_n, 5);
        assert_eq!(settings.history_window, 20);
        assert!((settings.z_score_threshold - 2.0).abs() < f64::EPSILON);
        assert!((settings.ratio_threshold_percent - 200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let zero_window = AnalysisSettings {
            history_window: 0,
            ..AnalysisSettings::default()
        };
        assert!(matches!(
            RankingAnalyzer::new(zero_window),
            Err(ApplicationError::Configuration(_))
        ));

        let bad_z = AnalysisSettings {
            z_score_threshold: -1.0,
            ..AnalysisSettings::default()
        };
        assert!(matches!(
            RankingAnalyzer::new(bad_z),
            Err(ApplicationError::Domain(DomainError::InvalidParameters(_)))
        ));
    }

    #[test]
    fn concentration_uses_top_n() {
        let analyzer = RankingAnalyzer::default();
        // (5000 + 3000 + 1000 + 500 + 300) / 10000
        assert!((analyzer.concentration(&ranking()) - 98.0).abs() < 1e-9);
    }

    #[test]
    fn detect_uses_only_recent_history() {
        let settings = AnalysisSettings {
            history_window: 3,
            ..AnalysisSettings::default()
        };
        let analyzer = RankingAnalyzer::new(settings).unwrap();
        // old spikes fall outside the window
        let history = [50_000_000, 50_000_000, 1_000, 1_000, 1_000];
        let anomaly = analyzer.detect(1_000, &history).unwrap();
        assert!(!anomaly.is_unusual);
        assert!((anomaly.mean - 1_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn scan_flags_and_orders_by_ratio() {
        let analyzer = RankingAnalyzer::default();
        let flags = analyzer.scan_unusual(&ranking(), &histories()).unwrap();

        let ids: Vec<&str> = flags.iter().map(|f| f.item.identifier.as_str()).collect();
        assert_eq!(ids, vec!["005930", "035420"]);
        assert!(flags[0].anomaly.ratio_percent > flags[1].anomaly.ratio_percent);
        assert_eq!(flags[0].score, 4);
        assert_eq!(flags[1].score, 3);
    }

    #[test]
    fn scan_skips_items_without_history() {
        let analyzer = RankingAnalyzer::default();
        let flags = analyzer.scan_unusual(&ranking(), &HashMap::new()).unwrap();
        assert!(flags.is_empty());
    }

    #[test]
    fn pattern_of_flag() {
        let analyzer = RankingAnalyzer::default();
        let flags = analyzer.scan_unusual(&ranking(), &histories()).unwrap();
        assert_eq!(
            RankingAnalyzer::pattern(&flags[0], 5.0),
            VolumePattern::SurgeWithRise
        );
        assert_eq!(
            RankingAnalyzer::pattern(&flags[1], -1.0),
            VolumePattern::HighWithFall
        );
    }

    #[test]
    fn report_combines_figures() {
        let analyzer = RankingAnalyzer::default();
        let mapping = HashMap::from([
            ("005930".to_string(), "semiconductors".to_string()),
            ("000660".to_string(), "semiconductors".to_string()),
        ]);
        let report = analyzer.report(&ranking(), &mapping);

        assert_eq!(report.item_count, 6);
        assert_eq!(report.total_trading_value, 10_000);
        assert_eq!(report.sectors[0].sector, "semiconductors");
        assert_eq!(report.sectors[0].total_trading_value, 8_000);
        assert_eq!(report.sectors[1].sector, "unclassified");
    }
}
