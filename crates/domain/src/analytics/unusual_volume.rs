//! Z-score based unusual-volume detection
//!
//! A volume is unusual when it lies more than `z_threshold` population
//! standard deviations from the historical mean, OR when it exceeds
//! `ratio_threshold` percent of that mean. The two rules are independent:
//! the first catches small moves against a very stable baseline, the second
//! catches plain multiples of the average.

use serde::{Deserialize, Serialize};

use crate::DomainError;

use super::{ensure_measurement, guarded_percentage};

/// Default z-score threshold
pub const DEFAULT_Z_THRESHOLD: f64 = 2.0;

/// Default volume ratio threshold, in percent of the historical mean
pub const DEFAULT_RATIO_THRESHOLD: f64 = 200.0;

/// Added to the standard deviation so zero-variance history does not divide by zero
pub const STD_EPSILON: f64 = 1e-8;

/// Result of one detection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeAnomaly {
    /// Whether either threshold was crossed
    pub is_unusual: bool,
    /// Current volume as a percentage of the historical mean
    pub ratio_percent: f64,
    /// Distance from the mean in standard deviations
    pub z_score: f64,
    /// Historical mean
    pub mean: f64,
    /// Historical population standard deviation
    pub std_dev: f64,
}

impl VolumeAnomaly {
    const fn not_unusual() -> Self {
        Self {
            is_unusual: false,
            ratio_percent: 0.0,
            z_score: 0.0,
            mean: 0.0,
            std_dev: 0.0,
        }
    }
}

/// Detector holding both thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnusualVolumeDetector {
    z_threshold: f64,
    ratio_threshold: f64,
}

impl Default for UnusualVolumeDetector {
    fn default() -> Self {
        Self {
            z_threshold: DEFAULT_Z_THRESHOLD,
            ratio_threshold: DEFAULT_RATIO_THRESHOLD,
        }
    }
}

impl UnusualVolumeDetector {
    /// Create a detector; both thresholds must be positive and finite
    pub fn new(z_threshold: f64, ratio_threshold: f64) -> Result<Self, DomainError> {
        for (name, value) in [
            ("z threshold", z_threshold),
            ("ratio threshold", ratio_threshold),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(DomainError::invalid_parameters(format!(
                    "{name} must be positive and finite, got {value}"
                )));
            }
        }
        Ok(Self {
            z_threshold,
            ratio_threshold,
        })
    }

    /// Z-score threshold
    #[must_use]
    pub const fn z_threshold(&self) -> f64 {
        self.z_threshold
    }

    /// Ratio threshold in percent
    #[must_use]
    pub const fn ratio_threshold(&self) -> f64 {
        self.ratio_threshold
    }

    /// Compare `current` against `history`
    ///
    /// Empty history or a zero mean yields a not-unusual result with a zero
    /// ratio.
    pub fn detect(&self, current: f64, history: &[f64]) -> Result<VolumeAnomaly, DomainError> {
        let current = ensure_measurement("current volume", current)?;
        for value in history {
            ensure_measurement("historical volume", *value)?;
        }

        let mean = mean(history);
        if history.is_empty() || mean == 0.0 {
            return Ok(VolumeAnomaly::not_unusual());
        }

        let std_dev = population_std_dev(history, mean);
        let ratio_percent = guarded_percentage(current, mean);
        let z_score = (current - mean) / (std_dev + STD_EPSILON);
        let is_unusual = z_score.abs() > self.z_threshold || ratio_percent > self.ratio_threshold;

        Ok(VolumeAnomaly {
            is_unusual,
            ratio_percent,
            z_score,
            mean,
            std_dev,
        })
    }
}

/// Detect with the default ratio threshold, returning `(is_unusual, ratio_percent)`
pub fn detect_unusual_volume(
    current: f64,
    history: &[f64],
    z_threshold: f64,
) -> Result<(bool, f64), DomainError> {
    let detector = UnusualVolumeDetector::new(z_threshold, DEFAULT_RATIO_THRESHOLD)?;
    let anomaly = detector.detect(current, history)?;
    Ok((anomaly.is_unusual, anomaly.ratio_percent))
}

/// Arithmetic mean, `0.0` for an empty slice
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation around a precomputed mean
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn population_std_dev(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (sum_sq / values.len() as f64).sqrt()
}

/// Volatility of a volume series as the sample standard deviation
///
/// `0.0` for fewer than two points.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn volume_volatility(volumes: &[f64]) -> f64 {
    if volumes.len() < 2 {
        return 0.0;
    }
    let avg = mean(volumes);
    let sum_sq: f64 = volumes.iter().map(|v| (v - avg).powi(2)).sum();
    (sum_sq / (volumes.len() - 1) as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HISTORY: [f64; 5] = [900_000.0, 950_000.0, 1_100_000.0, 1_050_000.0, 980_000.0];

    #[test]
    fn typical_volume_is_not_unusual() {
        let (unusual, ratio) = detect_unusual_volume(1_000_000.0, &HISTORY, 2.0).unwrap();
        assert!(!unusual);
        assert!((ratio - 100.401_606).abs() < 1e-3);
    }

    #[test]
    fn five_x_volume_is_unusual() {
        let (unusual, ratio) = detect_unusual_volume(5_000_000.0, &HISTORY, 2.0).unwrap();
        assert!(unusual);
        assert!(ratio > 400.0);
    }

    #[test]
    fn empty_history_is_not_unusual() {
        let (unusual, ratio) = detect_unusual_volume(1_000.0, &[], 2.0).unwrap();
        assert!(!unusual);
        assert!(ratio.abs() < f64::EPSILON);
    }

    #[test]
    fn zero_mean_is_not_unusual() {
        let (unusual, ratio) = detect_unusual_volume(1_000.0, &[0.0, 0.0], 2.0).unwrap();
        assert!(!unusual);
        assert!(ratio.abs() < f64::EPSILON);
    }

    #[test]
    fn zero_variance_history_flags_small_move_by_z_score() {
        // ratio is only 101%, but the baseline never moved
        let anomaly = UnusualVolumeDetector::default()
            .detect(101.0, &[100.0, 100.0, 100.0])
            .unwrap();
        assert!(anomaly.is_unusual);
        assert!(anomaly.ratio_percent < DEFAULT_RATIO_THRESHOLD);
        assert!(anomaly.std_dev.abs() < f64::EPSILON);
    }

    #[test]
    fn identical_to_flat_history_is_not_unusual() {
        let anomaly = UnusualVolumeDetector::default()
            .detect(100.0, &[100.0, 100.0, 100.0])
            .unwrap();
        assert!(!anomaly.is_unusual);
        assert!(anomaly.z_score.abs() < f64::EPSILON);
    }

    #[test]
    fn ratio_rule_alone_can_flag() {
        // Very noisy history keeps z low, but current is 2.5x the mean
        let detector = UnusualVolumeDetector::new(100.0, 200.0).unwrap();
        let anomaly = detector.detect(250.0, &[0.0, 200.0, 0.0, 200.0]).unwrap();
        assert!(anomaly.z_score.abs() < 100.0);
        assert!(anomaly.ratio_percent > 200.0);
        assert!(anomaly.is_unusual);
    }

    #[test]
    fn ratio_threshold_is_independent_of_z_threshold() {
        let strict_ratio = UnusualVolumeDetector::new(50.0, 120.0).unwrap();
        let loose_ratio = UnusualVolumeDetector::new(50.0, 500.0).unwrap();
        let history = [100.0, 300.0, 100.0, 300.0];
        assert!(strict_ratio.detect(300.0, &history).unwrap().is_unusual);
        assert!(!loose_ratio.detect(300.0, &history).unwrap().is_unusual);
    }

    #[test]
    fn drop_in_volume_flags_by_absolute_z() {
        let anomaly = UnusualVolumeDetector::default()
            .detect(0.0, &[1_000.0, 1_010.0, 990.0, 1_000.0])
            .unwrap();
        assert!(anomaly.z_score < -2.0);
        assert!(anomaly.is_unusual);
    }

    #[test]
    fn negative_input_is_rejected() {
        assert!(matches!(
            detect_unusual_volume(-1.0, &HISTORY, 2.0),
            Err(DomainError::InvalidParameters(_))
        ));
        assert!(matches!(
            detect_unusual_volume(1.0, &[1.0, -5.0], 2.0),
            Err(DomainError::InvalidParameters(_))
        ));
    }

    #[test]
    fn non_finite_input_is_rejected() {
        assert!(detect_unusual_volume(f64::NAN, &HISTORY, 2.0).is_err());
        assert!(detect_unusual_volume(1.0, &[f64::INFINITY], 2.0).is_err());
    }

    #[test]
    fn invalid_thresholds_are_rejected() {
        assert!(UnusualVolumeDetector::new(0.0, 200.0).is_err());
        assert!(UnusualVolumeDetector::new(2.0, -1.0).is_err());
        assert!(UnusualVolumeDetector::new(f64::NAN, 200.0).is_err());
    }

    #[test]
    fn mean_and_std_dev() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let m = mean(&values);
        assert!((m - 5.0).abs() < f64::EPSILON);
        assert!((population_std_dev(&values, m) - 2.0).abs() < f64::EPSILON);
        assert!(mean(&[]).abs() < f64::EPSILON);
        assert!(population_std_dev(&[], 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn volatility_is_sample_std_dev() {
        let volumes = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((volume_volatility(&volumes) - (32.0_f64 / 7.0).sqrt()).abs() < 1e-12);
        assert!(volume_volatility(&volumes) > population_std_dev(&volumes, mean(&volumes)));
    }

    #[test]
    fn volatility_needs_two_points() {
        assert!(volume_volatility(&[]).abs() < f64::EPSILON);
        assert!(volume_volatility(&[1_000_000.0]).abs() < f64::EPSILON);
        assert!(volume_volatility(&[500.0, 500.0, 500.0]).abs() < f64::EPSILON);
    }
}
