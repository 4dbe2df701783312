//! Standard-deviation anomaly detection
//!
//! Flags points whose distance from the window mean exceeds a multiple of the
//! population standard deviation.

use super::stats::{is_degenerate_spread, mean, population_std_dev};
use crate::models::Severity;
use serde::Serialize;

/// Default σ multiplier
const DEFAULT_SIGMA_THRESHOLD: f64 = 2.0;

/// A point that exceeded the deviation threshold
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyPoint {
    pub index: usize,
    pub value: f64,
    /// |value − mean|
    pub deviation: f64,
}

/// Result of one anomaly pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyResult {
    pub anomalies: Vec<AnomalyPoint>,
    pub mean: f64,
    pub std_dev: f64,
    /// Absolute deviation above which a point is anomalous
    pub threshold: f64,
    /// Largest |value − mean| expressed in standard deviations
    pub max_deviation: f64,
    pub severity: Severity,
}

impl AnomalyResult {
    fn empty(mean: f64, std_dev: f64) -> Self {
        Self {
            anomalies: Vec::new(),
            mean,
            std_dev,
            threshold: 0.0,
            max_deviation: 0.0,
            severity: Severity::None,
        }
    }

    /// Share of the window flagged as anomalous
    pub fn anomaly_ratio(&self, window_len: usize) -> f64 {
        if window_len == 0 {
            return 0.0;
        }
        self.anomalies.len() as f64 / window_len as f64
    }
}

/// Detects values more than `sigma_threshold` standard deviations from the mean
#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    pub sigma_threshold: f64,
}

impl AnomalyDetector {
    pub fn new(sigma_threshold: f64) -> Self {
        Self { sigma_threshold }
    }

    pub fn detect(&self, values: &[f64]) -> AnomalyResult {
        if values.len() < 2 {
            let m = mean(values);
            return AnomalyResult::empty(m, 0.0);
        }

        let m = mean(values);
        let std_dev = population_std_dev(values, m);
        if is_degenerate_spread(std_dev, m) {
            return AnomalyResult::empty(m, 0.0);
        }

        let threshold = self.sigma_threshold * std_dev;
        let anomalies: Vec<AnomalyPoint> = values
            .iter()
            .enumerate()
            .filter_map(|(index, value)| {
                let deviation = (value - m).abs();
                (deviation > threshold).then_some(AnomalyPoint {
                    index,
                    value: *value,
                    deviation,
                })
            })
            .collect();

        let max_deviation = values
            .iter()
            .map(|v| (v - m).abs() / std_dev)
            .fold(0.0, f64::max);

        let ratio = anomalies.len() as f64 / values.len() as f64;

        AnomalyResult {
            anomalies,
            mean: m,
            std_dev,
            threshold,
            max_deviation,
            severity: Severity::from_score(ratio),
        }
    }
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new(DEFAULT_SIGMA_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_single_outlier() {
        let detector = AnomalyDetector::default();
        let result = detector.detect(&[1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 50.0]);

        assert_eq!(result.anomalies.len(), 1);
        assert_eq!(result.anomalies[0].index, 6);
        assert_eq!(result.mean, 8.0);
        assert!(result.anomalies[0].deviation > result.threshold);
        assert!(result.max_deviation > 2.0);
    }

    #[test]
    fn test_short_window_is_empty() {
        let detector = AnomalyDetector::default();
        for window in [&[][..], &[3.0][..]] {
            let result = detector.detect(window);
            assert!(result.anomalies.is_empty());
            assert_eq!(result.severity, Severity::None);
            assert!(!result.mean.is_nan());
        }
    }

    #[test]
    fn test_constant_window_has_no_anomalies() {
        let result = AnomalyDetector::default().detect(&[0.1; 50]);
        assert!(result.anomalies.is_empty());
        assert_eq!(result.std_dev, 0.0);
        assert_eq!(result.max_deviation, 0.0);
    }
}
