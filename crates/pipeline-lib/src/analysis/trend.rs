//! Least-squares trend over sample index

use super::stats::mean;
use crate::models::Severity;
use serde::Serialize;
use std::fmt;

/// Slopes below this magnitude count as flat
const DEFAULT_STABLE_SLOPE: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrendDirection::Increasing => f.write_str("increasing"),
            TrendDirection::Decreasing => f.write_str("decreasing"),
            TrendDirection::Stable => f.write_str("stable"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendResult {
    pub slope: f64,
    pub direction: TrendDirection,
    pub magnitude: f64,
    pub confidence: f64,
    pub severity: Severity,
}

#[derive(Debug, Clone)]
pub struct TrendAnalyzer {
    pub stable_slope: f64,
}

impl TrendAnalyzer {
    pub fn new(stable_slope: f64) -> Self {
        Self { stable_slope }
    }

    pub fn analyze(&self, values: &[f64]) -> TrendResult {
        let slope = slope(values);
        let magnitude = slope.abs();

        let direction = if magnitude < self.stable_slope {
            TrendDirection::Stable
        } else if slope > 0.0 {
            TrendDirection::Increasing
        } else {
            TrendDirection::Decreasing
        };

        TrendResult {
            slope,
            direction,
            magnitude,
            confidence: magnitude.min(1.0),
            severity: Severity::from_score(magnitude),
        }
    }
}

impl Default for TrendAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_STABLE_SLOPE)
    }
}

/// OLS slope of value against index; 0 for fewer than two points
pub fn slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = mean(values);

    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        numerator += dx * (y - y_mean);
        denominator += dx * dx;
    }

    if denominator == 0.0 {
        return 0.0;
    }
    let slope = numerator / denominator;
    if slope.is_finite() {
        slope
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rising_series() {
        let values: Vec<f64> = (0..10).map(|i| i as f64 * 2.0).collect();
        let result = TrendAnalyzer::default().analyze(&values);

        assert!((result.slope - 2.0).abs() < 1e-12);
        assert_eq!(result.direction, TrendDirection::Increasing);
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.severity, Severity::Critical);
    }

    #[test]
    fn test_gentle_decline_and_flat() {
        let declining = [1.0, 0.7, 0.4, 0.1];
        let result = TrendAnalyzer::default().analyze(&declining);
        assert_eq!(result.direction, TrendDirection::Decreasing);
        assert!((result.confidence - 0.3).abs() < 1e-9);

        let flat = TrendAnalyzer::default().analyze(&[5.0, 5.01, 5.0, 5.02]);
        assert_eq!(flat.direction, TrendDirection::Stable);
    }

    #[test]
    fn test_degenerate_windows() {
        let analyzer = TrendAnalyzer::default();
        for window in [&[][..], &[4.0][..]] {
            let result = analyzer.analyze(window);
            assert_eq!(result.slope, 0.0);
            assert_eq!(result.direction, TrendDirection::Stable);
            assert_eq!(result.severity, Severity::None);
        }
    }
}
