//! Autocorrelation-based seasonality detection

use super::stats::{is_degenerate_spread, mean, population_std_dev};
use crate::models::Severity;
use serde::Serialize;

/// Windows shorter than this get the neutral result
const MIN_SEASONAL_SAMPLES: usize = 24;

/// Strength reported when there is too little data to judge
pub const NEUTRAL_STRENGTH: f64 = 0.5;

/// Strength above which a window is considered seasonal
const SEASONAL_STRENGTH_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeasonalityResult {
    /// Lag with the highest autocorrelation; 0 when not evaluated
    pub period: usize,
    pub strength: f64,
    pub has_seasonality: bool,
    pub severity: Severity,
}

impl SeasonalityResult {
    fn neutral() -> Self {
        Self {
            period: 0,
            strength: NEUTRAL_STRENGTH,
            has_seasonality: false,
            severity: Severity::None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SeasonalityDetector {
    pub min_samples: usize,
}

impl SeasonalityDetector {
    pub fn new(min_samples: usize) -> Self {
        Self {
            min_samples: min_samples.max(2),
        }
    }

    pub fn detect(&self, values: &[f64]) -> SeasonalityResult {
        if values.len() < self.min_samples {
            return SeasonalityResult::neutral();
        }

        let m = mean(values);
        let flat = values.iter().all(|v| *v == values[0]);
        if flat || is_degenerate_spread(population_std_dev(values, m), m) {
            return SeasonalityResult {
                period: 1,
                strength: 0.0,
                has_seasonality: false,
                severity: Severity::None,
            };
        }

        let variance_sum: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
        let max_lag = values.len() / 2;
        let mut period = 1;
        let mut best = f64::NEG_INFINITY;
        for lag in 1..=max_lag {
            let acf = autocorrelation(values, m, variance_sum, lag);
            if acf > best {
                best = acf;
                period = lag;
            }
        }

        let strength = autocorrelation(values, m, variance_sum, period).abs();
        SeasonalityResult {
            period,
            strength,
            has_seasonality: strength > SEASONAL_STRENGTH_THRESHOLD,
            severity: Severity::from_score(strength),
        }
    }
}

impl Default for SeasonalityDetector {
    fn default() -> Self {
        Self::new(MIN_SEASONAL_SAMPLES)
    }
}

fn autocorrelation(values: &[f64], mean: f64, variance_sum: f64, lag: usize) -> f64 {
    let numerator: f64 = values
        .iter()
        .zip(values.iter().skip(lag))
        .map(|(a, b)| (a - mean) * (b - mean))
        .sum();
    numerator / variance_sum
}
