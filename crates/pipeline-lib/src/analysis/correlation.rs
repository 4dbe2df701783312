//! Pearson correlation with a two-tailed significance test

use super::stats::{correlation_p_value, pearson};
use crate::models::Severity;
use serde::Serialize;

const DEFAULT_SIGNIFICANCE_LEVEL: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Significance {
    Significant,
    NotSignificant,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationResult {
    pub coefficient: f64,
    pub p_value: f64,
    pub significance: Significance,
    /// Number of aligned pairs the coefficient was computed over
    pub pairs: usize,
    pub severity: Severity,
}

#[derive(Debug, Clone)]
pub struct CorrelationAnalyzer {
    pub significance_level: f64,
}

impl CorrelationAnalyzer {
    pub fn new(significance_level: f64) -> Self {
        Self { significance_level }
    }

    /// Correlate a window against its own sample index
    pub fn against_index(&self, values: &[f64]) -> CorrelationResult {
        let index: Vec<f64> = (0..values.len()).map(|i| i as f64).collect();
        self.evaluate(&index, values)
    }

    /// Correlate two series aligned on their most recent samples
    pub fn between(&self, a: &[f64], b: &[f64]) -> CorrelationResult {
        let n = a.len().min(b.len());
        self.evaluate(&a[a.len() - n..], &b[b.len() - n..])
    }

    fn evaluate(&self, x: &[f64], y: &[f64]) -> CorrelationResult {
        let pairs = x.len().min(y.len());
        let coefficient = pearson(x, y);
        let p_value = correlation_p_value(coefficient, pairs);

        let significance = if p_value < self.significance_level {
            Significance::Significant
        } else {
            Significance::NotSignificant
        };

        CorrelationResult {
            coefficient,
            p_value,
            significance,
            pairs,
            severity: Severity::from_score(coefficient.abs()),
        }
    }
}

impl Default for CorrelationAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_SIGNIFICANCE_LEVEL)
    }
}
