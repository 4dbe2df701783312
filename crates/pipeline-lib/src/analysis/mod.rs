//! Statistical analysis engine
//!
//! Pure functions over a numeric window:
//! - Anomaly detection (σ threshold)
//! - Trend (least-squares slope)
//! - Seasonality (autocorrelation)
//! - Clustering (value-distance neighbourhoods)
//! - Correlation (Pearson r with a t-test)
//!
//! Each analysis reports a [`Severity`]; [`PatternAnalyzer`] combines them
//! into ranked patterns.

pub mod anomaly;
pub mod cluster;
pub mod correlation;
pub mod pattern;
pub mod seasonality;
pub mod stats;
pub mod trend;

pub use anomaly::{AnomalyDetector, AnomalyPoint, AnomalyResult};
pub use cluster::{Cluster, ClusterAnalyzer, ClusterResult, MAX_CLUSTER_DENSITY};
pub use correlation::{CorrelationAnalyzer, CorrelationResult, Significance};
pub use pattern::{
    impact_for, Pattern, PatternAnalyzer, PatternDetail, PatternKind, PatternReport,
    TrendPrediction,
};
pub use seasonality::{SeasonalityDetector, SeasonalityResult};
pub use trend::{TrendAnalyzer, TrendDirection, TrendResult};

use crate::models::Severity;
use serde::{Deserialize, Serialize};

/// Analysis tuning
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    /// σ multiplier for anomaly detection
    #[serde(default = "default_sigma_threshold")]
    pub sigma_threshold: f64,

    /// |slope| below which a trend is stable
    #[serde(default = "default_stable_slope")]
    pub stable_slope: f64,

    #[serde(default = "default_min_seasonal_samples")]
    pub min_seasonal_samples: usize,

    #[serde(default = "default_cluster_max_distance")]
    pub cluster_max_distance: f64,

    #[serde(default = "default_significance_level")]
    pub significance_level: f64,

    /// |r| above which a correlation pattern is reported
    #[serde(default = "default_correlation_threshold")]
    pub correlation_threshold: f64,
}

fn default_sigma_threshold() -> f64 {
    2.0
}

fn default_stable_slope() -> f64 {
    0.1
}

fn default_min_seasonal_samples() -> usize {
    24
}

fn default_cluster_max_distance() -> f64 {
    2.0
}

fn default_significance_level() -> f64 {
    0.05
}

fn default_correlation_threshold() -> f64 {
    0.7
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sigma_threshold: default_sigma_threshold(),
            stable_slope: default_stable_slope(),
            min_seasonal_samples: default_min_seasonal_samples(),
            cluster_max_distance: default_cluster_max_distance(),
            significance_level: default_significance_level(),
            correlation_threshold: default_correlation_threshold(),
        }
    }
}

/// One analysis outcome, any kind
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "analysis", rename_all = "snake_case")]
pub enum AnalysisResult {
    Anomaly(AnomalyResult),
    Seasonality(SeasonalityResult),
    Trend(TrendResult),
    Cluster(ClusterResult),
    Correlation(CorrelationResult),
}

impl AnalysisResult {
    pub fn severity(&self) -> Severity {
        match self {
            AnalysisResult::Anomaly(r) => r.severity,
            AnalysisResult::Seasonality(r) => r.severity,
            AnalysisResult::Trend(r) => r.severity,
            AnalysisResult::Cluster(r) => r.severity,
            AnalysisResult::Correlation(r) => r.severity,
        }
    }
}

/// All five analyses of one window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisSet {
    pub samples: usize,
    pub anomaly: AnomalyResult,
    pub trend: TrendResult,
    pub seasonality: SeasonalityResult,
    pub cluster: ClusterResult,
    pub correlation: CorrelationResult,
}

impl AnalysisSet {
    pub fn results(&self) -> Vec<AnalysisResult> {
        vec![
            AnalysisResult::Anomaly(self.anomaly.clone()),
            AnalysisResult::Seasonality(self.seasonality.clone()),
            AnalysisResult::Trend(self.trend.clone()),
            AnalysisResult::Cluster(self.cluster.clone()),
            AnalysisResult::Correlation(self.correlation.clone()),
        ]
    }

    /// Worst severity across the five analyses
    pub fn max_severity(&self) -> Severity {
        self.results()
            .iter()
            .map(AnalysisResult::severity)
            .max()
            .unwrap_or(Severity::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degenerate_windows_are_finite() {
        let analyzer = PatternAnalyzer::default();
        for window in [&[][..], &[7.5][..]] {
            let set = analyzer.run_all(window);
            assert!(!set.anomaly.mean.is_nan());
            assert!(!set.anomaly.std_dev.is_nan());
            assert!(!set.trend.slope.is_nan());
            assert!(!set.seasonality.strength.is_nan());
            assert!(!set.correlation.coefficient.is_nan());
            assert!(!set.correlation.p_value.is_nan());
            assert_eq!(set.max_severity(), Severity::None);
        }
    }

    #[test]
    fn test_results_cover_every_analysis() {
        let set = PatternAnalyzer::default().run_all(&[1.0, 2.0, 3.0]);
        let results = set.results();
        assert_eq!(results.len(), 5);
        assert!(matches!(results[0], AnalysisResult::Anomaly(_)));
        assert!(matches!(results[4], AnalysisResult::Correlation(_)));
    }
}
