//! Pattern analysis
//!
//! Runs the five analyses over one window and turns whichever fire into
//! ranked [`Pattern`] records with a confidence and a stepped impact.

use super::stats::{mean, pearson, population_std_dev};
use super::{
    AnalysisConfig, AnalysisSet, AnomalyDetector, ClusterAnalyzer, CorrelationAnalyzer,
    SeasonalityDetector, TrendAnalyzer, TrendDirection,
};
use crate::models::Severity;
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;

/// Confidence assigned to an anomaly pattern whenever any point is flagged
const ANOMALY_CONFIDENCE: f64 = 0.8;

/// Confidence assigned to a cluster pattern
const CLUSTER_CONFIDENCE: f64 = 0.7;

/// Neutral factor used by trend prediction when data is short
const NEUTRAL_FACTOR: f64 = 0.5;

/// Buckets used by the seasonality factor of trend prediction
const HOURLY_BUCKETS: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PatternKind {
    Anomaly,
    Trend,
    Seasonal,
    Cluster,
    Correlation,
}

impl PatternKind {
    pub const ALL: [PatternKind; 5] = [
        PatternKind::Anomaly,
        PatternKind::Trend,
        PatternKind::Seasonal,
        PatternKind::Cluster,
        PatternKind::Correlation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PatternKind::Anomaly => "ANOMALY",
            PatternKind::Trend => "TREND",
            PatternKind::Seasonal => "SEASONAL",
            PatternKind::Cluster => "CLUSTER",
            PatternKind::Correlation => "CORRELATION",
        }
    }

    /// Severity carried by a detected pattern of this kind
    pub fn base_severity(self) -> Severity {
        match self {
            PatternKind::Anomaly => Severity::Critical,
            PatternKind::Trend | PatternKind::Cluster => Severity::High,
            PatternKind::Seasonal | PatternKind::Correlation => Severity::Medium,
        }
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific evidence behind a pattern
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PatternDetail {
    Anomaly {
        indices: Vec<usize>,
        std_dev: f64,
        threshold: f64,
    },
    Seasonal {
        period: usize,
        strength: f64,
    },
    Trend {
        direction: TrendDirection,
        magnitude: f64,
    },
    Cluster {
        sizes: Vec<usize>,
        densities: Vec<f64>,
    },
    Correlation {
        coefficient: f64,
        p_value: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pattern {
    pub kind: PatternKind,
    pub confidence: f64,
    pub impact: f64,
    pub severity: Severity,
    pub detail: PatternDetail,
}

/// Ranked patterns plus aggregates; aggregates are 0 when nothing fired
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternReport {
    pub patterns: Vec<Pattern>,
    pub confidence: f64,
    pub impact: f64,
    pub analyses: AnalysisSet,
}

impl PatternReport {
    pub fn has(&self, kind: PatternKind) -> bool {
        self.patterns.iter().any(|p| p.kind == kind)
    }

    /// Highest severity among detected patterns
    pub fn severity(&self) -> Severity {
        self.patterns
            .iter()
            .map(|p| p.severity)
            .max()
            .unwrap_or(Severity::None)
    }
}

/// Weighted outlook for a series, each factor in [0, 1]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPrediction {
    pub trend: f64,
    pub volatility: f64,
    pub seasonality: f64,
    pub correlation: f64,
    pub score: f64,
}

/// Step impact: 0.8, 0.5 or 0.2 at those crossing points, 0 below 0.2
pub fn impact_for(value: f64) -> f64 {
    if value >= 0.8 {
        0.8
    } else if value >= 0.5 {
        0.5
    } else if value >= 0.2 {
        0.2
    } else {
        0.0
    }
}

/// Runs every analysis and classifies the window
#[derive(Debug, Clone)]
pub struct PatternAnalyzer {
    anomaly: AnomalyDetector,
    trend: TrendAnalyzer,
    seasonality: SeasonalityDetector,
    cluster: ClusterAnalyzer,
    correlation: CorrelationAnalyzer,
    correlation_threshold: f64,
}

impl PatternAnalyzer {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            anomaly: AnomalyDetector::new(config.sigma_threshold),
            trend: TrendAnalyzer::new(config.stable_slope),
            seasonality: SeasonalityDetector::new(config.min_seasonal_samples),
            cluster: ClusterAnalyzer::new(config.cluster_max_distance),
            correlation: CorrelationAnalyzer::new(config.significance_level),
            correlation_threshold: config.correlation_threshold,
        }
    }

    /// All five analyses, without pattern classification
    pub fn run_all(&self, values: &[f64]) -> AnalysisSet {
        AnalysisSet {
            samples: values.len(),
            anomaly: self.anomaly.detect(values),
            trend: self.trend.analyze(values),
            seasonality: self.seasonality.detect(values),
            cluster: self.cluster.analyze(values),
            correlation: self.correlation.against_index(values),
        }
    }

    pub fn analyze(&self, values: &[f64]) -> PatternReport {
        let analyses = self.run_all(values);
        let mut patterns = Vec::new();

        if !analyses.anomaly.anomalies.is_empty() {
            patterns.push(pattern(
                PatternKind::Anomaly,
                ANOMALY_CONFIDENCE,
                impact_for(analyses.anomaly.anomaly_ratio(values.len())),
                PatternDetail::Anomaly {
                    indices: analyses.anomaly.anomalies.iter().map(|a| a.index).collect(),
                    std_dev: analyses.anomaly.std_dev,
                    threshold: analyses.anomaly.threshold,
                },
            ));
        }

        if analyses.seasonality.has_seasonality {
            patterns.push(pattern(
                PatternKind::Seasonal,
                analyses.seasonality.strength.min(1.0),
                impact_for(analyses.seasonality.strength),
                PatternDetail::Seasonal {
                    period: analyses.seasonality.period,
                    strength: analyses.seasonality.strength,
                },
            ));
        }

        if analyses.trend.direction != TrendDirection::Stable {
            patterns.push(pattern(
                PatternKind::Trend,
                analyses.trend.confidence,
                impact_for(analyses.trend.magnitude),
                PatternDetail::Trend {
                    direction: analyses.trend.direction,
                    magnitude: analyses.trend.magnitude,
                },
            ));
        }

        if analyses.cluster.cluster_count > 1 {
            patterns.push(pattern(
                PatternKind::Cluster,
                CLUSTER_CONFIDENCE,
                impact_for(analyses.cluster.cluster_count as f64),
                PatternDetail::Cluster {
                    sizes: analyses.cluster.cluster_sizes.clone(),
                    densities: analyses.cluster.cluster_densities.clone(),
                },
            ));
        }

        let coefficient = analyses.correlation.coefficient;
        if coefficient.abs() > self.correlation_threshold {
            patterns.push(pattern(
                PatternKind::Correlation,
                coefficient.abs(),
                impact_for(coefficient.abs()),
                PatternDetail::Correlation {
                    coefficient,
                    p_value: analyses.correlation.p_value,
                },
            ));
        }

        patterns.sort_by(rank);

        let (confidence, impact) = if patterns.is_empty() {
            (0.0, 0.0)
        } else {
            let n = patterns.len() as f64;
            (
                patterns.iter().map(|p| p.confidence).sum::<f64>() / n,
                patterns.iter().map(|p| p.impact).sum::<f64>() / n,
            )
        };

        PatternReport {
            patterns,
            confidence,
            impact,
            analyses,
        }
    }

    /// Blend of direction, volatility, seasonality and correlation factors
    pub fn trend_prediction(&self, values: &[f64]) -> TrendPrediction {
        let trend = direction_factor(values);
        let volatility = volatility_factor(values);
        let seasonality = hourly_seasonality_factor(values);
        let correlation = correlation_factor(values);

        TrendPrediction {
            trend,
            volatility,
            seasonality,
            correlation,
            score: 0.4 * trend + 0.2 * volatility + 0.2 * seasonality + 0.2 * correlation,
        }
    }
}

impl Default for PatternAnalyzer {
    fn default() -> Self {
        Self::new(&AnalysisConfig::default())
    }
}

fn pattern(kind: PatternKind, confidence: f64, impact: f64, detail: PatternDetail) -> Pattern {
    Pattern {
        kind,
        confidence,
        impact,
        severity: kind.base_severity(),
        detail,
    }
}

/// Impact, then confidence, then severity, all descending
fn rank(a: &Pattern, b: &Pattern) -> Ordering {
    b.impact
        .partial_cmp(&a.impact)
        .unwrap_or(Ordering::Equal)
        .then_with(|| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| b.severity.cmp(&a.severity))
}

fn direction_factor(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return NEUTRAL_FACTOR;
    }
    let average_change =
        values.windows(2).map(|w| w[1] - w[0]).sum::<f64>() / (values.len() - 1) as f64;
    ((average_change + 1.0) / 2.0).clamp(0.0, 1.0)
}

fn volatility_factor(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return NEUTRAL_FACTOR;
    }
    let m = mean(values);
    (population_std_dev(values, m) / 2.0).min(1.0)
}

fn hourly_seasonality_factor(values: &[f64]) -> f64 {
    if values.len() < HOURLY_BUCKETS {
        return NEUTRAL_FACTOR;
    }
    let mut sums = [0.0; HOURLY_BUCKETS];
    let mut counts = [0usize; HOURLY_BUCKETS];
    for (i, v) in values.iter().enumerate() {
        sums[i % HOURLY_BUCKETS] += v;
        counts[i % HOURLY_BUCKETS] += 1;
    }
    let averages = sums.iter().zip(counts).map(|(sum, count)| sum / count as f64);
    let (lo, hi) = averages.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    ((hi - lo) / 2.0).min(1.0)
}

fn correlation_factor(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return NEUTRAL_FACTOR;
    }
    let index: Vec<f64> = (0..values.len()).map(|i| i as f64).collect();
    ((pearson(&index, values) + 1.0) / 2.0).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_impact_steps() {
        assert_eq!(impact_for(0.0), 0.0);
        assert_eq!(impact_for(0.19), 0.0);
        assert_eq!(impact_for(0.2), 0.2);
        assert_eq!(impact_for(0.5), 0.5);
        assert_eq!(impact_for(0.79), 0.5);
        assert_eq!(impact_for(3.0), 0.8);
    }

    #[test]
    fn test_outlier_window_patterns() {
        let report = PatternAnalyzer::default().analyze(&[1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 50.0]);

        let kinds: Vec<PatternKind> = report.patterns.iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![PatternKind::Trend, PatternKind::Cluster, PatternKind::Anomaly]
        );

        let anomaly = &report.patterns[2];
        assert_eq!(anomaly.confidence, 0.8);
        assert_eq!(anomaly.severity, Severity::Critical);
        match &anomaly.detail {
            PatternDetail::Anomaly { indices, .. } => assert_eq!(indices, &vec![6]),
            other => panic!("unexpected detail {:?}", other),
        }

        assert!((report.confidence - 2.5 / 3.0).abs() < 1e-12);
        assert!((report.impact - 1.6 / 3.0).abs() < 1e-12);
        assert_eq!(report.severity(), Severity::Critical);
    }

    #[test]
    fn test_empty_window_has_zero_aggregates() {
        let report = PatternAnalyzer::default().analyze(&[]);
        assert!(report.patterns.is_empty());
        assert_eq!(report.confidence, 0.0);
        assert_eq!(report.impact, 0.0);
        assert_eq!(report.severity(), Severity::None);
    }

    #[test]
    fn test_analysis_is_idempotent() {
        let values: Vec<f64> = (0..40).map(|i| ((i * 7) % 11) as f64).collect();
        let analyzer = PatternAnalyzer::default();
        assert_eq!(analyzer.analyze(&values), analyzer.analyze(&values));
    }

    #[test]
    fn test_trend_prediction_defaults_for_short_data() {
        let prediction = PatternAnalyzer::default().trend_prediction(&[1.0]);
        assert_eq!(prediction.trend, 0.5);
        assert_eq!(prediction.volatility, 0.5);
        assert_eq!(prediction.seasonality, 0.5);
        assert_eq!(prediction.correlation, 0.5);
        assert!((prediction.score - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_trend_prediction_rising_series() {
        let values: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let prediction = PatternAnalyzer::default().trend_prediction(&values);

        assert_eq!(prediction.trend, 1.0);
        assert!((prediction.correlation - 1.0).abs() < 1e-12);
        assert_eq!(prediction.seasonality, 0.5);
        assert!(prediction.score > 0.8);
    }
}
