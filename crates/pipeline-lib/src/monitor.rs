//! Health monitor loop
//!
//! Periodically reads the metric store, runs the pattern analyzer over the
//! configured series and feeds the result to alerting, the circuit breaker
//! and governance. Each evaluation is kept as the latest [`MonitorReport`].

use crate::alerting::{Alert, Alerter, MetricsSnapshot};
use crate::analysis::stats::mean;
use crate::analysis::{AnalysisConfig, PatternAnalyzer, PatternReport, TrendPrediction};
use crate::dispatcher::Dispatcher;
use crate::governance::{
    adjust, assess_extreme_load, BreakerDecision, BreakerInputs, BreakerState, CircuitBreaker,
    GovernanceAdjustment, LoadAssessment, LoadMetrics, QueueHealthInputs, SystemScores,
};
use crate::health::{components, HealthRegistry};
use crate::models::{now_millis, Severity};
use crate::observability::{PipelineMetrics, StructuredLogger};
use crate::store::{keys, ComponentActivity, MetricStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::time::interval;
use tracing::{debug, info};

const DEFAULT_INTERVAL_SECS: u64 = 30;

/// Alert pattern name used when the window shows no pattern
pub const HEALTH_CHECK_PATTERN: &str = "health_check";

/// Monitor configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Store key whose window is pattern-analyzed
    #[serde(default = "default_analysis_key")]
    pub analysis_key: String,

    #[serde(default)]
    pub analysis: AnalysisConfig,
}

fn default_interval_secs() -> u64 {
    DEFAULT_INTERVAL_SECS
}

fn default_analysis_key() -> String {
    keys::JOB_LATENCY_MS.to_string()
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_INTERVAL_SECS,
            analysis_key: default_analysis_key(),
            analysis: AnalysisConfig::default(),
        }
    }
}

/// Outcome of one monitor evaluation
#[derive(Debug, Clone, Serialize)]
pub struct MonitorReport {
    pub timestamp_ms: i64,
    pub snapshot: MetricsSnapshot,
    pub patterns: PatternReport,
    pub prediction: TrendPrediction,
    pub breaker: BreakerDecision,
    pub scores: SystemScores,
    pub governance: GovernanceAdjustment,
    pub load: LoadAssessment,
    pub alert: Option<Alert>,
}

/// Counts over the store window that the health signals derive from
#[derive(Debug, Clone, Copy, Default)]
struct WindowCounts {
    added: usize,
    completed: usize,
    failed: usize,
    retried: usize,
    stalled: usize,
}

impl WindowCounts {
    fn read(store: &MetricStore, now_ms: i64) -> Self {
        Self {
            added: store.count_at(keys::JOBS_ADDED, now_ms),
            completed: store.count_at(keys::JOBS_COMPLETED, now_ms),
            failed: store.count_at(keys::JOBS_FAILED, now_ms),
            retried: store.count_at(keys::JOBS_RETRIED, now_ms),
            stalled: store.count_at(keys::JOBS_STALLED, now_ms),
        }
    }

    fn processed(&self) -> usize {
        self.completed + self.failed
    }

    fn ratio(part: usize, whole: usize) -> Option<f64> {
        (whole > 0).then(|| part as f64 / whole as f64)
    }

    fn error_rate(&self) -> Option<f64> {
        Self::ratio(self.failed, self.processed())
    }

    fn retry_rate(&self) -> Option<f64> {
        Self::ratio(self.retried, self.processed())
    }

    fn timeout_rate(&self) -> Option<f64> {
        Self::ratio(self.stalled, self.processed() + self.stalled)
    }

    fn processing_rate(&self) -> Option<f64> {
        Self::ratio(self.completed, self.processed())
    }
}

/// Drives analysis, alerting and governance from the metric store
pub struct Monitor {
    config: MonitorConfig,
    store: Arc<MetricStore>,
    dispatcher: Arc<Dispatcher>,
    analyzer: PatternAnalyzer,
    alerter: Arc<Alerter>,
    breaker: CircuitBreaker,
    health: HealthRegistry,
    last: RwLock<Option<MonitorReport>>,
    metrics: PipelineMetrics,
    logger: StructuredLogger,
}

impl Monitor {
    pub fn new(
        config: MonitorConfig,
        dispatcher: Arc<Dispatcher>,
        alerter: Arc<Alerter>,
        health: HealthRegistry,
    ) -> Self {
        Self {
            analyzer: PatternAnalyzer::new(&config.analysis),
            store: dispatcher.store().clone(),
            config,
            dispatcher,
            alerter,
            breaker: CircuitBreaker::new(),
            health,
            last: RwLock::new(None),
            metrics: PipelineMetrics::new(),
            logger: StructuredLogger::new("monitor"),
        }
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }

    /// Latest evaluation, if any has run
    pub async fn last_report(&self) -> Option<MonitorReport> {
        self.last.read().await.clone()
    }

    /// Run evaluations every `interval_secs` until shutdown
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval_secs,
            key = %self.config.analysis_key,
            "Starting health monitor"
        );

        let mut ticker = interval(Duration::from_secs(self.config.interval_secs.max(1)));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.evaluate().await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down health monitor");
                    break;
                }
            }
        }
    }

    pub async fn evaluate(&self) -> MonitorReport {
        self.evaluate_at(now_millis()).await
    }

    pub async fn evaluate_at(&self, now_ms: i64) -> MonitorReport {
        let counts = WindowCounts::read(&self.store, now_ms);
        let latencies = self.store.window_at(keys::JOB_LATENCY_MS, now_ms);
        let avg_latency = (!latencies.is_empty()).then(|| mean(&latencies));
        let resource_usage = self.store.latest_at(keys::RESOURCE_USAGE, now_ms);

        let values = self.store.window_at(&self.config.analysis_key, now_ms);
        let patterns = self.analyzer.analyze(&values);
        let prediction = self.analyzer.trend_prediction(&values);

        for pattern in &patterns.patterns {
            let name = pattern.kind.as_str();
            self.store.record_pattern_occurrence_at(name, now_ms);
            self.store.record_component_state_at(
                components::DISPATCHER,
                ComponentActivity::Active,
                Some(name),
                now_ms,
            );
        }

        let snapshot = MetricsSnapshot {
            error_rate: counts.error_rate(),
            latency_ms: avg_latency,
            resource_usage,
            anomaly_deviation: (values.len() >= 2)
                .then_some(patterns.analyses.anomaly.max_deviation),
        };

        let alert_pattern = patterns
            .patterns
            .first()
            .map(|p| p.kind.as_str())
            .unwrap_or(HEALTH_CHECK_PATTERN);
        let alert = self
            .alerter
            .check_and_alert_at(alert_pattern, snapshot, now_ms);
        self.alerter.cleanup_dedup_cache(now_ms);

        let breaker = self.breaker.observe_at(
            &BreakerInputs {
                error_rate: counts.error_rate().unwrap_or(0.0),
                latency_ms: avg_latency.unwrap_or(0.0),
                timeout_rate: counts.timeout_rate().unwrap_or(0.0),
            },
            now_ms,
        );

        let status = self.dispatcher.status();
        let queue_depth = status.waiting + status.delayed;
        let scores = SystemScores::from_queue(&QueueHealthInputs {
            error_rate: counts.error_rate().unwrap_or(0.0),
            avg_processing_ms: avg_latency.unwrap_or(0.0),
            retry_rate: counts.retry_rate().unwrap_or(0.0),
            queue_size: queue_depth,
            processing_rate: counts.processing_rate().unwrap_or(1.0),
        });
        let governance = adjust(&scores.state(queue_depth));

        let window_secs = self.store.window_duration().as_secs_f64().max(1.0);
        let load = assess_extreme_load(&LoadMetrics {
            requests_per_second: counts.added as f64 / window_secs,
            queue_size: queue_depth,
            memory_usage: resource_usage.unwrap_or(0.0),
            cpu_usage: resource_usage.unwrap_or(0.0),
        });

        self.record_governance(&patterns, &governance, &load);
        self.update_health(&breaker, &snapshot).await;

        let report = MonitorReport {
            timestamp_ms: now_ms,
            snapshot,
            patterns,
            prediction,
            breaker,
            scores,
            governance,
            load,
            alert,
        };

        debug!(
            patterns = report.patterns.patterns.len(),
            breaker = %report.breaker.state,
            alerted = report.alert.is_some(),
            "Monitor evaluation complete"
        );

        *self.last.write().await = Some(report.clone());
        report
    }

    fn record_governance(
        &self,
        patterns: &PatternReport,
        governance: &GovernanceAdjustment,
        load: &LoadAssessment,
    ) {
        let actions: Vec<String> = governance
            .actions
            .iter()
            .chain(load.actions.iter())
            .map(|a| a.as_str().to_string())
            .collect();

        let severity = match patterns.severity() {
            Severity::None => "NONE".to_string(),
            other => other.to_string(),
        };
        for action in &actions {
            self.metrics.inc_adaptation(action, &severity);
        }
        self.logger.log_governance_actions("monitor", &actions);
    }

    async fn update_health(&self, breaker: &BreakerDecision, snapshot: &MetricsSnapshot) {
        if breaker.isolated {
            self.health
                .set_unhealthy(components::DISPATCHER, "Circuit breaker open")
                .await;
        } else {
            match self.alerter.classify(snapshot) {
                Severity::Critical | Severity::High => {
                    let error_rate = snapshot.error_rate.unwrap_or(0.0);
                    self.health
                        .set_degraded(
                            components::DISPATCHER,
                            format!("Error rate {:.2}", error_rate),
                        )
                        .await;
                }
                _ => self.health.set_healthy(components::DISPATCHER).await,
            }
        }

        self.health.set_healthy(components::METRIC_STORE).await;
        self.health.set_healthy(components::MONITOR).await;
    }
}
