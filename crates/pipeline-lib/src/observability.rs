//! Observability infrastructure for the job pipeline
//!
//! Provides:
//! - Prometheus metrics (job lifecycle, error distribution, component health,
//!   governance adaptations, queue family)
//! - Read-back snapshots of those metrics for status endpoints
//! - Structured JSON logging with tracing

use prometheus::core::Collector;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge,
    register_int_gauge_vec, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::{error, info, warn};

use crate::health::ComponentStatus;
use crate::models::{AlertSeverity, JobId, Priority};

/// Histogram buckets for job processing time (in seconds)
const PROCESSING_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<PipelineMetricsInner> = OnceLock::new();

struct PipelineMetricsInner {
    job_processing_total: IntCounterVec,
    error_distribution_total: IntCounterVec,
    component_health: IntGaugeVec,
    governance_adaptation_total: IntCounterVec,
    circuit_breaker_open: IntGauge,
    jobs_added: IntCounterVec,
    jobs_completed: IntCounterVec,
    jobs_failed: IntCounterVec,
    job_retries: IntCounterVec,
    job_processing_seconds: HistogramVec,
    queue_size: IntGaugeVec,
    queue_errors: IntCounterVec,
}

impl PipelineMetricsInner {
    fn new() -> Self {
        Self {
            job_processing_total: register_int_counter_vec!(
                "job_processing_total",
                "Jobs processed by type, priority and outcome",
                &["type", "priority", "status"]
            )
            .expect("Failed to register job_processing_total"),

            error_distribution_total: register_int_counter_vec!(
                "error_distribution_total",
                "Errors by type, priority and component",
                &["error_type", "priority", "component"]
            )
            .expect("Failed to register error_distribution_total"),

            component_health: register_int_gauge_vec!(
                "component_health",
                "Component health; 1 for the current status of each component",
                &["component", "status"]
            )
            .expect("Failed to register component_health"),

            governance_adaptation_total: register_int_counter_vec!(
                "governance_adaptation_total",
                "Governance adaptations by type and severity",
                &["type", "severity"]
            )
            .expect("Failed to register governance_adaptation_total"),

            circuit_breaker_open: register_int_gauge!(
                "governance_circuit_breaker_open",
                "1 while the pipeline circuit breaker is open"
            )
            .expect("Failed to register governance_circuit_breaker_open"),

            jobs_added: register_int_counter_vec!(
                "email_jobs_added",
                "Jobs added to the queue",
                &["priority"]
            )
            .expect("Failed to register email_jobs_added"),

            jobs_completed: register_int_counter_vec!(
                "email_jobs_completed",
                "Jobs completed successfully",
                &["priority"]
            )
            .expect("Failed to register email_jobs_completed"),

            jobs_failed: register_int_counter_vec!(
                "email_jobs_failed",
                "Job failures",
                &["priority", "error_type"]
            )
            .expect("Failed to register email_jobs_failed"),

            job_retries: register_int_counter_vec!(
                "email_job_retries",
                "Job retries scheduled",
                &["priority"]
            )
            .expect("Failed to register email_job_retries"),

            job_processing_seconds: register_histogram_vec!(
                "email_job_processing_seconds",
                "Time from enqueue to completion",
                &["priority"],
                PROCESSING_BUCKETS.to_vec()
            )
            .expect("Failed to register email_job_processing_seconds"),

            queue_size: register_int_gauge_vec!(
                "email_queue_size",
                "Jobs waiting per priority",
                &["priority"]
            )
            .expect("Failed to register email_queue_size"),

            queue_errors: register_int_counter_vec!(
                "email_queue_errors",
                "Queue-level errors",
                &["error_type"]
            )
            .expect("Failed to register email_queue_errors"),
        }
    }
}

/// One row of the error distribution snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDistributionEntry {
    pub error_type: String,
    pub priority: String,
    pub component: String,
    pub count: u64,
}

/// One row of the job processing snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobProcessingEntry {
    pub job_type: String,
    pub priority: String,
    pub status: String,
    pub count: u64,
}

/// Pipeline metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct PipelineMetrics {
    _private: (),
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(PipelineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &PipelineMetricsInner {
        GLOBAL_METRICS.get_or_init(PipelineMetricsInner::new)
    }

    pub fn inc_job_added(&self, priority: Priority) {
        self.inner()
            .jobs_added
            .with_label_values(&[priority.as_str()])
            .inc();
    }

    pub fn inc_job_completed(&self, job_type: &str, priority: Priority, latency_secs: f64) {
        let inner = self.inner();
        inner
            .job_processing_total
            .with_label_values(&[job_type, priority.as_str(), "completed"])
            .inc();
        inner
            .jobs_completed
            .with_label_values(&[priority.as_str()])
            .inc();
        inner
            .job_processing_seconds
            .with_label_values(&[priority.as_str()])
            .observe(latency_secs.max(0.0));
    }

    /// A processing attempt failed
    pub fn inc_job_failed(&self, job_type: &str, priority: Priority, error_type: &str) {
        let inner = self.inner();
        inner
            .job_processing_total
            .with_label_values(&[job_type, priority.as_str(), "failed"])
            .inc();
        inner
            .jobs_failed
            .with_label_values(&[priority.as_str(), error_type])
            .inc();
        inner
            .error_distribution_total
            .with_label_values(&[error_type, priority.as_str(), "dispatcher"])
            .inc();
    }

    pub fn inc_job_retry(&self, priority: Priority) {
        self.inner()
            .job_retries
            .with_label_values(&[priority.as_str()])
            .inc();
    }

    pub fn inc_retry_exhausted(&self, job_type: &str, priority: Priority) {
        let inner = self.inner();
        inner
            .job_processing_total
            .with_label_values(&[job_type, priority.as_str(), "retry_exhausted"])
            .inc();
        inner
            .jobs_failed
            .with_label_values(&[priority.as_str(), "RetryExhausted"])
            .inc();
    }

    /// A queue-level error such as a stall
    pub fn inc_queue_error(&self, error_type: &str, priority: Priority) {
        let inner = self.inner();
        inner.queue_errors.with_label_values(&[error_type]).inc();
        inner
            .error_distribution_total
            .with_label_values(&[error_type, priority.as_str(), "queue"])
            .inc();
    }

    pub fn inc_error(&self, error_type: &str, priority: &str, component: &str) {
        self.inner()
            .error_distribution_total
            .with_label_values(&[error_type, priority, component])
            .inc();
    }

    pub fn set_queue_size(&self, priority: Priority, size: i64) {
        self.inner()
            .queue_size
            .with_label_values(&[priority.as_str()])
            .set(size);
    }

    /// Set the component's current status to 1 and the others to 0
    pub fn set_component_health(&self, component: &str, status: ComponentStatus) {
        for candidate in ComponentStatus::ALL {
            let value = if candidate == status { 1 } else { 0 };
            self.inner()
                .component_health
                .with_label_values(&[component, candidate.as_str()])
                .set(value);
        }
    }

    pub fn inc_adaptation(&self, adaptation_type: &str, severity: &str) {
        self.inner()
            .governance_adaptation_total
            .with_label_values(&[adaptation_type, severity])
            .inc();
    }

    pub fn set_circuit_open(&self, open: bool) {
        self.inner().circuit_breaker_open.set(i64::from(open));
    }

    /// Current error counts, sorted by label set
    pub fn error_distribution(&self) -> Vec<ErrorDistributionEntry> {
        counter_rows(&self.inner().error_distribution_total)
            .into_iter()
            .map(|(labels, count)| ErrorDistributionEntry {
                error_type: labels.get("error_type").cloned().unwrap_or_default(),
                priority: labels.get("priority").cloned().unwrap_or_default(),
                component: labels.get("component").cloned().unwrap_or_default(),
                count,
            })
            .collect()
    }

    /// Current job processing counts, sorted by label set
    pub fn job_processing_stats(&self) -> Vec<JobProcessingEntry> {
        counter_rows(&self.inner().job_processing_total)
            .into_iter()
            .map(|(labels, count)| JobProcessingEntry {
                job_type: labels.get("type").cloned().unwrap_or_default(),
                priority: labels.get("priority").cloned().unwrap_or_default(),
                status: labels.get("status").cloned().unwrap_or_default(),
                count,
            })
            .collect()
    }
}

/// Label maps and values of every child of a counter vector
fn counter_rows(vec: &IntCounterVec) -> Vec<(BTreeMap<String, String>, u64)> {
    let mut rows: Vec<(BTreeMap<String, String>, u64)> = vec
        .collect()
        .iter()
        .flat_map(|family| family.get_metric().iter())
        .map(|metric| {
            let labels = metric
                .get_label()
                .iter()
                .map(|pair| (pair.get_name().to_string(), pair.get_value().to_string()))
                .collect();
            (labels, metric.get_counter().get_value() as u64)
        })
        .collect();
    rows.sort();
    rows
}

/// Structured logger for pipeline events
#[derive(Clone)]
pub struct StructuredLogger {
    service: String,
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn log_retry_scheduled(
        &self,
        job_id: JobId,
        priority: Priority,
        attempt: u32,
        delay_ms: u64,
        error: &str,
    ) {
        info!(
            event = "job_retry_scheduled",
            service = %self.service,
            job_id = %job_id,
            priority = %priority,
            attempt = attempt,
            delay_ms = delay_ms,
            error = %error,
            "Job failed, retry scheduled"
        );
    }

    pub fn log_retry_exhausted(&self, job_id: JobId, priority: Priority, attempts: u32, error: &str) {
        error!(
            event = "job_retry_exhausted",
            service = %self.service,
            job_id = %job_id,
            priority = %priority,
            attempts = attempts,
            error = %error,
            "Job permanently failed after exhausting retries"
        );
    }

    pub fn log_job_stalled(&self, job_id: JobId, priority: Priority, stalls: u32) {
        warn!(
            event = "job_stalled",
            service = %self.service,
            job_id = %job_id,
            priority = %priority,
            stalls = stalls,
            "Job stalled without acknowledgement"
        );
    }

    pub fn log_alert(&self, alert_id: &str, severity: AlertSeverity, pattern: &str, channels: &str) {
        match severity {
            AlertSeverity::Critical | AlertSeverity::High => {
                warn!(
                    event = "alert_emitted",
                    service = %self.service,
                    alert_id = %alert_id,
                    severity = %severity,
                    pattern = %pattern,
                    channels = %channels,
                    "Alert emitted"
                );
            }
            _ => {
                info!(
                    event = "alert_emitted",
                    service = %self.service,
                    alert_id = %alert_id,
                    severity = %severity,
                    pattern = %pattern,
                    channels = %channels,
                    "Alert emitted"
                );
            }
        }
    }

    pub fn log_breaker_transition(&self, from: &str, to: &str, error_rate: f64, recovery_secs: u64) {
        warn!(
            event = "circuit_breaker_transition",
            service = %self.service,
            from = %from,
            to = %to,
            error_rate = error_rate,
            recovery_secs = recovery_secs,
            "Circuit breaker changed state"
        );
    }

    pub fn log_governance_actions(&self, source: &str, actions: &[String]) {
        if actions.is_empty() {
            return;
        }
        info!(
            event = "governance_actions",
            service = %self.service,
            source = %source,
            actions = ?actions,
            "Governance actions required"
        );
    }

    pub fn log_startup(&self, version: &str, workers: usize) {
        info!(
            event = "pipeline_started",
            service = %self.service,
            version = %version,
            workers = workers,
            "Job pipeline started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "pipeline_shutdown",
            service = %self.service,
            reason = %reason,
            "Job pipeline shutting down"
        );
    }
}
