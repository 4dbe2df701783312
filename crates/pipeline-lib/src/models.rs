//! Core data models for the job pipeline

use serde::{Deserialize, Serialize};
use std::fmt;

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Priority tier of a job. Tiers are served in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Urgent,
    High,
    Medium,
    Low,
}

impl Priority {
    /// All tiers, highest first
    pub const ALL: [Priority; 4] = [
        Priority::Urgent,
        Priority::High,
        Priority::Medium,
        Priority::Low,
    ];

    /// Position in service order (0 is served first)
    pub fn tier(self) -> usize {
        match self {
            Priority::Urgent => 0,
            Priority::High => 1,
            Priority::Medium => 2,
            Priority::Low => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Urgent => "URGENT",
            Priority::High => "HIGH",
            Priority::Medium => "MEDIUM",
            Priority::Low => "LOW",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dispatcher-assigned job identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Completed,
    Failed,
    Stalled,
}

/// A unit of work owned by the dispatcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Job type, used as the `type` label on processing metrics
    pub job_type: String,
    /// Opaque payload handed to the processor
    pub payload: serde_json::Value,
    pub priority: Priority,
    /// Failed attempts so far; also the 0-based index of the next retry
    pub attempts: u32,
    /// Times the job stalled without an acknowledgement
    pub stalls: u32,
    pub enqueued_at_ms: i64,
    pub state: JobState,
}

impl Job {
    pub fn new(
        id: JobId,
        job_type: impl Into<String>,
        payload: serde_json::Value,
        priority: Priority,
        enqueued_at_ms: i64,
    ) -> Self {
        Self {
            id,
            job_type: job_type.into(),
            payload,
            priority,
            attempts: 0,
            stalls: 0,
            enqueued_at_ms,
            state: JobState::Pending,
        }
    }
}

/// A single timestamped metric observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub key: String,
    pub timestamp_ms: i64,
    pub value: f64,
}

/// Severity tier produced by threshold comparison
///
/// `None` means nothing materialises; alerts carry [`AlertSeverity`] instead,
/// which has no such variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Map a score in [0, 1] onto a tier (CRITICAL ≥ 1.0, HIGH ≥ 0.8,
    /// MEDIUM ≥ 0.5, LOW ≥ 0.2). Non-finite scores map to `None`.
    pub fn from_score(score: f64) -> Self {
        if !score.is_finite() {
            return Severity::None;
        }
        if score >= 1.0 {
            Severity::Critical
        } else if score >= 0.8 {
            Severity::High
        } else if score >= 0.5 {
            Severity::Medium
        } else if score >= 0.2 {
            Severity::Low
        } else {
            Severity::None
        }
    }

    /// The alertable tier, if any
    pub fn alert_severity(self) -> Option<AlertSeverity> {
        match self {
            Severity::None => None,
            Severity::Low => Some(AlertSeverity::Low),
            Severity::Medium => Some(AlertSeverity::Medium),
            Severity::High => Some(AlertSeverity::High),
            Severity::Critical => Some(AlertSeverity::Critical),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::None => f.write_str("NONE"),
            Severity::Low => f.write_str("LOW"),
            Severity::Medium => f.write_str("MEDIUM"),
            Severity::High => f.write_str("HIGH"),
            Severity::Critical => f.write_str("CRITICAL"),
        }
    }
}

/// Severity of an emitted alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    /// Evaluation order for classification
    pub const DESCENDING: [AlertSeverity; 4] = [
        AlertSeverity::Critical,
        AlertSeverity::High,
        AlertSeverity::Medium,
        AlertSeverity::Low,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AlertSeverity::Low => "LOW",
            AlertSeverity::Medium => "MEDIUM",
            AlertSeverity::High => "HIGH",
            AlertSeverity::Critical => "CRITICAL",
        }
    }
}

impl From<AlertSeverity> for Severity {
    fn from(severity: AlertSeverity) -> Self {
        match severity {
            AlertSeverity::Low => Severity::Low,
            AlertSeverity::Medium => Severity::Medium,
            AlertSeverity::High => Severity::High,
            AlertSeverity::Critical => Severity::Critical,
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
