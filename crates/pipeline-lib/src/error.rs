//! Error types for job processing and dispatch

use crate::models::{AlertSeverity, JobId, Priority};
use thiserror::Error;

/// Failure reported by a payload processor
///
/// `kind` becomes the `error_type` label on failure metrics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ProcessError {
    pub kind: String,
    pub message: String,
}

impl ProcessError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }
}

/// Dispatcher-level errors
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// The job failed on every permitted attempt
    #[error("job {id} ({priority}) exhausted retries after {attempts} attempts: {source}")]
    RetryExhausted {
        id: JobId,
        priority: Priority,
        attempts: u32,
        #[source]
        source: ProcessError,
    },

    /// A worker stopped responding before acknowledging the job
    #[error("job {id} ({priority}) stalled without acknowledgement")]
    Stalled { id: JobId, priority: Priority },

    #[error("job {0} not found")]
    UnknownJob(JobId),

    #[error("job queue is closed")]
    QueueClosed,
}

impl DispatchError {
    /// Label used for the `error_type` dimension of error metrics
    pub fn error_type(&self) -> &'static str {
        match self {
            DispatchError::RetryExhausted { .. } => "RetryExhausted",
            DispatchError::Stalled { .. } => "stalled",
            DispatchError::UnknownJob(_) => "unknown_job",
            DispatchError::QueueClosed => "queue_closed",
        }
    }
}


/// Alert tiers whose limits would let a lower tier fire before a higher one
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{metric} threshold for {lower} ({lower_value}) exceeds {higher} ({higher_value})")]
pub struct ThresholdOrderError {
    pub metric: &'static str,
    pub higher: AlertSeverity,
    pub higher_value: f64,
    pub lower: AlertSeverity,
    pub lower_value: f64,
}
