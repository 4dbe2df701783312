//! Priority dispatcher
//!
//! Admits jobs into a four-tier queue, hands them to a payload processor and
//! turns every outcome into metrics, store samples and, on failure, a retry
//! decision. Nothing a processor does escapes this boundary: errors, panics
//! and stalls all become a [`JobOutcome`].

pub mod broker;
mod stats;
mod worker;

#[cfg(test)]
mod tests;

pub use broker::{BrokerCounts, JobBroker, MemoryBroker};
pub use stats::{ProcessingStats, QueueMetrics, QueueStatus};

use crate::error::{DispatchError, ProcessError};
use crate::models::{now_millis, Job, JobId, JobState, Priority};
use crate::observability::{PipelineMetrics, StructuredLogger};
use crate::retry::RetryStrategy;
use crate::store::{keys, MetricStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stats::StatsBook;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, error};

const DEFAULT_WORKERS: usize = 4;
const DEFAULT_STALL_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_STALLS: u32 = 5;
const DEFAULT_FAILED_RETENTION: usize = 1000;

/// Dispatcher configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DispatcherConfig {
    /// Concurrent worker slots
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// A processor that has not answered within this many seconds is stalled
    #[serde(default = "default_stall_timeout_secs")]
    pub stall_timeout_secs: u64,

    /// Stalls tolerated before a job is failed outright
    #[serde(default = "default_max_stalls")]
    pub max_stalls: u32,

    /// Permanently failed jobs kept for inspection and manual retry
    #[serde(default = "default_failed_retention")]
    pub failed_retention: usize,
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_stall_timeout_secs() -> u64 {
    DEFAULT_STALL_TIMEOUT_SECS
}

fn default_max_stalls() -> u32 {
    DEFAULT_MAX_STALLS
}

fn default_failed_retention() -> usize {
    DEFAULT_FAILED_RETENTION
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            stall_timeout_secs: DEFAULT_STALL_TIMEOUT_SECS,
            max_stalls: DEFAULT_MAX_STALLS,
            failed_retention: DEFAULT_FAILED_RETENTION,
        }
    }
}

/// Acknowledgement returned by a processor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    /// Transport-level reference for the delivered payload, if any
    pub reference: Option<String>,
}

/// Delivers a job's payload
#[async_trait]
pub trait PayloadProcessor: Send + Sync + 'static {
    async fn process(&self, job: &Job) -> Result<Ack, ProcessError>;
}

/// Returned from [`Dispatcher::enqueue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobHandle {
    pub id: JobId,
    pub priority: Priority,
    pub enqueued_at_ms: i64,
}

/// What happened to one processing attempt
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Completed {
        id: JobId,
        latency_ms: i64,
        ack: Ack,
    },
    /// Failed and re-enqueued; `error` is the failure that triggered it
    Retrying {
        id: JobId,
        attempt: u32,
        delay: Duration,
        error: ProcessError,
    },
    /// Stalled and re-enqueued without consuming an attempt
    Stalled { id: JobId, error: DispatchError },
    /// Permanently failed
    Failed { id: JobId, error: DispatchError },
}

impl JobOutcome {
    pub fn id(&self) -> JobId {
        match self {
            JobOutcome::Completed { id, .. }
            | JobOutcome::Retrying { id, .. }
            | JobOutcome::Stalled { id, .. }
            | JobOutcome::Failed { id, .. } => *id,
        }
    }
}

/// Four-tier job dispatcher
pub struct Dispatcher {
    config: DispatcherConfig,
    broker: Arc<dyn JobBroker>,
    retry: RetryStrategy,
    store: Arc<MetricStore>,
    next_id: AtomicU64,
    active: AtomicUsize,
    completed: AtomicU64,
    failed_total: AtomicU64,
    failed: Mutex<VecDeque<Job>>,
    stats: Mutex<StatsBook>,
    metrics: PipelineMetrics,
    logger: StructuredLogger,
}

impl Dispatcher {
    pub fn new(
        config: DispatcherConfig,
        broker: Arc<dyn JobBroker>,
        retry: RetryStrategy,
        store: Arc<MetricStore>,
    ) -> Self {
        Self {
            config,
            broker,
            retry,
            store,
            next_id: AtomicU64::new(1),
            active: AtomicUsize::new(0),
            completed: AtomicU64::new(0),
            failed_total: AtomicU64::new(0),
            failed: Mutex::new(VecDeque::new()),
            stats: Mutex::new(StatsBook::default()),
            metrics: PipelineMetrics::new(),
            logger: StructuredLogger::new("dispatcher"),
        }
    }

    /// Dispatcher over a fresh [`MemoryBroker`]
    pub fn in_memory(
        config: DispatcherConfig,
        retry: RetryStrategy,
        store: Arc<MetricStore>,
    ) -> Self {
        Self::new(config, Arc::new(MemoryBroker::new()), retry, store)
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn broker(&self) -> &Arc<dyn JobBroker> {
        &self.broker
    }

    pub fn store(&self) -> &Arc<MetricStore> {
        &self.store
    }

    /// Admit a new job
    pub async fn enqueue(
        &self,
        job_type: impl Into<String>,
        payload: serde_json::Value,
        priority: Priority,
    ) -> Result<JobHandle, DispatchError> {
        let id = JobId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let job = Job::new(id, job_type, payload, priority, now_millis());
        let handle = JobHandle {
            id,
            priority,
            enqueued_at_ms: job.enqueued_at_ms,
        };

        self.broker.push(job, Duration::ZERO).await?;

        self.metrics.inc_job_added(priority);
        self.store.record_sample(keys::JOBS_ADDED, 1.0);
        self.refresh_queue_gauges();
        debug!(job_id = %id, priority = %priority, "Job enqueued");

        Ok(handle)
    }

    /// Run one attempt of `job` and settle its outcome
    pub async fn process_job(
        &self,
        job: Job,
        processor: Arc<dyn PayloadProcessor>,
    ) -> JobOutcome {
        self.active.fetch_add(1, Ordering::Relaxed);
        let outcome = self.attempt(job, processor).await;
        self.active.fetch_sub(1, Ordering::Relaxed);
        self.refresh_queue_gauges();
        outcome
    }

    async fn attempt(&self, job: Job, processor: Arc<dyn PayloadProcessor>) -> JobOutcome {
        let stall_timeout = Duration::from_secs(self.config.stall_timeout_secs);
        let mut task = {
            let job = job.clone();
            tokio::spawn(async move { processor.process(&job).await })
        };

        match tokio::time::timeout(stall_timeout, &mut task).await {
            Err(_) => {
                task.abort();
                self.handle_stalled(job).await
            }
            Ok(Ok(Ok(ack))) => self.complete(job, ack),
            Ok(Ok(Err(e))) => self.fail(job, e).await,
            Ok(Err(join_error)) => {
                let e = ProcessError::new("Panic", join_error.to_string());
                self.fail(job, e).await
            }
        }
    }

    fn complete(&self, mut job: Job, ack: Ack) -> JobOutcome {
        let latency_ms = (now_millis() - job.enqueued_at_ms).max(0);
        job.state = JobState::Completed;

        self.completed.fetch_add(1, Ordering::Relaxed);
        self.metrics
            .inc_job_completed(&job.job_type, job.priority, latency_ms as f64 / 1000.0);
        self.store.record_sample(keys::JOBS_COMPLETED, 1.0);
        self.store.record_sample(keys::JOB_LATENCY_MS, latency_ms as f64);
        self.lock_stats()
            .record_completion(job.priority, latency_ms as f64);

        debug!(job_id = %job.id, latency_ms, "Job completed");
        JobOutcome::Completed {
            id: job.id,
            latency_ms,
            ack,
        }
    }

    async fn fail(&self, mut job: Job, error: ProcessError) -> JobOutcome {
        self.metrics
            .inc_job_failed(&job.job_type, job.priority, error.kind());
        self.store.record_sample(keys::JOBS_FAILED, 1.0);
        self.lock_stats().record_failure(job.priority, error.kind());

        let decision = self.retry.decide(job.attempts, job.priority);
        if decision.should_retry {
            let unscheduled = job.clone();
            job.attempts += 1;
            let (id, attempt) = (job.id, job.attempts);

            self.metrics.inc_job_retry(job.priority);
            self.store.record_sample(keys::JOBS_RETRIED, 1.0);
            self.lock_stats().record_retry();
            self.logger.log_retry_scheduled(
                id,
                job.priority,
                attempt,
                decision.delay_ms(),
                &error.to_string(),
            );

            if let Err(push_error) = self.broker.push(job, decision.delay).await {
                return self.reject_requeue(unscheduled, push_error);
            }

            return JobOutcome::Retrying {
                id,
                attempt,
                delay: decision.delay,
                error,
            };
        }

        let attempts = job.attempts + 1;
        self.metrics.inc_retry_exhausted(&job.job_type, job.priority);
        self.store.record_sample(keys::JOBS_RETRY_EXHAUSTED, 1.0);
        self.logger
            .log_retry_exhausted(job.id, job.priority, attempts, &error.to_string());

        let id = job.id;
        let dispatch_error = DispatchError::RetryExhausted {
            id,
            priority: job.priority,
            attempts,
            source: error,
        };
        job.state = JobState::Failed;
        self.retain_failed(job);

        JobOutcome::Failed {
            id,
            error: dispatch_error,
        }
    }

    /// A worker stopped answering for `job`. Re-queued with its attempt
    /// count unchanged until `max_stalls` is exceeded.
    pub async fn handle_stalled(&self, mut job: Job) -> JobOutcome {
        job.stalls += 1;
        let id = job.id;
        let error = DispatchError::Stalled {
            id,
            priority: job.priority,
        };

        self.metrics.inc_queue_error(error.error_type(), job.priority);
        self.store.record_sample(keys::JOBS_STALLED, 1.0);
        self.lock_stats().record_queue_error();
        self.logger.log_job_stalled(id, job.priority, job.stalls);

        if job.stalls > self.config.max_stalls {
            job.state = JobState::Stalled;
            self.retain_failed(job);
            return JobOutcome::Failed { id, error };
        }

        let unscheduled = job.clone();
        match self.broker.push(job, Duration::ZERO).await {
            Ok(()) => JobOutcome::Stalled { id, error },
            Err(push_error) => self.reject_requeue(unscheduled, push_error),
        }
    }

    /// The broker refused a re-queue; keep the job reachable from
    /// `failed_jobs` and `retry_failed`.
    fn reject_requeue(&self, mut job: Job, push_error: DispatchError) -> JobOutcome {
        error!(job_id = %job.id, error = %push_error, "Could not re-enqueue job");
        self.metrics
            .inc_queue_error(push_error.error_type(), job.priority);
        self.lock_stats().record_queue_error();

        let id = job.id;
        job.state = JobState::Failed;
        self.retain_failed(job);
        JobOutcome::Failed {
            id,
            error: push_error,
        }
    }

    pub fn status(&self) -> QueueStatus {
        let counts = self.broker.counts();
        QueueStatus {
            waiting: counts.total_waiting(),
            active: self.active.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed_total.load(Ordering::Relaxed),
            delayed: counts.delayed,
        }
    }

    /// Permanently failed jobs still retained, oldest first
    pub fn failed_jobs(&self) -> Vec<Job> {
        self.lock_failed().iter().cloned().collect()
    }

    /// Re-enqueue a permanently failed job with fresh counters
    pub async fn retry_failed(&self, id: JobId) -> Result<JobHandle, DispatchError> {
        let mut job = {
            let mut failed = self.lock_failed();
            let position = failed
                .iter()
                .position(|j| j.id == id)
                .ok_or(DispatchError::UnknownJob(id))?;
            failed.remove(position).ok_or(DispatchError::UnknownJob(id))?
        };

        job.attempts = 0;
        job.stalls = 0;
        job.state = JobState::Pending;
        job.enqueued_at_ms = now_millis();
        let handle = JobHandle {
            id: job.id,
            priority: job.priority,
            enqueued_at_ms: job.enqueued_at_ms,
        };

        self.broker.push(job, Duration::ZERO).await?;
        self.refresh_queue_gauges();
        Ok(handle)
    }

    /// Drop completed and failed bookkeeping
    pub fn clean(&self) {
        self.lock_failed().clear();
        self.lock_stats().clear();
        self.completed.store(0, Ordering::Relaxed);
        self.failed_total.store(0, Ordering::Relaxed);
    }

    pub fn queue_metrics(&self) -> QueueMetrics {
        self.lock_stats().snapshot()
    }

    fn retain_failed(&self, job: Job) {
        self.failed_total.fetch_add(1, Ordering::Relaxed);
        let mut failed = self.lock_failed();
        failed.push_back(job);
        while failed.len() > self.config.failed_retention {
            failed.pop_front();
        }
    }

    fn refresh_queue_gauges(&self) {
        let counts = self.broker.counts();
        for priority in Priority::ALL {
            self.metrics
                .set_queue_size(priority, counts.waiting_for(priority) as i64);
        }
        self.store
            .record_sample(keys::QUEUE_DEPTH, (counts.total_waiting() + counts.delayed) as f64);
    }

    fn lock_failed(&self) -> MutexGuard<'_, VecDeque<Job>> {
        self.failed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_stats(&self) -> MutexGuard<'_, StatsBook> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
