use super::*;
use crate::retry::RetryConfig;
use tokio::sync::{broadcast, mpsc};

struct AlwaysOk;

#[async_trait]
impl PayloadProcessor for AlwaysOk {
    async fn process(&self, _job: &Job) -> Result<Ack, ProcessError> {
        Ok(Ack {
            reference: Some("sent".to_string()),
        })
    }
}

struct AlwaysFails;

#[async_trait]
impl PayloadProcessor for AlwaysFails {
    async fn process(&self, _job: &Job) -> Result<Ack, ProcessError> {
        Err(ProcessError::new("SmtpError", "connection refused"))
    }
}

struct NeverAnswers;

#[async_trait]
impl PayloadProcessor for NeverAnswers {
    async fn process(&self, _job: &Job) -> Result<Ack, ProcessError> {
        std::future::pending().await
    }
}

struct Panics;

#[async_trait]
impl PayloadProcessor for Panics {
    async fn process(&self, _job: &Job) -> Result<Ack, ProcessError> {
        panic!("processor blew up")
    }
}

struct Recorder(mpsc::UnboundedSender<JobId>);

#[async_trait]
impl PayloadProcessor for Recorder {
    async fn process(&self, job: &Job) -> Result<Ack, ProcessError> {
        let _ = self.0.send(job.id);
        Ok(Ack::default())
    }
}

fn dispatcher(config: DispatcherConfig) -> Dispatcher {
    let retry = RetryStrategy::new(RetryConfig {
        max_retries: 3,
        base_delay_ms: 1000,
    });
    Dispatcher::in_memory(config, retry, Arc::new(MetricStore::default()))
}

async fn next_job(dispatcher: &Dispatcher) -> Job {
    dispatcher.broker().pop().await.unwrap()
}

#[tokio::test]
async fn test_enqueue_serves_priorities_in_order() {
    let d = dispatcher(DispatcherConfig::default());
    let low = d.enqueue("email", serde_json::Value::Null, Priority::Low).await.unwrap();
    let urgent = d.enqueue("email", serde_json::Value::Null, Priority::Urgent).await.unwrap();
    let high = d.enqueue("email", serde_json::Value::Null, Priority::High).await.unwrap();

    assert_eq!(d.status().waiting, 3);
    assert_eq!(d.store().window(keys::JOBS_ADDED).len(), 3);

    let order: Vec<JobId> = std::iter::from_fn(|| d.broker().try_pop())
        .map(|j| j.id)
        .collect();
    assert_eq!(order, vec![urgent.id, high.id, low.id]);
}

#[tokio::test]
async fn test_completion_is_recorded() {
    let d = dispatcher(DispatcherConfig::default());
    d.enqueue("email", serde_json::json!({"to": "a@b.c"}), Priority::High)
        .await
        .unwrap();

    let job = next_job(&d).await;
    let outcome = d.process_job(job, Arc::new(AlwaysOk)).await;

    match outcome {
        JobOutcome::Completed { ack, latency_ms, .. } => {
            assert_eq!(ack.reference.as_deref(), Some("sent"));
            assert!(latency_ms >= 0);
        }
        other => panic!("expected completion, got {:?}", other),
    }

    let status = d.status();
    assert_eq!(status.completed, 1);
    assert_eq!(status.active, 0);
    assert_eq!(d.store().window(keys::JOBS_COMPLETED).len(), 1);
    assert_eq!(d.store().window(keys::JOB_LATENCY_MS).len(), 1);
    assert_eq!(d.queue_metrics().completed["priority_HIGH"], 1);
}

#[tokio::test(start_paused = true)]
async fn test_failure_schedules_delayed_retry() {
    let d = dispatcher(DispatcherConfig::default());
    d.enqueue("email", serde_json::Value::Null, Priority::Medium)
        .await
        .unwrap();

    let job = next_job(&d).await;
    let outcome = d.process_job(job, Arc::new(AlwaysFails)).await;

    match outcome {
        JobOutcome::Retrying {
            attempt,
            delay,
            error,
            ..
        } => {
            assert_eq!(attempt, 1);
            assert_eq!(delay, Duration::from_millis(1000));
            assert_eq!(error.kind(), "SmtpError");
        }
        other => panic!("expected retry, got {:?}", other),
    }

    assert_eq!(d.status().delayed, 1);
    assert!(d.broker().try_pop().is_none());

    let retried = next_job(&d).await;
    assert_eq!(retried.attempts, 1);
    assert_eq!(d.store().window(keys::JOBS_RETRIED).len(), 1);
    assert_eq!(d.queue_metrics().failed["MEDIUM_SmtpError"], 1);
}

#[tokio::test(start_paused = true)]
async fn test_retries_exhaust_after_max_retries() {
    let d = dispatcher(DispatcherConfig::default());
    let handle = d
        .enqueue("email", serde_json::Value::Null, Priority::Urgent)
        .await
        .unwrap();

    let mut outcome = None;
    for _ in 0..4 {
        let job = next_job(&d).await;
        outcome = Some(d.process_job(job, Arc::new(AlwaysFails)).await);
    }

    match outcome {
        Some(JobOutcome::Failed {
            error: DispatchError::RetryExhausted { id, attempts, .. },
            ..
        }) => {
            assert_eq!(id, handle.id);
            assert_eq!(attempts, 4);
        }
        other => panic!("expected exhaustion, got {:?}", other),
    }

    assert_eq!(d.status().failed, 1);
    assert_eq!(d.status().waiting + d.status().delayed, 0);
    assert_eq!(d.failed_jobs().len(), 1);
    assert_eq!(d.failed_jobs()[0].state, JobState::Failed);
    assert_eq!(d.store().window(keys::JOBS_RETRY_EXHAUSTED).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stall_requeues_without_consuming_attempt() {
    let d = dispatcher(DispatcherConfig {
        max_stalls: 1,
        ..DispatcherConfig::default()
    });
    d.enqueue("email", serde_json::Value::Null, Priority::High)
        .await
        .unwrap();

    let job = next_job(&d).await;
    let outcome = d.process_job(job, Arc::new(NeverAnswers)).await;
    assert!(matches!(outcome, JobOutcome::Stalled { .. }));

    let requeued = next_job(&d).await;
    assert_eq!(requeued.attempts, 0);
    assert_eq!(requeued.stalls, 1);

    let outcome = d.process_job(requeued, Arc::new(NeverAnswers)).await;
    match outcome {
        JobOutcome::Failed { error, .. } => assert_eq!(error.error_type(), "stalled"),
        other => panic!("expected stall failure, got {:?}", other),
    }

    assert_eq!(d.failed_jobs().len(), 1);
    assert_eq!(d.store().window(keys::JOBS_STALLED).len(), 2);
    assert_eq!(d.queue_metrics().queue_errors, 2);
}

#[tokio::test]
async fn test_failure_after_close_keeps_job_retrievable() {
    let d = dispatcher(DispatcherConfig::default());
    let handle = d
        .enqueue("email", serde_json::Value::Null, Priority::Medium)
        .await
        .unwrap();
    let job = next_job(&d).await;
    d.broker().close();

    match d.process_job(job, Arc::new(AlwaysFails)).await {
        JobOutcome::Failed { id, error } => {
            assert_eq!(id, handle.id);
            assert!(matches!(error, DispatchError::QueueClosed));
        }
        other => panic!("expected failure, got {:?}", other),
    }

    let failed = d.failed_jobs();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id, handle.id);
    assert_eq!(failed[0].attempts, 0);
    assert_eq!(failed[0].state, JobState::Failed);
    assert_eq!(d.status().failed, 1);
    assert_eq!(d.queue_metrics().queue_errors, 1);
}

#[tokio::test(start_paused = true)]
async fn test_stall_after_close_keeps_job_retrievable() {
    let d = dispatcher(DispatcherConfig::default());
    let handle = d
        .enqueue("email", serde_json::Value::Null, Priority::High)
        .await
        .unwrap();
    let job = next_job(&d).await;
    d.broker().close();

    let outcome = d.process_job(job, Arc::new(NeverAnswers)).await;
    assert!(matches!(
        outcome,
        JobOutcome::Failed {
            error: DispatchError::QueueClosed,
            ..
        }
    ));

    let failed = d.failed_jobs();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id, handle.id);
    assert_eq!(failed[0].stalls, 1);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_processor_is_a_failure() {
    let d = dispatcher(DispatcherConfig::default());
    d.enqueue("email", serde_json::Value::Null, Priority::Low)
        .await
        .unwrap();

    let job = next_job(&d).await;
    match d.process_job(job, Arc::new(Panics)).await {
        JobOutcome::Retrying { error, .. } => assert_eq!(error.kind(), "Panic"),
        other => panic!("expected retry after panic, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_retry_failed_resets_counters() {
    let d = dispatcher(DispatcherConfig::default());
    let handle = d
        .enqueue("email", serde_json::Value::Null, Priority::Medium)
        .await
        .unwrap();

    for _ in 0..4 {
        let job = next_job(&d).await;
        d.process_job(job, Arc::new(AlwaysFails)).await;
    }
    assert_eq!(d.failed_jobs().len(), 1);

    d.retry_failed(handle.id).await.unwrap();
    assert!(d.failed_jobs().is_empty());

    let job = d.broker().try_pop().unwrap();
    assert_eq!(job.id, handle.id);
    assert_eq!(job.attempts, 0);
    assert_eq!(job.state, JobState::Pending);

    assert!(matches!(
        d.retry_failed(JobId(999)).await,
        Err(DispatchError::UnknownJob(JobId(999)))
    ));
}

#[tokio::test]
async fn test_clean_resets_bookkeeping() {
    let d = dispatcher(DispatcherConfig::default());
    d.enqueue("email", serde_json::Value::Null, Priority::Low)
        .await
        .unwrap();
    let job = next_job(&d).await;
    d.process_job(job, Arc::new(AlwaysOk)).await;
    assert_eq!(d.status().completed, 1);

    d.clean();
    assert_eq!(d.status(), QueueStatus::default());
    assert!(d.queue_metrics().processing.is_empty());
}

#[tokio::test]
async fn test_workers_drain_queue_until_shutdown() {
    let d = Arc::new(dispatcher(DispatcherConfig {
        workers: 1,
        ..DispatcherConfig::default()
    }));
    let low = d.enqueue("email", serde_json::Value::Null, Priority::Low).await.unwrap();
    let urgent = d.enqueue("email", serde_json::Value::Null, Priority::Urgent).await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let runner = tokio::spawn(d.clone().run(Arc::new(Recorder(tx)), shutdown_rx));

    let first = rx.recv().await.unwrap();
    let second = rx.recv().await.unwrap();
    assert_eq!((first, second), (urgent.id, low.id));

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), runner)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(d.status().completed, 2);
}
