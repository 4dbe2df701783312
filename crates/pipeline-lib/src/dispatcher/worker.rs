//! Worker loop draining the broker

use super::{Dispatcher, JobOutcome, PayloadProcessor};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

impl Dispatcher {
    /// Run `workers` concurrent consumers until shutdown or until the broker
    /// is closed and drained.
    pub async fn run(
        self: Arc<Self>,
        processor: Arc<dyn PayloadProcessor>,
        shutdown: broadcast::Receiver<()>,
    ) {
        let workers = self.config.workers.max(1);
        info!(workers, "Starting dispatcher workers");

        let mut set = JoinSet::new();
        for worker_id in 0..workers {
            set.spawn(work(
                worker_id,
                self.clone(),
                processor.clone(),
                shutdown.resubscribe(),
            ));
        }

        while let Some(result) = set.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "Dispatcher worker exited abnormally");
            }
        }

        info!("Dispatcher workers stopped");
    }
}

async fn work(
    worker_id: usize,
    dispatcher: Arc<Dispatcher>,
    processor: Arc<dyn PayloadProcessor>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        let job = tokio::select! {
            job = dispatcher.broker.pop() => job,
            _ = shutdown.recv() => {
                debug!(worker_id, "Shutting down dispatcher worker");
                break;
            }
        };

        let Some(job) = job else {
            debug!(worker_id, "Broker closed, worker exiting");
            break;
        };

        match dispatcher.process_job(job, processor.clone()).await {
            JobOutcome::Failed { id, error } => {
                debug!(worker_id, job_id = %id, error = %error, "Job failed permanently");
            }
            outcome => {
                debug!(worker_id, job_id = %outcome.id(), "Job attempt settled");
            }
        }
    }
}
