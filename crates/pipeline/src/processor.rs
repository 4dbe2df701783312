//! Payload processors available to the service

use crate::config::{ProcessorConfig, ProcessorMode};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use pipeline_lib::{Ack, Job, PayloadProcessor, ProcessError};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Response header carrying the downstream message id, if the receiver sets one
const MESSAGE_ID_HEADER: &str = "x-message-id";

/// Acknowledges every job without delivering it
#[derive(Debug, Clone, Default)]
pub struct DryRunProcessor;

#[async_trait]
impl PayloadProcessor for DryRunProcessor {
    async fn process(&self, job: &Job) -> Result<Ack, ProcessError> {
        info!(
            event = "job_dry_run",
            job_id = %job.id,
            job_type = %job.job_type,
            priority = %job.priority,
            attempt = job.attempts,
            "Dry run delivery"
        );
        Ok(Ack {
            reference: Some(format!("dry-run-{}", job.id)),
        })
    }
}

/// Delivers each job by POSTing it as JSON
pub struct WebhookProcessor {
    client: Client,
    url: String,
}

impl WebhookProcessor {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

fn classify(error: &reqwest::Error) -> &'static str {
    if error.is_timeout() {
        "Timeout"
    } else if error.is_connect() {
        "ConnectionError"
    } else {
        "HttpError"
    }
}

#[async_trait]
impl PayloadProcessor for WebhookProcessor {
    async fn process(&self, job: &Job) -> Result<Ack, ProcessError> {
        let response = self
            .client
            .post(&self.url)
            .json(job)
            .send()
            .await
            .map_err(|e| ProcessError::new(classify(&e), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(job_id = %job.id, status = status.as_u16(), "Delivery rejected");
            return Err(ProcessError::new(
                "Rejected",
                format!("receiver answered {}", status),
            ));
        }

        let reference = response
            .headers()
            .get(MESSAGE_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok(Ack { reference })
    }
}

/// Build the configured processor
pub fn build(config: &ProcessorConfig) -> Result<Arc<dyn PayloadProcessor>> {
    match config.mode {
        ProcessorMode::DryRun => Ok(Arc::new(DryRunProcessor)),
        ProcessorMode::Webhook => {
            let url = config
                .webhook_url
                .as_deref()
                .ok_or_else(|| anyhow!("processor.webhook_url is required in webhook mode"))?;
            let timeout = Duration::from_secs(config.timeout_secs.max(1));
            Ok(Arc::new(WebhookProcessor::new(url, timeout)?))
        }
    }
}
