//! Notification channels
//!
//! A channel delivers one alert to one destination. Delivery is independent
//! per channel: a failure is returned to the caller, which logs and drops it.

use super::Alert;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

/// Timeout for webhook delivery
const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 10;

/// Alert destination category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Slack,
    Email,
    PagerDuty,
    Log,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 4] = [
        ChannelKind::Slack,
        ChannelKind::Email,
        ChannelKind::PagerDuty,
        ChannelKind::Log,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ChannelKind::Slack => "slack",
            ChannelKind::Email => "email",
            ChannelKind::PagerDuty => "pagerduty",
            ChannelKind::Log => "log",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("HTTP delivery failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("destination rejected alert ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("channel unavailable: {0}")]
    Unavailable(String),
}

/// A single alert destination
#[async_trait]
pub trait AlertChannel: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    async fn send(&self, alert: &Alert) -> Result<(), ChannelError>;
}

/// Writes alerts to the structured log
#[derive(Debug, Clone)]
pub struct LogChannel {
    name: String,
}

impl LogChannel {
    pub fn new(kind: ChannelKind) -> Self {
        Self {
            name: kind.as_str().to_string(),
        }
    }
}

#[async_trait]
impl AlertChannel for LogChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, alert: &Alert) -> Result<(), ChannelError> {
        match alert.severity {
            crate::models::AlertSeverity::Critical | crate::models::AlertSeverity::High => warn!(
                event = "alert_delivered",
                channel = %self.name,
                alert_id = %alert.id,
                severity = %alert.severity,
                pattern = %alert.pattern,
                "{}",
                alert.message
            ),
            _ => info!(
                event = "alert_delivered",
                channel = %self.name,
                alert_id = %alert.id,
                severity = %alert.severity,
                pattern = %alert.pattern,
                "{}",
                alert.message
            ),
        }
        Ok(())
    }
}

/// POSTs the alert as JSON to a webhook (Slack incoming hook, PagerDuty
/// events bridge, mail relay)
pub struct WebhookChannel {
    name: String,
    client: Client,
    url: String,
}

impl WebhookChannel {
    pub fn new(kind: ChannelKind, url: impl Into<String>) -> Result<Self, ChannelError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_WEBHOOK_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            name: kind.as_str().to_string(),
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl AlertChannel for WebhookChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, alert: &Alert) -> Result<(), ChannelError> {
        let response = self.client.post(&self.url).json(alert).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            error!(channel = %self.name, status, "Webhook rejected alert");
            return Err(ChannelError::Rejected { status, body });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_kind_names() {
        assert_eq!(
            serde_json::to_string(&ChannelKind::PagerDuty).unwrap(),
            "\"pagerduty\""
        );
        let parsed: ChannelKind = serde_json::from_str("\"slack\"").unwrap();
        assert_eq!(parsed, ChannelKind::Slack);
        assert_eq!(ChannelKind::Log.to_string(), "log");
    }

    #[test]
    fn test_webhook_channel_builds() {
        let channel = WebhookChannel::new(ChannelKind::Slack, "http://127.0.0.1:9/hook").unwrap();
        assert_eq!(channel.name(), "slack");
        assert_eq!(channel.url(), "http://127.0.0.1:9/hook");
    }
}
