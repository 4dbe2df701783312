//! Threshold classification and fire-and-forget alert dispatch

use super::channels::{AlertChannel, ChannelKind, LogChannel, WebhookChannel};
use crate::error::ThresholdOrderError;
use crate::health::{components, HealthRegistry};
use crate::models::{now_millis, AlertSeverity, Severity};
use crate::observability::{PipelineMetrics, StructuredLogger};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinSet;
use tracing::{debug, warn};

const DEFAULT_ALERT_LOG_SIZE: usize = 100;

/// Per-tier limits; a metric at or above its limit matches the tier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierThresholds {
    pub error_rate: f64,
    pub latency_ms: f64,
    pub resource_usage: f64,
    pub anomaly_deviation: f64,
}

impl TierThresholds {
    /// Whether any present metric meets this tier
    pub fn matches(&self, snapshot: &MetricsSnapshot) -> bool {
        let meets = |value: Option<f64>, limit: f64| value.map(|v| v >= limit).unwrap_or(false);

        meets(snapshot.error_rate, self.error_rate)
            || meets(snapshot.latency_ms, self.latency_ms)
            || meets(snapshot.resource_usage, self.resource_usage)
            || meets(snapshot.anomaly_deviation, self.anomaly_deviation)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertThresholds {
    #[serde(default = "default_critical")]
    pub critical: TierThresholds,
    #[serde(default = "default_high")]
    pub high: TierThresholds,
    #[serde(default = "default_medium")]
    pub medium: TierThresholds,
    #[serde(default = "default_low")]
    pub low: TierThresholds,
}

fn default_critical() -> TierThresholds {
    TierThresholds {
        error_rate: 0.1,
        latency_ms: 500.0,
        resource_usage: 0.9,
        anomaly_deviation: 3.0,
    }
}

fn default_high() -> TierThresholds {
    TierThresholds {
        error_rate: 0.05,
        latency_ms: 300.0,
        resource_usage: 0.8,
        anomaly_deviation: 2.5,
    }
}

fn default_medium() -> TierThresholds {
    TierThresholds {
        error_rate: 0.02,
        latency_ms: 100.0,
        resource_usage: 0.7,
        anomaly_deviation: 2.0,
    }
}

fn default_low() -> TierThresholds {
    TierThresholds {
        error_rate: 0.01,
        latency_ms: 50.0,
        resource_usage: 0.6,
        anomaly_deviation: 1.5,
    }
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            critical: default_critical(),
            high: default_high(),
            medium: default_medium(),
            low: default_low(),
        }
    }
}

impl AlertThresholds {
    pub fn for_severity(&self, severity: AlertSeverity) -> &TierThresholds {
        match severity {
            AlertSeverity::Critical => &self.critical,
            AlertSeverity::High => &self.high,
            AlertSeverity::Medium => &self.medium,
            AlertSeverity::Low => &self.low,
        }
    }

    /// Check that every limit is non-increasing from CRITICAL down to LOW
    pub fn validate(&self) -> Result<(), ThresholdOrderError> {
        for pair in AlertSeverity::DESCENDING.windows(2) {
            let (higher, lower) = (pair[0], pair[1]);
            let (h, l) = (self.for_severity(higher), self.for_severity(lower));
            let limits = [
                ("error_rate", h.error_rate, l.error_rate),
                ("latency_ms", h.latency_ms, l.latency_ms),
                ("resource_usage", h.resource_usage, l.resource_usage),
                ("anomaly_deviation", h.anomaly_deviation, l.anomaly_deviation),
            ];
            for (metric, higher_value, lower_value) in limits {
                if lower_value > higher_value || lower_value.is_nan() || higher_value.is_nan() {
                    return Err(ThresholdOrderError {
                        metric,
                        higher,
                        higher_value,
                        lower,
                        lower_value,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Alerting configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AlertConfig {
    #[serde(default)]
    pub thresholds: AlertThresholds,

    /// Suppress repeats of the same (pattern, severity) within this many
    /// seconds; 0 disables suppression
    #[serde(default)]
    pub dedup_window_secs: u64,

    /// Alerts retained for `recent_alerts`
    #[serde(default = "default_alert_log_size")]
    pub alert_log_size: usize,

    #[serde(default)]
    pub slack_webhook_url: Option<String>,

    #[serde(default)]
    pub email_webhook_url: Option<String>,

    #[serde(default)]
    pub pagerduty_webhook_url: Option<String>,
}

fn default_alert_log_size() -> usize {
    DEFAULT_ALERT_LOG_SIZE
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            thresholds: AlertThresholds::default(),
            dedup_window_secs: 0,
            alert_log_size: DEFAULT_ALERT_LOG_SIZE,
            slack_webhook_url: None,
            email_webhook_url: None,
            pagerduty_webhook_url: None,
        }
    }
}

impl AlertConfig {
    fn webhook_url(&self, kind: ChannelKind) -> Option<&str> {
        match kind {
            ChannelKind::Slack => self.slack_webhook_url.as_deref(),
            ChannelKind::Email => self.email_webhook_url.as_deref(),
            ChannelKind::PagerDuty => self.pagerduty_webhook_url.as_deref(),
            ChannelKind::Log => None,
        }
    }
}

/// Aggregate metrics an alert is evaluated against; absent fields never match
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub error_rate: Option<f64>,
    pub latency_ms: Option<f64>,
    pub resource_usage: Option<f64>,
    pub anomaly_deviation: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub id: String,
    pub timestamp_ms: i64,
    pub pattern: String,
    pub severity: AlertSeverity,
    pub metrics: MetricsSnapshot,
    pub channels: Vec<ChannelKind>,
    pub message: String,
}

/// Channels an alert of `severity` is routed to
pub fn channels_for(severity: AlertSeverity) -> Vec<ChannelKind> {
    match severity {
        AlertSeverity::Critical => vec![
            ChannelKind::Slack,
            ChannelKind::Email,
            ChannelKind::PagerDuty,
        ],
        AlertSeverity::High => vec![ChannelKind::Slack, ChannelKind::Email],
        AlertSeverity::Medium => vec![ChannelKind::Slack],
        AlertSeverity::Low => vec![ChannelKind::Log],
    }
}

/// Classifies metric snapshots and routes alerts to channels
pub struct Alerter {
    thresholds: AlertThresholds,
    channels: HashMap<ChannelKind, Arc<dyn AlertChannel>>,
    dedup_window: Duration,
    last_emitted: Mutex<HashMap<(String, AlertSeverity), i64>>,
    log: Mutex<VecDeque<Alert>>,
    log_size: usize,
    sequence: AtomicU64,
    metrics: PipelineMetrics,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
}

impl Default for Alerter {
    fn default() -> Self {
        Self::new(AlertConfig::default())
    }
}

impl Alerter {
    /// Build an alerter; channels with a webhook URL post to it, the rest log.
    /// Misordered thresholds are replaced by the defaults.
    pub fn new(config: AlertConfig) -> Self {
        let mut channels: HashMap<ChannelKind, Arc<dyn AlertChannel>> = HashMap::new();
        for kind in ChannelKind::ALL {
            let sink: Arc<dyn AlertChannel> = match config.webhook_url(kind) {
                Some(url) => match WebhookChannel::new(kind, url) {
                    Ok(webhook) => Arc::new(webhook),
                    Err(e) => {
                        warn!(channel = %kind, error = %e, "Webhook unavailable, logging alerts instead");
                        Arc::new(LogChannel::new(kind))
                    }
                },
                None => Arc::new(LogChannel::new(kind)),
            };
            channels.insert(kind, sink);
        }

        let thresholds = match config.thresholds.validate() {
            Ok(()) => config.thresholds,
            Err(e) => {
                warn!(error = %e, "Alert thresholds out of order, using defaults");
                AlertThresholds::default()
            }
        };

        Self {
            thresholds,
            channels,
            dedup_window: Duration::from_secs(config.dedup_window_secs),
            last_emitted: Mutex::new(HashMap::new()),
            log: Mutex::new(VecDeque::new()),
            log_size: config.alert_log_size.max(1),
            sequence: AtomicU64::new(0),
            metrics: PipelineMetrics::new(),
            logger: StructuredLogger::new("alerter"),
            health: None,
        }
    }

    /// Report delivery outcomes as the alerter component's health
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Replace the destination for one channel kind
    pub fn with_channel(mut self, kind: ChannelKind, channel: Arc<dyn AlertChannel>) -> Self {
        self.channels.insert(kind, channel);
        self
    }

    /// Set custom deduplication window
    pub fn with_dedup_window(mut self, window: Duration) -> Self {
        self.dedup_window = window;
        self
    }

    pub fn thresholds(&self) -> &AlertThresholds {
        &self.thresholds
    }

    /// First tier, from CRITICAL down, that any present metric meets
    pub fn classify(&self, snapshot: &MetricsSnapshot) -> Severity {
        AlertSeverity::DESCENDING
            .into_iter()
            .find(|severity| self.thresholds.for_severity(*severity).matches(snapshot))
            .map(Severity::from)
            .unwrap_or(Severity::None)
    }

    /// Classify, build and dispatch an alert. Returns the alert when one was
    /// emitted. Delivery runs on spawned tasks; this never waits for it.
    pub fn check_and_alert(&self, pattern: &str, snapshot: MetricsSnapshot) -> Option<Alert> {
        self.check_and_alert_at(pattern, snapshot, now_millis())
    }

    pub fn check_and_alert_at(
        &self,
        pattern: &str,
        snapshot: MetricsSnapshot,
        now_ms: i64,
    ) -> Option<Alert> {
        let severity = self.classify(&snapshot).alert_severity()?;

        if self.is_duplicate(pattern, severity, now_ms) {
            debug!(pattern = %pattern, severity = %severity, "Suppressing duplicate alert");
            return None;
        }

        let alert = Alert {
            id: self.next_alert_id(now_ms),
            timestamp_ms: now_ms,
            pattern: pattern.to_string(),
            severity,
            metrics: snapshot,
            channels: channels_for(severity),
            message: self.message(pattern, &snapshot, severity),
        };

        self.dispatch(&alert);
        self.record(&alert);
        Some(alert)
    }

    /// Most recent alerts, newest first
    pub fn recent_alerts(&self, limit: usize) -> Vec<Alert> {
        let log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        log.iter().rev().take(limit).cloned().collect()
    }

    /// Drop dedup entries older than the window
    pub fn cleanup_dedup_cache(&self, now_ms: i64) {
        let window_ms = self.dedup_window.as_millis() as i64;
        let mut last = self
            .last_emitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        last.retain(|_, ts| now_ms - *ts < window_ms);
    }

    fn is_duplicate(&self, pattern: &str, severity: AlertSeverity, now_ms: i64) -> bool {
        if self.dedup_window.is_zero() {
            return false;
        }
        let window_ms = self.dedup_window.as_millis() as i64;
        let mut last = self
            .last_emitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let key = (pattern.to_string(), severity);

        match last.get(&key) {
            Some(ts) if now_ms - *ts < window_ms => true,
            _ => {
                last.insert(key, now_ms);
                false
            }
        }
    }

    fn next_alert_id(&self, now_ms: i64) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("alert_{}_{:06}", now_ms, seq)
    }

    fn message(&self, pattern: &str, snapshot: &MetricsSnapshot, severity: AlertSeverity) -> String {
        let limits = self.thresholds.for_severity(severity);
        let show = |value: Option<f64>| {
            value
                .map(|v| format!("{}", v))
                .unwrap_or_else(|| "n/a".to_string())
        };

        let mut message = format!("[{}] Pattern detected: {}\n", severity, pattern);
        let _ = writeln!(
            message,
            "Error Rate: {} (threshold: {})",
            show(snapshot.error_rate),
            limits.error_rate
        );
        let _ = writeln!(
            message,
            "Latency: {}ms (threshold: {}ms)",
            show(snapshot.latency_ms),
            limits.latency_ms
        );
        let _ = writeln!(
            message,
            "Resource Usage: {} (threshold: {})",
            show(snapshot.resource_usage),
            limits.resource_usage
        );
        let _ = write!(
            message,
            "Anomaly Deviation: {} (threshold: {})",
            show(snapshot.anomaly_deviation),
            limits.anomaly_deviation
        );
        message
    }

    fn dispatch(&self, alert: &Alert) {
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(alert_id = %alert.id, "No async runtime, alert delivery skipped");
                return;
            }
        };

        let targets: Vec<(ChannelKind, Arc<dyn AlertChannel>)> = alert
            .channels
            .iter()
            .filter_map(|kind| self.channels.get(kind).cloned().map(|c| (*kind, c)))
            .collect();
        let alert = Arc::new(alert.clone());
        let metrics = self.metrics.clone();
        let health = self.health.clone();

        handle.spawn(async move {
            let mut deliveries = JoinSet::new();
            for (kind, channel) in targets {
                let alert = alert.clone();
                deliveries.spawn(async move { (kind, channel.send(&alert).await) });
            }

            let mut failed = Vec::new();
            while let Some(joined) = deliveries.join_next().await {
                match joined {
                    Ok((_, Ok(()))) => {}
                    Ok((kind, Err(e))) => {
                        warn!(
                            event = "alert_delivery_failed",
                            channel = %kind,
                            alert_id = %alert.id,
                            error = %e,
                            "Alert channel failed"
                        );
                        metrics.inc_error("channel_delivery", alert.severity.as_str(), "alerter");
                        failed.push(kind.as_str());
                    }
                    Err(e) => {
                        warn!(alert_id = %alert.id, error = %e, "Alert delivery task failed");
                        failed.push("unknown");
                    }
                }
            }

            if let Some(health) = health {
                if failed.is_empty() {
                    health.set_healthy(components::ALERTER).await;
                } else {
                    health
                        .set_degraded(
                            components::ALERTER,
                            format!("Alert delivery failed on {}", failed.join(",")),
                        )
                        .await;
                }
            }
        });
    }

    fn record(&self, alert: &Alert) {
        self.metrics
            .inc_adaptation("alert_generated", alert.severity.as_str());

        let channels: Vec<&str> = alert.channels.iter().map(|c| c.as_str()).collect();
        self.logger
            .log_alert(&alert.id, alert.severity, &alert.pattern, &channels.join(","));

        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        log.push_back(alert.clone());
        while log.len() > self.log_size {
            log.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::ChannelError;
    use crate::health::ComponentStatus;
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    struct Recorder {
        tx: mpsc::UnboundedSender<(String, String)>,
        name: String,
    }

    #[async_trait]
    impl AlertChannel for Recorder {
        fn name(&self) -> &str {
            &self.name
        }

        async fn send(&self, alert: &Alert) -> Result<(), ChannelError> {
            let _ = self.tx.send((self.name.clone(), alert.id.clone()));
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl AlertChannel for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn send(&self, _alert: &Alert) -> Result<(), ChannelError> {
            Err(ChannelError::Unavailable("down".to_string()))
        }
    }

    fn error_rate(value: f64) -> MetricsSnapshot {
        MetricsSnapshot {
            error_rate: Some(value),
            ..Default::default()
        }
    }

    #[test]
    fn test_critical_error_rate_routes_to_three_channels() {
        let alerter = Alerter::default();
        let snapshot = error_rate(0.12);

        assert_eq!(alerter.classify(&snapshot), Severity::Critical);
        assert_eq!(
            channels_for(AlertSeverity::Critical),
            vec![ChannelKind::Slack, ChannelKind::Email, ChannelKind::PagerDuty]
        );

        // No runtime here: the alert is still built and logged
        let alert = alerter.check_and_alert("ANOMALY", snapshot).unwrap();
        assert_eq!(alert.severity, AlertSeverity::Critical);
        assert_eq!(alert.channels.len(), 3);
        assert!(alert.id.starts_with("alert_"));
    }

    #[test]
    fn test_classification_tiers() {
        let alerter = Alerter::default();
        assert_eq!(alerter.classify(&error_rate(0.05)), Severity::High);
        assert_eq!(alerter.classify(&error_rate(0.03)), Severity::Medium);
        assert_eq!(alerter.classify(&error_rate(0.01)), Severity::Low);
        assert_eq!(alerter.classify(&error_rate(0.001)), Severity::None);
        assert_eq!(alerter.classify(&MetricsSnapshot::default()), Severity::None);

        let latency = MetricsSnapshot {
            error_rate: Some(0.0),
            latency_ms: Some(320.0),
            ..Default::default()
        };
        assert_eq!(alerter.classify(&latency), Severity::High);
    }

    async fn wait_for_alerter_status(health: &HealthRegistry, want: ComponentStatus) -> bool {
        for _ in 0..100 {
            if health.status_of(components::ALERTER).await == Some(want) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_delivery_failure_degrades_alerter_health() {
        let health = HealthRegistry::new();
        health.register(components::ALERTER).await;
        let alerter = Alerter::default()
            .with_health(health.clone())
            .with_channel(ChannelKind::Slack, Arc::new(Failing));

        alerter.check_and_alert("ANOMALY", error_rate(0.2)).unwrap();
        assert!(wait_for_alerter_status(&health, ComponentStatus::Degraded).await);

        // LOW routes to the log channel only, which always delivers
        alerter.check_and_alert("ANOMALY", error_rate(0.01)).unwrap();
        assert!(wait_for_alerter_status(&health, ComponentStatus::Healthy).await);
    }

    #[test]
    fn test_default_thresholds_are_ordered() {
        assert!(AlertThresholds::default().validate().is_ok());
    }

    #[test]
    fn test_misordered_thresholds_fall_back_to_defaults() {
        let mut thresholds = AlertThresholds::default();
        thresholds.low.latency_ms = 1_000.0;

        let err = thresholds.validate().unwrap_err();
        assert_eq!(err.metric, "latency_ms");
        assert_eq!(err.higher, AlertSeverity::Medium);
        assert_eq!(err.lower, AlertSeverity::Low);

        let alerter = Alerter::new(AlertConfig {
            thresholds,
            ..Default::default()
        });
        assert_eq!(alerter.thresholds(), &AlertThresholds::default());
    }

    #[test]
    fn test_no_alert_below_low_tier() {
        let alerter = Alerter::default();
        assert!(alerter.check_and_alert("TREND", error_rate(0.0)).is_none());
        assert!(alerter.recent_alerts(10).is_empty());
    }

    #[test]
    fn test_message_lists_metrics_against_tier() {
        let alerter = Alerter::default();
        let alert = alerter
            .check_and_alert(
                "TREND",
                MetricsSnapshot {
                    error_rate: Some(0.03),
                    latency_ms: Some(20.0),
                    resource_usage: None,
                    anomaly_deviation: Some(0.5),
                },
            )
            .unwrap();

        let lines: Vec<&str> = alert.message.lines().collect();
        assert_eq!(lines[0], "[MEDIUM] Pattern detected: TREND");
        assert_eq!(lines[1], "Error Rate: 0.03 (threshold: 0.02)");
        assert_eq!(lines[2], "Latency: 20ms (threshold: 100ms)");
        assert_eq!(lines[3], "Resource Usage: n/a (threshold: 0.7)");
        assert_eq!(lines[4], "Anomaly Deviation: 0.5 (threshold: 2)");
    }

    #[tokio::test]
    async fn test_failing_channel_does_not_block_others() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let recorder = |name: &str| {
            Arc::new(Recorder {
                tx: tx.clone(),
                name: name.to_string(),
            }) as Arc<dyn AlertChannel>
        };

        let alerter = Alerter::default()
            .with_channel(ChannelKind::Slack, Arc::new(Failing))
            .with_channel(ChannelKind::Email, recorder("email"))
            .with_channel(ChannelKind::PagerDuty, recorder("pagerduty"));

        let alert = alerter.check_and_alert("ANOMALY", error_rate(0.2)).unwrap();

        let mut delivered = Vec::new();
        for _ in 0..2 {
            let (name, id) = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .expect("delivery in time")
                .expect("channel open");
            assert_eq!(id, alert.id);
            delivered.push(name);
        }
        delivered.sort();
        assert_eq!(delivered, vec!["email".to_string(), "pagerduty".to_string()]);
    }

    #[test]
    fn test_dedup_window_suppresses_repeats() {
        let alerter = Alerter::default().with_dedup_window(Duration::from_secs(60));

        assert!(alerter
            .check_and_alert_at("ANOMALY", error_rate(0.2), 1_000)
            .is_some());
        assert!(alerter
            .check_and_alert_at("ANOMALY", error_rate(0.2), 30_000)
            .is_none());
        // Different severity is a different key
        assert!(alerter
            .check_and_alert_at("ANOMALY", error_rate(0.06), 30_000)
            .is_some());
        assert!(alerter
            .check_and_alert_at("ANOMALY", error_rate(0.2), 62_000)
            .is_some());

        alerter.cleanup_dedup_cache(200_000);
        assert!(alerter
            .check_and_alert_at("ANOMALY", error_rate(0.2), 200_001)
            .is_some());
    }

    #[test]
    fn test_alert_log_is_bounded_and_newest_first() {
        let alerter = Alerter::new(AlertConfig {
            alert_log_size: 3,
            ..Default::default()
        });
        for i in 0..5 {
            alerter.check_and_alert_at(&format!("P{}", i), error_rate(0.2), i);
        }

        let recent = alerter.recent_alerts(10);
        let patterns: Vec<&str> = recent.iter().map(|a| a.pattern.as_str()).collect();
        assert_eq!(patterns, vec!["P4", "P3", "P2"]);
    }
}
