//! Alerting
//!
//! Severity classification of aggregate metrics against tiered thresholds,
//! routing to notification channels, and the in-memory alert log.

mod alerter;
pub mod channels;

pub use alerter::{
    channels_for, Alert, AlertConfig, AlertThresholds, Alerter, MetricsSnapshot, TierThresholds,
};
pub use channels::{AlertChannel, ChannelError, ChannelKind, LogChannel, WebhookChannel};
