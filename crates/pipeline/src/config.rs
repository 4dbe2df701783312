//! Service configuration

use anyhow::Result;
use pipeline_lib::alerting::AlertConfig;
use pipeline_lib::{DispatcherConfig, MonitorConfig, RetryConfig, StoreConfig};
use serde::Deserialize;
use tracing::warn;

/// Payload delivery backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessorMode {
    /// Log and acknowledge every payload
    #[default]
    DryRun,
    /// POST each job as JSON to `webhook_url`
    Webhook,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessorConfig {
    #[serde(default)]
    pub mode: ProcessorMode,

    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Request timeout for webhook delivery
    #[serde(default = "default_processor_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_processor_timeout_secs() -> u64 {
    10
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            mode: ProcessorMode::default(),
            webhook_url: None,
            timeout_secs: default_processor_timeout_secs(),
        }
    }
}

/// Pipeline service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Name attached to structured log events
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// API server port for health, metrics and status
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub alerting: AlertConfig,

    #[serde(default)]
    pub processor: ProcessorConfig,
}

fn default_service_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "priority-pipeline".to_string())
}

fn default_api_port() -> u16 {
    8080
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            api_port: default_api_port(),
            dispatcher: DispatcherConfig::default(),
            retry: RetryConfig::default(),
            store: StoreConfig::default(),
            monitor: MonitorConfig::default(),
            alerting: AlertConfig::default(),
            processor: ProcessorConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load from an optional `pipeline.toml` and `PIPELINE_*` environment
    /// variables, e.g. `PIPELINE_RETRY__MAX_RETRIES=5`
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("pipeline").required(false))
            .add_source(
                config::Environment::with_prefix("PIPELINE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize().unwrap_or_else(|e| {
            warn!(error = %e, "Invalid pipeline configuration, using defaults");
            PipelineConfig::default()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{Config, File, FileFormat};

    fn from_toml(source: &str) -> PipelineConfig {
        Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_empty_source_uses_defaults() {
        let config = from_toml("");

        assert_eq!(config.api_port, 8080);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.base_delay_ms, 5000);
        assert_eq!(config.dispatcher.workers, 4);
        assert_eq!(config.store.window_secs, 3600);
        assert_eq!(config.store.max_samples, 1000);
        assert_eq!(config.processor.mode, ProcessorMode::DryRun);
        assert_eq!(config.processor.timeout_secs, 10);
    }

    #[test]
    fn test_sections_override_defaults() {
        let config = from_toml(
            r#"
            api_port = 9100

            [retry]
            max_retries = 5

            [dispatcher]
            stall_timeout_secs = 60

            [processor]
            mode = "webhook"
            webhook_url = "http://localhost:9000/deliver"
            "#,
        );

        assert_eq!(config.api_port, 9100);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.base_delay_ms, 5000);
        assert_eq!(config.dispatcher.stall_timeout_secs, 60);
        assert_eq!(config.dispatcher.max_stalls, 5);
        assert_eq!(config.processor.mode, ProcessorMode::Webhook);
        assert_eq!(
            config.processor.webhook_url.as_deref(),
            Some("http://localhost:9000/deliver")
        );
    }
}
