//! Priority pipeline service
//!
//! Runs the dispatcher workers and the health monitor, and serves health,
//! metrics and status endpoints until interrupted.

use anyhow::Result;
use pipeline::{api, config::PipelineConfig, processor};
use pipeline_lib::{
    alerting::Alerter,
    health::{components, HealthRegistry},
    observability::{PipelineMetrics, StructuredLogger},
    Dispatcher, MetricStore, Monitor, RetryStrategy,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const PIPELINE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting priority-pipeline");

    let config = PipelineConfig::load()?;
    info!(
        service = %config.service_name,
        port = config.api_port,
        workers = config.dispatcher.workers,
        "Pipeline configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::DISPATCHER).await;
    health_registry.register(components::METRIC_STORE).await;
    health_registry.register(components::MONITOR).await;
    health_registry.register(components::ALERTER).await;

    let metrics = PipelineMetrics::new();
    let logger = StructuredLogger::new(&config.service_name);
    logger.log_startup(PIPELINE_VERSION, config.dispatcher.workers);

    let store = Arc::new(MetricStore::new(config.store.clone()));
    let dispatcher = Arc::new(Dispatcher::in_memory(
        config.dispatcher.clone(),
        RetryStrategy::new(config.retry.clone()),
        store,
    ));
    let alerter = Arc::new(
        Alerter::new(config.alerting.clone()).with_health(health_registry.clone()),
    );
    let monitor = Arc::new(Monitor::new(
        config.monitor.clone(),
        dispatcher.clone(),
        alerter.clone(),
        health_registry.clone(),
    ));
    let processor = processor::build(&config.processor)?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let workers = tokio::spawn(dispatcher.clone().run(processor, shutdown_tx.subscribe()));
    let monitor_loop = tokio::spawn(monitor.clone().run(shutdown_tx.subscribe()));

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics,
        dispatcher.clone(),
        alerter,
        monitor,
    ));

    health_registry.set_ready(true).await;

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    health_registry.set_ready(false).await;

    let _ = shutdown_tx.send(());
    dispatcher.broker().close();

    for (name, handle) in [("dispatcher", workers), ("monitor", monitor_loop)] {
        if let Err(e) = handle.await {
            warn!(task = name, error = %e, "Background task ended abnormally");
        }
    }
    api_handle.abort();

    info!("Shutdown complete");
    Ok(())
}
