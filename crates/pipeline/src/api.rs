//! HTTP API for health checks, Prometheus metrics and pipeline status

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use pipeline_lib::{
    alerting::Alerter,
    health::{ComponentStatus, HealthRegistry},
    observability::PipelineMetrics,
    DispatchError, Dispatcher, JobId, Monitor, Priority,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

const DEFAULT_ALERT_LIMIT: usize = 20;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: PipelineMetrics,
    pub dispatcher: Arc<Dispatcher>,
    pub alerter: Arc<Alerter>,
    pub monitor: Arc<Monitor>,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: PipelineMetrics,
        dispatcher: Arc<Dispatcher>,
        alerter: Arc<Alerter>,
        monitor: Arc<Monitor>,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            dispatcher,
            alerter,
            monitor,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

fn dispatch_error_response(e: DispatchError) -> Response {
    let status = match e {
        DispatchError::UnknownJob(_) => StatusCode::NOT_FOUND,
        DispatchError::QueueClosed => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, e.to_string())
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn queue_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": state.dispatcher.status(),
        "metrics": state.dispatcher.queue_metrics(),
    }))
}

async fn error_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "errors": state.metrics.error_distribution(),
        "jobs": state.metrics.job_processing_stats(),
    }))
}

#[derive(Debug, Deserialize)]
struct AlertQuery {
    limit: Option<usize>,
}

async fn alert_status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AlertQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(DEFAULT_ALERT_LIMIT);
    Json(state.alerter.recent_alerts(limit))
}

async fn analysis_status(State(state): State<Arc<AppState>>) -> Response {
    match state.monitor.last_report().await {
        Some(report) => Json(report).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "No evaluation has run yet"),
    }
}

/// Body of `POST /jobs`
#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    #[serde(default = "default_job_type")]
    pub job_type: String,

    #[serde(default)]
    pub payload: serde_json::Value,

    #[serde(default = "default_priority")]
    pub priority: Priority,
}

fn default_job_type() -> String {
    "email".to_string()
}

fn default_priority() -> Priority {
    Priority::Medium
}

async fn enqueue_job(
    State(state): State<Arc<AppState>>,
    Json(request): Json<EnqueueRequest>,
) -> Response {
    match state
        .dispatcher
        .enqueue(request.job_type, request.payload, request.priority)
        .await
    {
        Ok(handle) => (StatusCode::ACCEPTED, Json(handle)).into_response(),
        Err(e) => dispatch_error_response(e),
    }
}

async fn retry_job(State(state): State<Arc<AppState>>, Path(id): Path<u64>) -> Response {
    match state.dispatcher.retry_failed(JobId(id)).await {
        Ok(handle) => (StatusCode::ACCEPTED, Json(handle)).into_response(),
        Err(e) => dispatch_error_response(e),
    }
}

async fn failed_jobs(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.dispatcher.failed_jobs())
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/status/queue", get(queue_status))
        .route("/status/errors", get(error_status))
        .route("/status/alerts", get(alert_status))
        .route("/status/analysis", get(analysis_status))
        .route("/jobs", post(enqueue_job))
        .route("/jobs/failed", get(failed_jobs))
        .route("/jobs/:id/retry", post(retry_job))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
