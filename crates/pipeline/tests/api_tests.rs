//! Integration tests for the pipeline API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use pipeline::api::{create_router, AppState};
use pipeline::processor::DryRunProcessor;
use pipeline_lib::{
    alerting::Alerter,
    health::{components, HealthRegistry},
    observability::PipelineMetrics,
    Dispatcher, DispatcherConfig, MetricStore, Monitor, MonitorConfig, RetryStrategy,
};
use std::sync::Arc;
use tokio_test::assert_ok;
use tower::ServiceExt;

async fn setup_test_app() -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::new();
    health_registry.register(components::DISPATCHER).await;
    health_registry.register(components::MONITOR).await;

    let dispatcher = Arc::new(Dispatcher::in_memory(
        DispatcherConfig::default(),
        RetryStrategy::default(),
        Arc::new(MetricStore::default()),
    ));
    let alerter = Arc::new(Alerter::default());
    let monitor = Arc::new(Monitor::new(
        MonitorConfig::default(),
        dispatcher.clone(),
        alerter.clone(),
        health_registry.clone(),
    ));

    let state = Arc::new(AppState::new(
        health_registry,
        PipelineMetrics::new(),
        dispatcher,
        alerter,
        monitor,
    ));
    let router = create_router(state.clone());

    (router, state)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = assert_ok!(axum::body::to_bytes(response.into_body(), usize::MAX).await);
    assert_ok!(serde_json::from_slice(&body))
}

async fn text_body(response: axum::response::Response) -> String {
    let body = assert_ok!(axum::body::to_bytes(response.into_body(), usize::MAX).await);
    String::from_utf8(body.to_vec()).unwrap()
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _state) = setup_test_app().await;

    let response = app.oneshot(get("/healthz")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let health = json_body(response).await;
    assert_eq!(health["status"], "healthy");
}

#[tokio::test]
async fn test_healthz_returns_ok_when_degraded() {
    let (app, state) = setup_test_app().await;
    state
        .health_registry
        .set_degraded(components::DISPATCHER, "Error rate 0.06")
        .await;

    let response = app.oneshot(get("/healthz")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let health = json_body(response).await;
    assert_eq!(health["status"], "degraded");
    assert_eq!(
        health["components"]["dispatcher"]["message"],
        "Error rate 0.06"
    );
}

#[tokio::test]
async fn test_healthz_returns_503_when_unhealthy() {
    let (app, state) = setup_test_app().await;
    state
        .health_registry
        .set_unhealthy(components::DISPATCHER, "Circuit breaker open")
        .await;

    let response = app.oneshot(get("/healthz")).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_readyz_returns_503_when_not_ready() {
    let (app, _state) = setup_test_app().await;

    let response = app.oneshot(get("/readyz")).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let readiness = json_body(response).await;
    assert_eq!(readiness["ready"], false);
    assert_eq!(readiness["reason"], "Pipeline not yet started");
}

#[tokio::test]
async fn test_readyz_returns_ok_when_ready() {
    let (app, state) = setup_test_app().await;
    state.health_registry.set_ready(true).await;

    let response = app.oneshot(get("/readyz")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let readiness = json_body(response).await;
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_readyz_returns_503_when_ready_but_unhealthy() {
    let (app, state) = setup_test_app().await;
    state.health_registry.set_ready(true).await;
    state
        .health_registry
        .set_unhealthy(components::MONITOR, "Evaluation failed")
        .await;

    let response = app.oneshot(get("/readyz")).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_enqueue_accepts_job() {
    let (app, state) = setup_test_app().await;

    let response = app
        .oneshot(post_json(
            "/jobs",
            serde_json::json!({"payload": {"to": "ops@example.com"}, "priority": "URGENT"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let handle = json_body(response).await;
    assert_eq!(handle["priority"], "URGENT");
    assert!(handle["id"].as_u64().is_some());

    assert_eq!(state.dispatcher.status().waiting, 1);
    let job = state.dispatcher.broker().try_pop().unwrap();
    assert_eq!(job.job_type, "email");
    assert_eq!(job.payload["to"], "ops@example.com");
}

#[tokio::test]
async fn test_enqueue_rejects_unknown_priority() {
    let (app, _state) = setup_test_app().await;

    let response = app
        .oneshot(post_json("/jobs", serde_json::json!({"priority": "EXTREME"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_queue_status_reports_counts() {
    let (app, state) = setup_test_app().await;
    state
        .dispatcher
        .enqueue("email", serde_json::Value::Null, pipeline_lib::Priority::Low)
        .await
        .unwrap();
    state
        .dispatcher
        .enqueue("email", serde_json::Value::Null, pipeline_lib::Priority::High)
        .await
        .unwrap();

    let job = state.dispatcher.broker().try_pop().unwrap();
    state
        .dispatcher
        .process_job(job, Arc::new(DryRunProcessor))
        .await;

    let response = app.oneshot(get("/status/queue")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"]["waiting"], 1);
    assert_eq!(body["status"]["completed"], 1);
    assert_eq!(body["metrics"]["completed"]["priority_HIGH"], 1);
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let (app, state) = setup_test_app().await;
    state
        .dispatcher
        .enqueue("email", serde_json::Value::Null, pipeline_lib::Priority::Medium)
        .await
        .unwrap();
    let job = state.dispatcher.broker().try_pop().unwrap();
    state
        .dispatcher
        .process_job(job, Arc::new(DryRunProcessor))
        .await;

    let response = app.oneshot(get("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.contains("text/plain"));

    let text = text_body(response).await;
    assert!(text.contains("email_jobs_added"));
    assert!(text.contains("job_processing_total"));
    assert!(text.contains("email_job_processing_seconds_bucket"));
    assert!(text.contains("component_health"));
}

#[tokio::test]
async fn test_error_status_lists_distribution() {
    let (app, _state) = setup_test_app().await;

    let response = app.oneshot(get("/status/errors")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert!(body["errors"].is_array());
    assert!(body["jobs"].is_array());
}

#[tokio::test]
async fn test_alert_status_starts_empty() {
    let (app, _state) = setup_test_app().await;

    let response = app.oneshot(get("/status/alerts?limit=5")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body, serde_json::json!([]));
}

#[tokio::test]
async fn test_analysis_status_after_evaluation() {
    let (app, state) = setup_test_app().await;

    let response = app.clone().oneshot(get("/status/analysis")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    state.monitor.evaluate().await;

    let response = app.oneshot(get("/status/analysis")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let report = json_body(response).await;
    assert_eq!(report["breaker"]["state"], "closed");
    assert!(report["patterns"]["patterns"].is_array());
}

#[tokio::test]
async fn test_retry_unknown_job_is_not_found() {
    let (app, _state) = setup_test_app().await;

    let response = app
        .oneshot(post_json("/jobs/999/retry", serde_json::json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["error"], "job 999 not found");
}
