//! Library for the priority job pipeline
//!
//! This crate provides:
//! - A four-tier priority dispatcher with stall detection
//! - Priority-scaled exponential retry
//! - A windowed, sharded metric store
//! - Statistical analysis of metric windows
//! - Threshold alerting and adaptive governance
//! - Health checks and observability

pub mod alerting;
pub mod analysis;
pub mod dispatcher;
pub mod error;
pub mod governance;
pub mod health;
pub mod models;
pub mod monitor;
pub mod observability;
pub mod retry;
pub mod store;

pub use dispatcher::{
    Ack, Dispatcher, DispatcherConfig, JobBroker, JobHandle, JobOutcome, MemoryBroker,
    PayloadProcessor, QueueStatus,
};
pub use error::{DispatchError, ProcessError, ThresholdOrderError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use monitor::{Monitor, MonitorConfig, MonitorReport};
pub use observability::{PipelineMetrics, StructuredLogger};
pub use retry::{RetryConfig, RetryDecision, RetryStrategy};
pub use store::{MetricStore, StoreConfig};
