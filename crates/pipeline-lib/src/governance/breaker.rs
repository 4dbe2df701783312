//! Circuit breaker
//!
//! [`evaluate`] is the stateless decision for one sample. [`CircuitBreaker`]
//! keeps the closed/open state between samples: it opens when the error rate
//! exceeds the trip threshold and closes only once the recovery time has
//! elapsed and a fresh sample is back at or under the threshold. Sampling on
//! a timer is the caller's job.

use crate::models::now_millis;
use crate::observability::{PipelineMetrics, StructuredLogger};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Error rate above which the breaker opens
pub const TRIP_ERROR_RATE: f64 = 0.5;

pub const MIN_RECOVERY: Duration = Duration::from_secs(30);
pub const MAX_RECOVERY: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakerState {
    Closed,
    Open,
}

impl BreakerState {
    pub fn as_str(self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
        }
    }
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One sample of the signals the breaker watches
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BreakerInputs {
    pub error_rate: f64,
    pub latency_ms: f64,
    pub timeout_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BreakerDecision {
    pub state: BreakerState,
    /// Traffic should be isolated from the failing path
    pub isolated: bool,
    pub recovery_time: Duration,
    /// The state differs from the previous observation
    pub transitioned: bool,
}

/// `30s + 270s · (0.7·errorRate + 0.2·latency/1000 + 0.1·timeoutRate)`,
/// clamped to [30s, 300s]
pub fn recovery_time(inputs: &BreakerInputs) -> Duration {
    let factor = 0.7 * inputs.error_rate
        + 0.2 * (inputs.latency_ms / 1000.0)
        + 0.1 * inputs.timeout_rate;

    let min = MIN_RECOVERY.as_secs_f64();
    let max = MAX_RECOVERY.as_secs_f64();
    let secs = min + (max - min) * factor;

    if !secs.is_finite() {
        return MAX_RECOVERY;
    }
    Duration::from_secs_f64(secs.clamp(min, max))
}

/// Stateless decision for a single sample
pub fn evaluate(inputs: &BreakerInputs) -> BreakerDecision {
    let state = if inputs.error_rate > TRIP_ERROR_RATE {
        BreakerState::Open
    } else {
        BreakerState::Closed
    };

    BreakerDecision {
        state,
        isolated: state == BreakerState::Open,
        recovery_time: recovery_time(inputs),
        transitioned: false,
    }
}

#[derive(Debug, Clone, Copy)]
enum Inner {
    Closed,
    Open {
        opened_at_ms: i64,
        recovery: Duration,
    },
}

/// Closed/open state machine fed by periodic samples
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    metrics: PipelineMetrics,
    logger: StructuredLogger,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::Closed),
            metrics: PipelineMetrics::new(),
            logger: StructuredLogger::new("circuit_breaker"),
        }
    }

    pub fn state(&self) -> BreakerState {
        match *self.inner.lock().unwrap_or_else(PoisonError::into_inner) {
            Inner::Closed => BreakerState::Closed,
            Inner::Open { .. } => BreakerState::Open,
        }
    }

    pub fn observe(&self, inputs: &BreakerInputs) -> BreakerDecision {
        self.observe_at(inputs, now_millis())
    }

    pub fn observe_at(&self, inputs: &BreakerInputs, now_ms: i64) -> BreakerDecision {
        let tripped = inputs.error_rate > TRIP_ERROR_RATE;
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        let (next, transitioned) = match *inner {
            Inner::Closed if tripped => (
                Inner::Open {
                    opened_at_ms: now_ms,
                    recovery: recovery_time(inputs),
                },
                true,
            ),
            Inner::Closed => (Inner::Closed, false),
            Inner::Open {
                opened_at_ms,
                recovery,
            } => {
                let elapsed = now_ms.saturating_sub(opened_at_ms).max(0) as u128;
                if elapsed < recovery.as_millis() {
                    (*inner, false)
                } else if tripped {
                    // Still failing after recovery; start a new recovery period
                    (
                        Inner::Open {
                            opened_at_ms: now_ms,
                            recovery: recovery_time(inputs),
                        },
                        false,
                    )
                } else {
                    (Inner::Closed, true)
                }
            }
        };
        *inner = next;
        drop(inner);

        let (state, recovery) = match next {
            Inner::Closed => (BreakerState::Closed, recovery_time(inputs)),
            Inner::Open { recovery, .. } => (BreakerState::Open, recovery),
        };

        self.metrics.set_circuit_open(state == BreakerState::Open);
        if transitioned {
            let from = match state {
                BreakerState::Open => BreakerState::Closed,
                BreakerState::Closed => BreakerState::Open,
            };
            self.metrics.inc_adaptation("circuit_breaker", state.as_str());
            self.logger.log_breaker_transition(
                from.as_str(),
                state.as_str(),
                inputs.error_rate,
                recovery.as_secs(),
            );
        }

        BreakerDecision {
            state,
            isolated: state == BreakerState::Open,
            recovery_time: recovery,
            transitioned,
        }
    }
}
