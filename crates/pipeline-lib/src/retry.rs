//! Retry strategy for failed jobs
//!
//! Exponential backoff scaled by priority: higher tiers retry sooner. The
//! strategy holds no state, so every decision is a pure function of the
//! attempt index and priority.

use crate::models::Priority;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound on any computed delay (5 minutes)
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(300);

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BASE_DELAY_MS: u64 = 5000;

/// Retry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Retries permitted after the first failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry of a MEDIUM job
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
        }
    }
}

/// Outcome of a retry evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetryDecision {
    pub should_retry: bool,
    /// Delay before the next attempt; zero when giving up
    pub delay: Duration,
    pub attempts_used: u32,
    pub max_attempts: u32,
}

impl RetryDecision {
    pub fn delay_ms(&self) -> u64 {
        self.delay.as_millis() as u64
    }
}

/// Backoff multiplier applied per priority tier
pub fn priority_multiplier(priority: Priority) -> f64 {
    match priority {
        Priority::Urgent => 0.5,
        Priority::High => 0.75,
        Priority::Medium => 1.0,
        Priority::Low => 1.5,
    }
}

/// Computes retry decisions from explicit attempt counters
#[derive(Debug, Clone, Default)]
pub struct RetryStrategy {
    config: RetryConfig,
}

impl RetryStrategy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    /// Decide whether a job that just failed at `attempt` (0-based) retries
    pub fn decide(&self, attempt: u32, priority: Priority) -> RetryDecision {
        if attempt >= self.config.max_retries {
            return RetryDecision {
                should_retry: false,
                delay: Duration::ZERO,
                attempts_used: attempt,
                max_attempts: self.config.max_retries,
            };
        }

        RetryDecision {
            should_retry: true,
            delay: self.backoff(attempt, priority),
            attempts_used: attempt,
            max_attempts: self.config.max_retries,
        }
    }

    /// `min(base · 2^attempt · multiplier, 300s)`
    pub fn backoff(&self, attempt: u32, priority: Priority) -> Duration {
        let cap_ms = MAX_RETRY_DELAY.as_millis() as f64;
        // 2^1024 is already infinite in f64; the cap absorbs it
        let exponential = 2f64.powi(attempt.min(1024) as i32);
        let delay_ms =
            self.config.base_delay_ms as f64 * exponential * priority_multiplier(priority);

        Duration::from_millis(delay_ms.min(cap_ms).round() as u64)
    }
}
