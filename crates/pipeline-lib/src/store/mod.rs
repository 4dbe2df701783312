//! Metric sample store
//!
//! Holds, per series key, a bounded and time-windowed list of samples along
//! with pattern occurrences and component activity. Every map is sharded by
//! key, so writers to unrelated series never contend, and readers copy a
//! series under its shard lock so they never observe a half-pruned list.
//!
//! Pruning happens on the write path: the written series is trimmed from the
//! front, and a full sweep (shard by shard) runs at most once per sweep
//! interval to drop keys that stopped receiving writes.

mod timeline;

use crate::models::{now_millis, MetricSample};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use timeline::Timeline;
use tracing::debug;

/// Series keys written by the dispatcher and read by the monitor
pub mod keys {
    pub const JOBS_ADDED: &str = "jobs.added";
    pub const JOBS_COMPLETED: &str = "jobs.completed";
    pub const JOBS_FAILED: &str = "jobs.failed";
    pub const JOBS_RETRIED: &str = "jobs.retried";
    pub const JOBS_RETRY_EXHAUSTED: &str = "jobs.retry_exhausted";
    pub const JOBS_STALLED: &str = "jobs.stalled";
    pub const JOB_LATENCY_MS: &str = "jobs.latency_ms";
    pub const QUEUE_DEPTH: &str = "queue.depth";
    pub const RESOURCE_USAGE: &str = "system.resource_usage";
}

/// Default retention window (1 hour)
const DEFAULT_WINDOW_SECS: u64 = 60 * 60;

/// Default per-key sample cap
const DEFAULT_MAX_SAMPLES: usize = 1000;

/// Default interval between full sweeps
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    #[serde(default = "default_max_samples")]
    pub max_samples: usize,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_window_secs() -> u64 {
    DEFAULT_WINDOW_SECS
}

fn default_max_samples() -> usize {
    DEFAULT_MAX_SAMPLES
}

fn default_sweep_interval_secs() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            window_secs: DEFAULT_WINDOW_SECS,
            max_samples: DEFAULT_MAX_SAMPLES,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

/// Status recorded for a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentActivity {
    Active,
    Idle,
    Failed,
}

/// One recorded component state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentState {
    pub timestamp_ms: i64,
    pub status: ComponentActivity,
    pub pattern: Option<String>,
}

#[derive(Debug, Clone)]
struct StateEntry {
    status: ComponentActivity,
    pattern: Option<String>,
}

/// Sharded, windowed metric history
pub struct MetricStore {
    config: StoreConfig,
    samples: DashMap<String, Timeline<f64>>,
    patterns: DashMap<String, Timeline<()>>,
    components: DashMap<String, Timeline<StateEntry>>,
    last_sweep_ms: AtomicI64,
}

impl Default for MetricStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl MetricStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            samples: DashMap::new(),
            patterns: DashMap::new(),
            components: DashMap::new(),
            last_sweep_ms: AtomicI64::new(0),
        }
    }

    pub fn window_duration(&self) -> Duration {
        Duration::from_secs(self.config.window_secs)
    }

    fn window_ms(&self) -> i64 {
        (self.config.window_secs as i64).saturating_mul(1000)
    }

    fn cutoff(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.window_ms())
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    pub fn record_sample(&self, key: &str, value: f64) {
        self.record_sample_at(key, value, now_millis());
    }

    /// Append a sample; non-finite values are dropped
    pub fn record_sample_at(&self, key: &str, value: f64, timestamp_ms: i64) {
        if !value.is_finite() {
            debug!(key = %key, value, "Dropping non-finite sample");
            return;
        }

        let cutoff = self.cutoff(timestamp_ms);
        {
            let mut series = self
                .samples
                .entry(key.to_string())
                .or_insert_with(|| Timeline::new(self.config.max_samples));
            series.push(timestamp_ms, value);
            series.expire(cutoff);
        }

        self.maybe_sweep(timestamp_ms);
    }

    pub fn record_pattern_occurrence(&self, pattern: &str) {
        self.record_pattern_occurrence_at(pattern, now_millis());
    }

    pub fn record_pattern_occurrence_at(&self, pattern: &str, timestamp_ms: i64) {
        let cutoff = self.cutoff(timestamp_ms);
        {
            let mut occurrences = self
                .patterns
                .entry(pattern.to_string())
                .or_insert_with(|| Timeline::new(self.config.max_samples));
            occurrences.push(timestamp_ms, ());
            occurrences.expire(cutoff);
        }

        self.maybe_sweep(timestamp_ms);
    }

    pub fn record_component_state(
        &self,
        component: &str,
        status: ComponentActivity,
        pattern: Option<&str>,
    ) {
        self.record_component_state_at(component, status, pattern, now_millis());
    }

    pub fn record_component_state_at(
        &self,
        component: &str,
        status: ComponentActivity,
        pattern: Option<&str>,
        timestamp_ms: i64,
    ) {
        let cutoff = self.cutoff(timestamp_ms);
        {
            let mut states = self
                .components
                .entry(component.to_string())
                .or_insert_with(|| Timeline::new(self.config.max_samples));
            states.push(
                timestamp_ms,
                StateEntry {
                    status,
                    pattern: pattern.map(str::to_string),
                },
            );
            states.expire(cutoff);
        }

        self.maybe_sweep(timestamp_ms);
    }

    /// Record a pattern occurrence and mark `component` active for it
    pub fn record_pattern(&self, pattern: &str, component: &str) {
        let now = now_millis();
        self.record_pattern_occurrence_at(pattern, now);
        self.record_component_state_at(component, ComponentActivity::Active, Some(pattern), now);
    }

    fn maybe_sweep(&self, now_ms: i64) {
        let interval_ms = (self.config.sweep_interval_secs as i64).saturating_mul(1000);
        let last = self.last_sweep_ms.load(Ordering::Relaxed);
        if now_ms.saturating_sub(last) < interval_ms {
            return;
        }
        // Only one writer performs a given sweep
        if self
            .last_sweep_ms
            .compare_exchange(last, now_ms, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return;
        }
        self.sweep(now_ms);
    }

    /// Expire every series and drop keys that become empty
    pub fn sweep(&self, now_ms: i64) {
        let cutoff = self.cutoff(now_ms);

        self.samples.retain(|_, series| {
            series.expire(cutoff);
            !series.is_empty()
        });
        self.patterns.retain(|_, occurrences| {
            occurrences.expire(cutoff);
            !occurrences.is_empty()
        });
        self.components.retain(|_, states| {
            states.expire(cutoff);
            !states.is_empty()
        });
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Values within the window, oldest first
    pub fn window(&self, key: &str) -> Vec<f64> {
        self.window_at(key, now_millis())
    }

    pub fn window_at(&self, key: &str, now_ms: i64) -> Vec<f64> {
        let cutoff = self.cutoff(now_ms);
        self.samples
            .get(key)
            .map(|series| series.since(cutoff).map(|(_, v)| *v).collect())
            .unwrap_or_default()
    }

    /// Timestamped samples within the window, oldest first
    pub fn samples_at(&self, key: &str, now_ms: i64) -> Vec<MetricSample> {
        let cutoff = self.cutoff(now_ms);
        self.samples
            .get(key)
            .map(|series| {
                series
                    .since(cutoff)
                    .map(|(ts, v)| MetricSample {
                        key: key.to_string(),
                        timestamp_ms: *ts,
                        value: *v,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Most recent value of a series, if still in the window
    pub fn latest_at(&self, key: &str, now_ms: i64) -> Option<f64> {
        let cutoff = self.cutoff(now_ms);
        self.samples
            .get(key)
            .and_then(|series| series.last().filter(|(ts, _)| *ts > cutoff).map(|(_, v)| *v))
    }

    pub fn latest(&self, key: &str) -> Option<f64> {
        self.latest_at(key, now_millis())
    }

    /// Number of in-window samples for a key
    pub fn count_at(&self, key: &str, now_ms: i64) -> usize {
        let cutoff = self.cutoff(now_ms);
        self.samples
            .get(key)
            .map(|series| series.since(cutoff).count())
            .unwrap_or(0)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.samples.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn pattern_count(&self, pattern: &str) -> usize {
        self.pattern_count_at(pattern, now_millis())
    }

    pub fn pattern_count_at(&self, pattern: &str, now_ms: i64) -> usize {
        self.pattern_occurrences_at(pattern, now_ms).len()
    }

    fn pattern_occurrences_at(&self, pattern: &str, now_ms: i64) -> Vec<i64> {
        let cutoff = self.cutoff(now_ms);
        self.patterns
            .get(pattern)
            .map(|occ| occ.since(cutoff).map(|(ts, _)| *ts).collect())
            .unwrap_or_default()
    }

    /// Span between the first and last in-window occurrence
    pub fn pattern_duration_at(&self, pattern: &str, now_ms: i64) -> Duration {
        let occurrences = self.pattern_occurrences_at(pattern, now_ms);
        match (occurrences.first(), occurrences.last()) {
            (Some(first), Some(last)) => Duration::from_millis((last - first).max(0) as u64),
            _ => Duration::ZERO,
        }
    }

    /// In-window occurrences per hour
    pub fn pattern_frequency_at(&self, pattern: &str, now_ms: i64) -> f64 {
        let hours = self.config.window_secs as f64 / 3600.0;
        if hours <= 0.0 {
            return 0.0;
        }
        self.pattern_count_at(pattern, now_ms) as f64 / hours
    }

    /// Components whose latest state at `timestamp_ms` is active
    pub fn components_at(&self, timestamp_ms: i64) -> Vec<String> {
        let mut active: Vec<String> = self
            .components
            .iter()
            .filter(|entry| {
                entry
                    .value()
                    .at_or_before(timestamp_ms)
                    .map(|(_, state)| state.status == ComponentActivity::Active)
                    .unwrap_or(false)
            })
            .map(|entry| entry.key().clone())
            .collect();
        active.sort();
        active
    }

    /// Components active at any in-window occurrence of `pattern`
    pub fn affected_components_at(&self, pattern: &str, now_ms: i64) -> Vec<String> {
        let occurrences = self.pattern_occurrences_at(pattern, now_ms);
        if occurrences.is_empty() {
            return Vec::new();
        }

        let mut affected = BTreeSet::new();
        for entry in self.components.iter() {
            let states = entry.value();
            let hit = occurrences.iter().any(|ts| {
                states
                    .at_or_before(*ts)
                    .map(|(_, state)| state.status == ComponentActivity::Active)
                    .unwrap_or(false)
            });
            if hit {
                affected.insert(entry.key().clone());
            }
        }
        affected.into_iter().collect()
    }

    pub fn affected_components(&self, pattern: &str) -> Vec<String> {
        self.affected_components_at(pattern, now_millis())
    }

    pub fn total_components(&self) -> usize {
        self.components.len()
    }

    /// Recorded states of a component within the window
    pub fn component_states_at(&self, component: &str, now_ms: i64) -> Vec<ComponentState> {
        let cutoff = self.cutoff(now_ms);
        self.components
            .get(component)
            .map(|states| {
                states
                    .since(cutoff)
                    .map(|(ts, entry)| ComponentState {
                        timestamp_ms: *ts,
                        status: entry.status,
                        pattern: entry.pattern.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}
