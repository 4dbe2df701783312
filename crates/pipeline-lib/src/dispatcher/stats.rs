//! Queue bookkeeping exposed through status snapshots

use crate::models::Priority;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};

/// Latencies kept per priority for processing statistics
const LATENCY_HISTORY: usize = 100;

/// Point-in-time queue occupancy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub waiting: usize,
    pub active: usize,
    pub completed: u64,
    pub failed: u64,
    pub delayed: usize,
}

/// Latency summary for one priority
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ProcessingStats {
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub samples: usize,
}

/// Per-priority processing statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueueMetrics {
    /// Keyed `priority_<PRIORITY>`
    pub processing: BTreeMap<String, ProcessingStats>,
    /// Keyed `priority_<PRIORITY>`
    pub completed: BTreeMap<String, u64>,
    /// Keyed `<PRIORITY>_<error type>`
    pub failed: BTreeMap<String, u64>,
    pub retries: u64,
    pub queue_errors: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsBook {
    latencies: [VecDeque<f64>; 4],
    completed: [u64; 4],
    failed: BTreeMap<(Priority, String), u64>,
    retries: u64,
    queue_errors: u64,
}

impl StatsBook {
    pub fn record_completion(&mut self, priority: Priority, latency_ms: f64) {
        let tier = priority.tier();
        self.completed[tier] += 1;

        let history = &mut self.latencies[tier];
        history.push_back(latency_ms);
        while history.len() > LATENCY_HISTORY {
            history.pop_front();
        }
    }

    pub fn record_failure(&mut self, priority: Priority, error_type: &str) {
        *self
            .failed
            .entry((priority, error_type.to_string()))
            .or_insert(0) += 1;
    }

    pub fn record_retry(&mut self) {
        self.retries += 1;
    }

    pub fn record_queue_error(&mut self) {
        self.queue_errors += 1;
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn snapshot(&self) -> QueueMetrics {
        let mut processing = BTreeMap::new();
        let mut completed = BTreeMap::new();

        for priority in Priority::ALL {
            let key = format!("priority_{}", priority);
            let history = &self.latencies[priority.tier()];
            if !history.is_empty() {
                let sum: f64 = history.iter().sum();
                processing.insert(
                    key.clone(),
                    ProcessingStats {
                        avg_ms: sum / history.len() as f64,
                        min_ms: history.iter().copied().fold(f64::INFINITY, f64::min),
                        max_ms: history.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                        samples: history.len(),
                    },
                );
            }
            completed.insert(key, self.completed[priority.tier()]);
        }

        let failed = self
            .failed
            .iter()
            .map(|((priority, error_type), count)| (format!("{}_{}", priority, error_type), *count))
            .collect();

        QueueMetrics {
            processing,
            completed,
            failed,
            retries: self.retries,
            queue_errors: self.queue_errors,
        }
    }
}
