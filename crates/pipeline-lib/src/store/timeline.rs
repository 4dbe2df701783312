//! Bounded, time-ordered entry list used by every store series

use std::collections::VecDeque;

/// Time-ordered entries capped by count; expiry is applied from the front
#[derive(Debug, Clone)]
pub(crate) struct Timeline<T> {
    entries: VecDeque<(i64, T)>,
    max_len: usize,
}

impl<T: Clone> Timeline<T> {
    pub fn new(max_len: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_len.min(64)),
            max_len: max_len.max(1),
        }
    }

    /// Append an entry. A timestamp older than the newest entry is clamped
    /// forward so the list stays ordered under racing writers.
    pub fn push(&mut self, timestamp_ms: i64, value: T) {
        let timestamp_ms = match self.entries.back() {
            Some((last, _)) => timestamp_ms.max(*last),
            None => timestamp_ms,
        };
        self.entries.push_back((timestamp_ms, value));

        while self.entries.len() > self.max_len {
            self.entries.pop_front();
        }
    }

    /// Drop entries at or before `cutoff_ms`
    pub fn expire(&mut self, cutoff_ms: i64) {
        while let Some((ts, _)) = self.entries.front() {
            if *ts <= cutoff_ms {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    /// Entries strictly newer than `cutoff_ms`, oldest first
    pub fn since(&self, cutoff_ms: i64) -> impl Iterator<Item = &(i64, T)> {
        let start = self.entries.partition_point(|(ts, _)| *ts <= cutoff_ms);
        self.entries.range(start..)
    }

    /// Latest entry at or before `timestamp_ms`
    pub fn at_or_before(&self, timestamp_ms: i64) -> Option<&(i64, T)> {
        let end = self.entries.partition_point(|(ts, _)| *ts <= timestamp_ms);
        if end == 0 {
            None
        } else {
            self.entries.get(end - 1)
        }
    }

    pub fn last(&self) -> Option<&(i64, T)> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
