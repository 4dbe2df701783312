//! Job broker seam and the in-process implementation
//!
//! The broker owns waiting and delayed jobs. It applies no backoff of its
//! own: a delay passed to [`JobBroker::push`] is the only delay a job sees.

use crate::error::DispatchError;
use crate::models::{Job, Priority};
use async_trait::async_trait;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::warn;

/// Point-in-time broker occupancy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BrokerCounts {
    /// Ready jobs per priority, in service order
    pub waiting: [usize; 4],
    pub delayed: usize,
}

impl BrokerCounts {
    pub fn total_waiting(&self) -> usize {
        self.waiting.iter().sum()
    }

    pub fn waiting_for(&self, priority: Priority) -> usize {
        self.waiting[priority.tier()]
    }
}

/// Priority-ordered job storage
#[async_trait]
pub trait JobBroker: Send + Sync {
    /// Store a job, ready now or after `delay`
    async fn push(&self, job: Job, delay: Duration) -> Result<(), DispatchError>;

    /// Wait for the highest-priority ready job. Returns `None` once the
    /// broker is closed and drained. Cancel-safe.
    async fn pop(&self) -> Option<Job>;

    /// Take the highest-priority ready job without waiting
    fn try_pop(&self) -> Option<Job>;

    fn counts(&self) -> BrokerCounts;

    /// Refuse further pushes and wake every waiter. Delayed jobs not yet
    /// due are never served afterwards; they stay in `counts().delayed`.
    fn close(&self);
}

struct DelayedJob {
    due: Instant,
    seq: u64,
    job: Job,
}

impl PartialEq for DelayedJob {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for DelayedJob {}

impl PartialOrd for DelayedJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DelayedJob {
    // Reversed so the max-heap yields the earliest due job
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct Queues {
    tiers: [VecDeque<Job>; 4],
    delayed: BinaryHeap<DelayedJob>,
    seq: u64,
    closed: bool,
}

impl Queues {
    /// Move due delayed jobs onto their tier
    fn promote(&mut self, now: Instant) {
        while self.delayed.peek().map(|d| d.due <= now).unwrap_or(false) {
            if let Some(delayed) = self.delayed.pop() {
                self.tiers[delayed.job.priority.tier()].push_back(delayed.job);
            }
        }
    }

    fn pop_ready(&mut self) -> Option<Job> {
        self.tiers.iter_mut().find_map(VecDeque::pop_front)
    }

    fn next_due(&self) -> Option<Instant> {
        self.delayed.peek().map(|d| d.due)
    }
}

/// In-memory broker: four FIFO tiers plus a delay heap
#[derive(Default)]
pub struct MemoryBroker {
    queues: Mutex<Queues>,
    notify: Notify,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Queues> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl JobBroker for MemoryBroker {
    async fn push(&self, job: Job, delay: Duration) -> Result<(), DispatchError> {
        {
            let mut queues = self.lock();
            if queues.closed {
                return Err(DispatchError::QueueClosed);
            }
            if delay.is_zero() {
                queues.tiers[job.priority.tier()].push_back(job);
            } else {
                let seq = queues.seq;
                queues.seq += 1;
                queues.delayed.push(DelayedJob {
                    due: Instant::now() + delay,
                    seq,
                    job,
                });
            }
        }
        self.notify.notify_one();
        Ok(())
    }

    async fn pop(&self) -> Option<Job> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next_due = {
                let mut queues = self.lock();
                queues.promote(Instant::now());
                if let Some(job) = queues.pop_ready() {
                    return Some(job);
                }
                if queues.closed {
                    return None;
                }
                queues.next_due()
            };

            match next_due {
                Some(due) => {
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = tokio::time::sleep_until(due) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    fn try_pop(&self) -> Option<Job> {
        let mut queues = self.lock();
        queues.promote(Instant::now());
        queues.pop_ready()
    }

    fn counts(&self) -> BrokerCounts {
        let mut queues = self.lock();
        queues.promote(Instant::now());
        BrokerCounts {
            waiting: [
                queues.tiers[0].len(),
                queues.tiers[1].len(),
                queues.tiers[2].len(),
                queues.tiers[3].len(),
            ],
            delayed: queues.delayed.len(),
        }
    }

    fn close(&self) {
        let discarded = {
            let mut queues = self.lock();
            queues.closed = true;
            queues.delayed.len()
        };
        if discarded > 0 {
            warn!(
                event = "broker_closed",
                discarded_delayed = discarded,
                "Broker closed with delayed jobs pending"
            );
        }
        self.notify.notify_waiters();
    }
}
