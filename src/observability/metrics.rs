//! Runner counters
//!
//! Each [`TaskRunner`](crate::runner::TaskRunner) owns one
//! [`RunnerMetrics`]; there is no process-wide collector, so two runners
//! never share counts.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Lock-free counters for one runner
#[derive(Debug, Default)]
pub struct RunnerMetrics {
    tasks_received: AtomicU64,
    routed: AtomicU64,
    fallback: AtomicU64,
    approved: AtomicU64,
    rejected: AtomicU64,
    rate_limited: AtomicU64,
    executed: AtomicU64,
    last_run: AtomicU64,
}

/// Point-in-time copy of [`RunnerMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub tasks_received: u64,
    pub routed: u64,
    pub fallback: u64,
    pub approved: u64,
    pub rejected: u64,
    pub rate_limited: u64,
    pub executed: u64,
    /// Unix seconds of the most recent run, 0 if none
    pub last_run: u64,
}

impl RunnerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task_received(&self) {
        self.tasks_received.fetch_add(1, Ordering::Relaxed);
        self.last_run.store(current_timestamp(), Ordering::Relaxed);
    }

    pub fn routed(&self) {
        self.routed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fallback(&self) {
        self.fallback.fetch_add(1, Ordering::Relaxed);
    }

    pub fn approved(&self) {
        self.approved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn executed(&self) {
        self.executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tasks_received: self.tasks_received.load(Ordering::Relaxed),
            routed: self.routed.load(Ordering::Relaxed),
            fallback: self.fallback.load(Ordering::Relaxed),
            approved: self.approved.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            last_run: self.last_run.load(Ordering::Relaxed),
        }
    }
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
