//! Per-key sliding-window rate limiter

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Allows at most `max_requests` per `window` for each caller key.
///
/// The check and the record happen under one lock, so two concurrent
/// callers can never both take the last slot.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    window: Duration,
    max_requests: usize,
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl SlidingWindowLimiter {
    pub fn new(window: Duration, max_requests: usize) -> Self {
        Self {
            window,
            max_requests,
            hits: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    /// Record a request for `key` if it is under the limit; `false` means rejected
    pub fn try_acquire(&self, key: &str) -> bool {
        self.try_acquire_at(key, Instant::now())
    }

    pub fn try_acquire_at(&self, key: &str, now: Instant) -> bool {
        let mut hits = self.hits.lock().unwrap_or_else(PoisonError::into_inner);

        // Drop keys whose whole window has passed
        hits.retain(|_, stamps| {
            stamps
                .back()
                .map_or(false, |last| now.saturating_duration_since(*last) < self.window)
        });

        let stamps = hits.entry(key.to_string()).or_default();
        while let Some(oldest) = stamps.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                stamps.pop_front();
            } else {
                break;
            }
        }

        if stamps.len() >= self.max_requests {
            return false;
        }
        stamps.push_back(now);
        true
    }

    /// Requests currently counted against `key`
    pub fn in_window(&self, key: &str) -> usize {
        let now = Instant::now();
        let hits = self.hits.lock().unwrap_or_else(PoisonError::into_inner);
        hits.get(key).map_or(0, |stamps| {
            stamps
                .iter()
                .filter(|stamp| now.saturating_duration_since(**stamp) < self.window)
                .count()
        })
    }
}
