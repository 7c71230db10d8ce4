//! Replay filter: rejects duplicate and stale messages.
//!
//! Keeps `hash -> first-accepted timestamp` for every message accepted within
//! a sliding window of `W` milliseconds around the local clock.

use fedchain_types::{Hash, Timestamp};
use std::collections::HashMap;

/// Default replay window: one hour.
pub const DEFAULT_REPLAY_WINDOW_SECS: u64 = 3600;

pub struct ReplayFilter {
    window_millis: u64,
    seen: HashMap<Hash, Timestamp>,
}

impl ReplayFilter {
    pub fn new(window_secs: u64) -> Self {
        Self {
            window_millis: window_secs.saturating_mul(1000),
            seen: HashMap::new(),
        }
    }

    /// Accept and record `hash` iff it has not been accepted within the
    /// current window and `timestamp` lies in `[now - W, now + W]`.
    ///
    /// A rejection never mutates the filter. An entry older than the window
    /// is treated as unseen.
    pub fn observe(&mut self, hash: Hash, timestamp: Timestamp, now: Timestamp) -> bool {
        if timestamp.abs_diff(now) > self.window_millis {
            return false;
        }
        if let Some(first) = self.seen.get(&hash) {
            if first.elapsed_since(now) <= self.window_millis {
                return false;
            }
        }
        self.seen.insert(hash, timestamp);
        true
    }

    /// Whether `hash` is currently recorded inside the window.
    pub fn contains(&self, hash: &Hash, now: Timestamp) -> bool {
        self.seen
            .get(hash)
            .is_some_and(|first| first.elapsed_since(now) <= self.window_millis)
    }

    /// Drop entries that have aged out of the window. Returns how many were removed.
    pub fn prune(&mut self, now: Timestamp) -> usize {
        let before = self.seen.len();
        let window = self.window_millis;
        self.seen.retain(|_, first| first.elapsed_since(now) <= window);
        before - self.seen.len()
    }

    pub fn window_millis(&self) -> u64 {
        self.window_millis
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Default for ReplayFilter {
    fn default() -> Self {
        Self::new(DEFAULT_REPLAY_WINDOW_SECS)
    }
}
