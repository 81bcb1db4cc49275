//! Per-origin sliding-window admission control.
//!
//! Bounds how many propagation events a single origin node may emit, shielding
//! peers from noisy or compromised origins. Default: 5 events per 180 seconds.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Events allowed inside the window
    pub max_events: usize,
    /// Window length in seconds
    pub time_window_secs: i64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_events: 5,
            time_window_secs: 180,
        }
    }
}

/// Sliding-window counter, sharded per node id.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    /// node id -> timestamps of admitted emissions inside the window
    windows: DashMap<String, Vec<DateTime<Utc>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            windows: DashMap::new(),
        }
    }

    /// Purge expired timestamps, then admit if the origin is under quota.
    /// Admission appends `now` to the window.
    pub fn try_admit(&self, node_id: &str, now: DateTime<Utc>) -> bool {
        let window = Duration::seconds(self.config.time_window_secs);
        let mut entry = self.windows.entry(node_id.to_string()).or_default();

        entry.retain(|ts| now.signed_duration_since(*ts) < window);

        if entry.len() < self.config.max_events {
            entry.push(now);
            true
        } else {
            false
        }
    }

    /// Drop windows with no live timestamps (call periodically).
    pub fn cleanup(&self, now: DateTime<Utc>) {
        let window = Duration::seconds(self.config.time_window_secs);
        self.windows
            .retain(|_, stamps| stamps.iter().any(|ts| now.signed_duration_since(*ts) < window));
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimiterConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admits_up_to_limit() {
        let limiter = RateLimiter::default();
        let now = Utc::now();

        for _ in 0..5 {
            assert!(limiter.try_admit("node_a", now));
        }
        assert!(!limiter.try_admit("node_a", now));
    }

    #[test]
    fn test_window_slides() {
        let limiter = RateLimiter::default();
        let start = Utc::now();

        for _ in 0..5 {
            assert!(limiter.try_admit("node_a", start));
        }
        assert!(!limiter.try_admit("node_a", start));

        // Past the 180s window from the oldest admission
        let later = start + Duration::seconds(181);
        assert!(limiter.try_admit("node_a", later));
    }

    #[test]
    fn test_nodes_are_isolated() {
        let limiter = RateLimiter::default();
        let now = Utc::now();

        for _ in 0..5 {
            assert!(limiter.try_admit("node_a", now));
        }
        assert!(!limiter.try_admit("node_a", now));
        assert!(limiter.try_admit("node_b", now));
    }

    #[test]
    fn test_cleanup_drops_stale_windows() {
        let limiter = RateLimiter::default();
        let start = Utc::now();

        limiter.try_admit("node_a", start);
        limiter.cleanup(start + Duration::seconds(300));
        assert!(limiter.windows.is_empty());
    }
}
