//! Sliding-window rate limiter keyed by `name@version`.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(60);

/// Per-key timestamp history, truncated to the window on every check.
#[derive(Debug, Default)]
pub struct RateLimiter {
    history: Mutex<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an attempt for `key` and report whether it fits within
    /// `max_per_minute` over the sliding window.
    pub fn allow(&self, key: &str, max_per_minute: u32) -> bool {
        let now = Instant::now();
        let window_start = now.checked_sub(WINDOW);
        let mut history = match self.history.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let timestamps = history.entry(key.to_string()).or_default();
        timestamps.retain(|ts| window_start.map_or(true, |start| *ts >= start));
        if timestamps.len() as u32 >= max_per_minute {
            return false;
        }
        timestamps.push(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_up_to_limit() {
        let limiter = RateLimiter::new();
        assert!(limiter.allow("send_email@1.0.0", 2));
        assert!(limiter.allow("send_email@1.0.0", 2));
        assert!(!limiter.allow("send_email@1.0.0", 2));
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = RateLimiter::new();
        assert!(limiter.allow("a@1.0.0", 1));
        assert!(!limiter.allow("a@1.0.0", 1));
        assert!(limiter.allow("b@1.0.0", 1));
    }

    #[test]
    fn test_denied_attempt_does_not_consume_budget() {
        let limiter = RateLimiter::new();
        assert!(limiter.allow("a@1.0.0", 1));
        for _ in 0..5 {
            assert!(!limiter.allow("a@1.0.0", 1));
        }
    }
}
