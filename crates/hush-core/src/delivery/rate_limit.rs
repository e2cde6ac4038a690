//! Per-user limit on inference invocations.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

/// Fixed-window counter of inference invocations per user.
///
/// Only calls that actually reach the inference backend are counted. Cache
/// hits and heuristic resolutions are free.
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    windows: Mutex<HashMap<String, (Instant, u32)>>,
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Count one invocation for `user_id` if fewer than `max` were made in the
    /// current window. Returns false when the limit is reached.
    pub fn try_acquire(&self, user_id: &str, max: u32) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        let (start, count) = windows
            .entry(user_id.to_string())
            .or_insert((now, 0));

        if now.duration_since(*start) >= self.window {
            *start = now;
            *count = 0;
        }
        if *count >= max {
            return false;
        }
        *count += 1;
        true
    }

    /// Invocations counted in the user's current window.
    pub fn used(&self, user_id: &str) -> u32 {
        let windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        windows
            .get(user_id)
            .filter(|(start, _)| start.elapsed() < self.window)
            .map_or(0, |(_, count)| *count)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Duration::from_secs(3600))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_window_resets() {
        let limiter = RateLimiter::new(Duration::from_secs(3600));
        assert!(limiter.try_acquire("alice", 2));
        assert!(limiter.try_acquire("alice", 2));
        assert!(!limiter.try_acquire("alice", 2));
        assert!(limiter.try_acquire("bob", 2));
        assert_eq!(limiter.used("alice"), 2);

        tokio::time::advance(Duration::from_secs(3600)).await;
        assert_eq!(limiter.used("alice"), 0);
        assert!(limiter.try_acquire("alice", 2));
    }

    #[tokio::test]
    async fn test_zero_limit_never_acquires() {
        let limiter = RateLimiter::default();
        assert!(!limiter.try_acquire("alice", 0));
    }
}
