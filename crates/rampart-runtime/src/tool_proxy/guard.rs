//! Per-session rate limiting and loop detection.
//!
//! Both guards keep their state in a `DashMap`; the entry lock makes
//! each check-then-increment atomic with respect to concurrent calls
//! on the same key.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Length of the sliding rate window
pub const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Sliding-window limiter keyed by session.
pub struct RateLimiter {
    windows: DashMap<String, VecDeque<Instant>>,
    max_calls_per_window: usize,
}

impl RateLimiter {
    pub fn new(max_calls_per_window: usize) -> Self {
        Self {
            windows: DashMap::new(),
            max_calls_per_window,
        }
    }

    pub fn limit(&self) -> usize {
        self.max_calls_per_window
    }

    /// Record a call for `session_id` if the window has room.
    pub fn check(&self, session_id: &str) -> bool {
        self.check_at(session_id, Instant::now())
    }

    pub(crate) fn check_at(&self, session_id: &str, now: Instant) -> bool {
        let mut window = self.windows.entry(session_id.to_string()).or_default();

        if let Some(cutoff) = now.checked_sub(RATE_WINDOW) {
            while window.front().is_some_and(|t| *t < cutoff) {
                window.pop_front();
            }
        }

        if window.len() >= self.max_calls_per_window {
            return false;
        }
        window.push_back(now);
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LoopKey {
    session_id: String,
    tool_name: String,
    args_fingerprint: String,
}

/// Counts identical (session, tool, args) calls.
pub struct LoopDetector {
    counts: DashMap<LoopKey, u32>,
    threshold: u32,
}

impl LoopDetector {
    pub fn new(threshold: u32) -> Self {
        Self {
            counts: DashMap::new(),
            threshold,
        }
    }

    /// Increment the counter for this call.
    /// Returns `Err(count)` once the count exceeds the threshold.
    pub fn check(&self, session_id: &str, tool_name: &str, args_fingerprint: &str) -> Result<u32, u32> {
        let key = LoopKey {
            session_id: session_id.to_string(),
            tool_name: tool_name.to_string(),
            args_fingerprint: args_fingerprint.to_string(),
        };
        let mut count = self.counts.entry(key).or_insert(0);
        *count += 1;
        if *count > self.threshold {
            Err(*count)
        } else {
            Ok(*count)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_rate_limit_window_slides() {
        let limiter = RateLimiter::new(3);
        let t0 = Instant::now();
        for _ in 0..3 {
            assert!(limiter.check_at("s1", t0));
        }
        assert!(!limiter.check_at("s1", t0));
        assert!(!limiter.check_at("s1", t0 + Duration::from_secs(30)));
        assert!(limiter.check_at("s1", t0 + Duration::from_secs(61)));
    }

    #[test]
    fn test_rate_limit_is_per_session() {
        let limiter = RateLimiter::new(1);
        assert!(limiter.check("a"));
        assert!(!limiter.check("a"));
        assert!(limiter.check("b"));
    }

    #[test]
    fn test_rate_limit_zero_rejects_everything() {
        let limiter = RateLimiter::new(0);
        assert!(!limiter.check("a"));
    }

    #[test]
    fn test_concurrent_rate_checks_respect_limit() {
        let limiter = Arc::new(RateLimiter::new(50));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || (0..20).filter(|_| limiter.check("shared")).count())
            })
            .collect();
        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 50);
    }

    #[test]
    fn test_loop_detector_threshold() {
        let detector = LoopDetector::new(3);
        assert_eq!(detector.check("s", "calculate", "abc"), Ok(1));
        assert_eq!(detector.check("s", "calculate", "abc"), Ok(2));
        assert_eq!(detector.check("s", "calculate", "abc"), Ok(3));
        assert_eq!(detector.check("s", "calculate", "abc"), Err(4));
        // Different args or session are tracked separately
        assert_eq!(detector.check("s", "calculate", "def"), Ok(1));
        assert_eq!(detector.check("other", "calculate", "abc"), Ok(1));
    }
}
