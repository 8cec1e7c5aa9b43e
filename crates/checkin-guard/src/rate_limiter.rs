//! Per-identity sliding-window attempt limiter.

use dashmap::DashMap;
use serde::Deserialize;
use std::sync::Arc;

use crate::clock::{Millis, TimeSource};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Attempts allowed inside one window.
    pub max_attempts: usize,
    pub window_ms: Millis,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            window_ms: 60_000,
        }
    }
}

/// Sliding-window limiter keyed by identity.
///
/// Each identity's timestamps are ascending and pruned to the window on every
/// check. The check-and-record step runs under the identity's map entry, so
/// concurrent attempts for one identity are serialized while different
/// identities proceed independently.
pub struct RateLimiter {
    attempts: DashMap<String, Vec<Millis>>,
    config: RateLimitConfig,
    clock: Arc<dyn TimeSource>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, clock: Arc<dyn TimeSource>) -> Self {
        Self {
            attempts: DashMap::new(),
            config,
            clock,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Record an attempt if the identity is under its limit.
    ///
    /// Prunes the stored window even when rejecting.
    pub fn is_allowed(&self, identity: &str) -> bool {
        let now = self.clock.now_ms();
        let window = self.config.window_ms;

        let mut entry = self.attempts.entry(identity.to_owned()).or_default();
        entry.retain(|&t| now.saturating_sub(t) < window);

        if entry.len() >= self.config.max_attempts {
            tracing::debug!(identity, attempts = entry.len(), "rate limit reached");
            let empty = entry.is_empty();
            drop(entry);
            if empty {
                self.attempts.remove(identity);
            }
            return false;
        }

        entry.push(now);
        true
    }

    /// Attempts left in the current window. Does not mutate state.
    pub fn remaining(&self, identity: &str) -> usize {
        let now = self.clock.now_ms();
        let window = self.config.window_ms;
        let used = self
            .attempts
            .get(identity)
            .map(|ts| ts.iter().filter(|&&t| now.saturating_sub(t) < window).count())
            .unwrap_or(0);
        self.config.max_attempts.saturating_sub(used)
    }

    /// Forget all attempts for the identity.
    pub fn reset(&self, identity: &str) {
        self.attempts.remove(identity);
    }

    /// Drop identities with no attempt left inside the window.
    pub fn sweep(&self) {
        let now = self.clock.now_ms();
        let window = self.config.window_ms;
        self.attempts.retain(|_, ts| {
            ts.retain(|&t| now.saturating_sub(t) < window);
            !ts.is_empty()
        });
    }

    /// Number of identities currently tracked.
    pub fn tracked(&self) -> usize {
        self.attempts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualTimeSource;

    fn limiter() -> (RateLimiter, Arc<ManualTimeSource>) {
        let clock = Arc::new(ManualTimeSource::new(1_000_000));
        (RateLimiter::new(RateLimitConfig::default(), clock.clone()), clock)
    }

    #[test]
    fn test_sixth_allowed_seventh_rejected() {
        let (limiter, clock) = limiter();
        for _ in 0..6 {
            assert!(limiter.is_allowed("u1"));
            clock.advance(1_000);
        }
        assert!(!limiter.is_allowed("u1"));
        assert_eq!(limiter.remaining("u1"), 0);
    }

    #[test]
    fn test_window_slides() {
        let (limiter, clock) = limiter();
        for _ in 0..6 {
            assert!(limiter.is_allowed("u1"));
        }
        assert!(!limiter.is_allowed("u1"));
        clock.advance(60_000);
        assert!(limiter.is_allowed("u1"));
        assert_eq!(limiter.remaining("u1"), 5);
    }

    #[test]
    fn test_identities_independent() {
        let (limiter, _clock) = limiter();
        for _ in 0..6 {
            assert!(limiter.is_allowed("u1"));
        }
        assert!(!limiter.is_allowed("u1"));
        assert!(limiter.is_allowed("u2"));
    }

    #[test]
    fn test_remaining_does_not_record() {
        let (limiter, _clock) = limiter();
        assert_eq!(limiter.remaining("u1"), 6);
        assert_eq!(limiter.remaining("u1"), 6);
        assert_eq!(limiter.tracked(), 0);
        limiter.is_allowed("u1");
        assert_eq!(limiter.remaining("u1"), 5);
    }

    #[test]
    fn test_reset_clears_identity() {
        let (limiter, _clock) = limiter();
        for _ in 0..6 {
            limiter.is_allowed("u1");
        }
        limiter.reset("u1");
        assert_eq!(limiter.remaining("u1"), 6);
        assert!(limiter.is_allowed("u1"));
    }

    #[test]
    fn test_sweep_reclaims_expired() {
        let (limiter, clock) = limiter();
        limiter.is_allowed("u1");
        limiter.is_allowed("u2");
        clock.advance(30_000);
        limiter.is_allowed("u2");
        clock.advance(30_000);
        limiter.sweep();
        assert_eq!(limiter.tracked(), 1);
        assert_eq!(limiter.remaining("u2"), 5);
    }

    #[test]
    fn test_zero_limit_leaves_no_state() {
        let clock = Arc::new(ManualTimeSource::new(0));
        let config = RateLimitConfig { max_attempts: 0, window_ms: 1_000 };
        let limiter = RateLimiter::new(config, clock);
        assert!(!limiter.is_allowed("u1"));
        assert_eq!(limiter.tracked(), 0);
    }

    #[test]
    fn test_concurrent_attempts_never_exceed_limit() {
        let (limiter, _clock) = limiter();
        let limiter = Arc::new(limiter);
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || limiter.is_allowed("shared"))
            })
            .collect();
        let allowed = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&ok| ok)
            .count();
        assert_eq!(allowed, 6);
    }
}
