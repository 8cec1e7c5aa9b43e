//! Burst detection and timed blocking layered over the [`RateLimiter`].

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::clock::{Millis, TimeSource};
use crate::rate_limiter::RateLimiter;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AbuseConfig {
    /// Span of the short burst window.
    pub burst_window_ms: Millis,
    /// Attempts inside the burst window that trigger a block.
    pub burst_threshold: usize,
    pub block_duration_ms: Millis,
}

impl Default for AbuseConfig {
    fn default() -> Self {
        Self {
            burst_window_ms: 5_000,
            burst_threshold: 3,
            block_duration_ms: 15 * 60 * 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpamReason {
    /// Sliding-window limit exhausted.
    TooManyAttempts,
    /// Burst threshold hit inside the short window.
    RapidAttempts,
    /// An earlier block is still in force.
    Blocked,
}

impl SpamReason {
    pub fn message(&self) -> &'static str {
        match self {
            SpamReason::TooManyAttempts => "Too many attempts. Please try again later.",
            SpamReason::RapidAttempts => "Too many rapid attempts. Account temporarily blocked.",
            SpamReason::Blocked => {
                "Your account is temporarily blocked due to suspicious activity."
            }
        }
    }
}

/// Guard decision for one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GuardVerdict {
    pub is_spam: bool,
    pub blocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<SpamReason>,
}

impl GuardVerdict {
    fn pass() -> Self {
        Self {
            is_spam: false,
            blocked: false,
            reason: None,
        }
    }

    fn spam(reason: SpamReason) -> Self {
        Self {
            is_spam: true,
            blocked: true,
            reason: Some(reason),
        }
    }
}

#[derive(Debug, Clone)]
struct BurstEntry {
    at: Millis,
    action: String,
}

#[derive(Debug, Default)]
struct GuardState {
    burst: Vec<BurstEntry>,
    blocked_until: Option<Millis>,
}

/// Rate limiting plus burst detection with lazily expiring blocks.
///
/// Block expiry is evaluated against the stored deadline on every access;
/// [`AbuseGuard::sweep`] only reclaims memory and never changes a decision.
pub struct AbuseGuard {
    limiter: Arc<RateLimiter>,
    states: DashMap<String, GuardState>,
    config: AbuseConfig,
    clock: Arc<dyn TimeSource>,
}

impl AbuseGuard {
    pub fn new(limiter: Arc<RateLimiter>, config: AbuseConfig, clock: Arc<dyn TimeSource>) -> Self {
        Self {
            limiter,
            states: DashMap::new(),
            config,
            clock,
        }
    }

    pub fn config(&self) -> &AbuseConfig {
        &self.config
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Classify one attempt by `identity`.
    ///
    /// The whole sequence holds the identity's entry, so two concurrent
    /// attempts for the same identity are decided one after the other.
    pub fn check_attempt(&self, identity: &str, action: &str) -> GuardVerdict {
        let now = self.clock.now_ms();
        let mut state = self.states.entry(identity.to_owned()).or_default();

        self.expire_block(identity, &mut state, now);

        if !self.limiter.is_allowed(identity) {
            self.block(identity, &mut state, now, SpamReason::TooManyAttempts);
            return GuardVerdict::spam(SpamReason::TooManyAttempts);
        }

        let window = self.config.burst_window_ms;
        state.burst.retain(|e| now.saturating_sub(e.at) < window);
        state.burst.push(BurstEntry {
            at: now,
            action: action.to_owned(),
        });

        if state.burst.len() >= self.config.burst_threshold {
            tracing::debug!(
                identity,
                actions = ?state.burst.iter().map(|e| e.action.as_str()).collect::<Vec<_>>(),
                "burst threshold reached"
            );
            self.block(identity, &mut state, now, SpamReason::RapidAttempts);
            return GuardVerdict::spam(SpamReason::RapidAttempts);
        }

        if Self::block_active(&state, now) {
            tracing::debug!(identity, action, "attempt during active block");
            return GuardVerdict::spam(SpamReason::Blocked);
        }

        GuardVerdict::pass()
    }

    /// Whether the identity is under an unexpired block.
    pub fn is_blocked(&self, identity: &str) -> bool {
        let now = self.clock.now_ms();
        match self.states.get_mut(identity) {
            Some(mut state) => {
                self.expire_block(identity, &mut state, now);
                Self::block_active(&state, now)
            }
            None => false,
        }
    }

    /// Attempts left in the rate limiter's window, after applying any due block expiry.
    pub fn remaining(&self, identity: &str) -> usize {
        let now = self.clock.now_ms();
        if let Some(mut state) = self.states.get_mut(identity) {
            self.expire_block(identity, &mut state, now);
        }
        self.limiter.remaining(identity)
    }

    /// Reclaim state for expired blocks and stale burst logs.
    pub fn sweep(&self) {
        let now = self.clock.now_ms();
        let window = self.config.burst_window_ms;
        self.states.retain(|identity, state| {
            self.expire_block(identity, state, now);
            state.burst.retain(|e| now.saturating_sub(e.at) < window);
            state.blocked_until.is_some() || !state.burst.is_empty()
        });
        self.limiter.sweep();
    }

    fn block_active(state: &GuardState, now: Millis) -> bool {
        matches!(state.blocked_until, Some(until) if now < until)
    }

    /// Set a block unless one is already in force.
    fn block(&self, identity: &str, state: &mut GuardState, now: Millis, reason: SpamReason) {
        if Self::block_active(state, now) {
            return;
        }
        let until = now.saturating_add(self.config.block_duration_ms);
        state.blocked_until = Some(until);
        tracing::warn!(
            identity,
            ?reason,
            block_ms = self.config.block_duration_ms,
            "identity blocked"
        );
    }

    /// Lift an elapsed block and give the identity a clean rate-limit slate.
    fn expire_block(&self, identity: &str, state: &mut GuardState, now: Millis) {
        if let Some(until) = state.blocked_until {
            if now >= until {
                state.blocked_until = None;
                state.burst.clear();
                self.limiter.reset(identity);
                tracing::info!(identity, "block expired");
            }
        }
    }
}
