//! checkin-guard — Anti-abuse gate for verification attempts.
//!
//! A per-identity sliding-window [`RateLimiter`] wrapped by an [`AbuseGuard`]
//! that detects bursts and applies timed blocks. All state is in memory and
//! keyed by identity; nothing here survives a restart.

pub mod abuse;
pub mod clock;
pub mod rate_limiter;

pub use abuse::{AbuseConfig, AbuseGuard, GuardVerdict, SpamReason};
pub use clock::{ManualTimeSource, Millis, MonotonicTimeSource, TimeSource};
pub use rate_limiter::{RateLimitConfig, RateLimiter};
