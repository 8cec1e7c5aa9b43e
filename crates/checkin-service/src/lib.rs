//! checkin-service — Biometric attendance check-in facade.
//!
//! Ties the descriptor engine to the abuse guard, a template store and an
//! attendance log. Every user-facing rejection is a typed outcome; only
//! encoder contract violations and store failures surface as errors.

pub mod attendance;
pub mod config;
pub mod service;
pub mod store;

pub use attendance::{AttendanceRecord, Location};
pub use config::{Config, ConfigError};
pub use service::{
    CheckInError, CheckInOutcome, CheckInService, EnrollOutcome, EnrollPhase, VerifyOutcome,
    ACTION_ATTENDANCE, ACTION_ENROLLMENT,
};
pub use store::{AttendanceLog, MemoryStore, SqliteStore, StoreError, TemplateStore};
