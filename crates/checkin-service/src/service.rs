//! Verification, enrollment and check-in flows over the core engine and guard.

use std::sync::Arc;

use checkin_core::{
    try_restore, Capture, Descriptor, DescriptorError, EnrollmentError, EnrollmentSession,
    EnrollmentState, EuclideanMatcher, Matcher, NormalizedDescriptor, Rejection, SampleOutcome,
};
use checkin_guard::{
    AbuseGuard, GuardVerdict, MonotonicTimeSource, RateLimiter, SpamReason, TimeSource,
};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;

use crate::attendance::{AttendanceRecord, Location};
use crate::config::Config;
use crate::store::{AttendanceLog, StoreError, TemplateStore};

pub const ACTION_ATTENDANCE: &str = "attendance";
pub const ACTION_ENROLLMENT: &str = "enrollment";

/// Failures that are not retryable outcomes: a misconfigured encoder or a broken store.
#[derive(Error, Debug)]
pub enum CheckInError {
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    #[error(transparent)]
    Enrollment(#[from] EnrollmentError),
    #[error("store: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerifyOutcome {
    pub accepted: bool,
    pub similarity: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<Rejection>,
}

impl VerifyOutcome {
    fn rejected(reason: Rejection, similarity: f32) -> Self {
        Self {
            accepted: false,
            similarity,
            best_index: None,
            reason: Some(reason),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollPhase {
    Collecting,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrollOutcome {
    pub state: EnrollPhase,
    /// Index of the next sample to capture (equals `total_required` when complete).
    pub sample_index: usize,
    pub total_required: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<Rejection>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckInOutcome {
    pub accepted: bool,
    pub similarity: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<Rejection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<AttendanceRecord>,
    /// Set when the previous check-in fell inside the recent-attendance window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_at: Option<DateTime<Utc>>,
}

impl CheckInOutcome {
    fn rejected(reason: Rejection, similarity: f32) -> Self {
        Self {
            accepted: false,
            similarity,
            reason: Some(reason),
            record: None,
            previous_at: None,
        }
    }
}

/// Facade exposed to the UI layer.
pub struct CheckInService<S> {
    store: S,
    guard: AbuseGuard,
    matcher: EuclideanMatcher,
    sessions: DashMap<String, EnrollmentSession>,
    descriptor_dim: usize,
    required_similarity: f32,
    samples_required: usize,
    recent_window: Option<Duration>,
}

impl<S> CheckInService<S>
where
    S: TemplateStore + AttendanceLog,
{
    pub fn new(config: &Config, store: S) -> Self {
        Self::with_time_source(config, store, Arc::new(MonotonicTimeSource::new()))
    }

    pub fn with_time_source(config: &Config, store: S, clock: Arc<dyn TimeSource>) -> Self {
        let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone(), Arc::clone(&clock)));
        Self {
            store,
            guard: AbuseGuard::new(limiter, config.abuse.clone(), clock),
            matcher: EuclideanMatcher {
                distance_threshold: config.distance_threshold,
            },
            sessions: DashMap::new(),
            descriptor_dim: config.descriptor_dim,
            required_similarity: config.required_similarity,
            samples_required: config.samples_required.max(1),
            recent_window: (config.recent_attendance_secs > 0).then(|| {
                let secs = i64::try_from(config.recent_attendance_secs).unwrap_or(i64::MAX);
                Duration::seconds(secs.min(i64::MAX / 1000))
            }),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run one attempt through the abuse guard.
    pub fn guard_check(&self, identity: &str, action: &str) -> GuardVerdict {
        self.guard.check_attempt(identity, action)
    }

    pub fn attempts_remaining(&self, identity: &str) -> usize {
        self.guard.remaining(identity)
    }

    /// Compare a live descriptor against the identity's enrolled templates.
    ///
    /// Does not consult the guard; callers run [`guard_check`](Self::guard_check) first.
    pub fn verify(&self, identity: &str, live: &Descriptor) -> Result<VerifyOutcome, CheckInError> {
        live.ensure_dimension(self.descriptor_dim)?;
        let templates = match self.load_templates(identity)? {
            Ok(templates) => templates,
            Err(reason) => return Ok(VerifyOutcome::rejected(reason, 0.0)),
        };
        Ok(self.score(identity, live, &templates))
    }

    /// Feed one enrollment sample for the identity.
    ///
    /// The final sample persists the template set, replacing any earlier enrollment.
    pub fn enroll(&self, identity: &str, sample: &Descriptor) -> Result<EnrollOutcome, CheckInError> {
        let total = self.samples_required;
        let flattened = {
            let mut session = self
                .sessions
                .entry(identity.to_owned())
                .or_insert_with(|| EnrollmentSession::new(total, self.descriptor_dim));
            if session.state() == EnrollmentState::Complete {
                *session = EnrollmentSession::new(total, self.descriptor_dim);
            }

            match session.add_sample(sample)? {
                SampleOutcome::Collecting { next_index } => {
                    tracing::debug!(identity, next_index, total, "enrollment sample accepted");
                    return Ok(EnrollOutcome {
                        state: EnrollPhase::Collecting,
                        sample_index: next_index,
                        total_required: total,
                        prompt: session.prompt(),
                        reason: None,
                    });
                }
                SampleOutcome::Complete(flattened) => flattened,
            }
        };

        // The session guard is released before store I/O. A failed save
        // leaves no session, so the next sample starts a fresh enrollment.
        self.sessions
            .remove_if(identity, |_, s| s.state() == EnrollmentState::Complete);
        self.store.save(identity, &flattened)?;

        tracing::info!(identity, templates = flattened.count, "enrollment complete");
        Ok(EnrollOutcome {
            state: EnrollPhase::Complete,
            sample_index: total,
            total_required: total,
            prompt: None,
            reason: None,
        })
    }

    /// Guarded enrollment from a raw capture. Capture problems leave the
    /// sample index where it was.
    pub fn enroll_capture(&self, identity: &str, capture: &Capture) -> Result<EnrollOutcome, CheckInError> {
        let verdict = self.guard_check(identity, ACTION_ENROLLMENT);
        if verdict.is_spam {
            return Ok(self.enroll_rejected(identity, guard_rejection(&verdict)));
        }
        match capture.descriptor() {
            Ok(descriptor) => self.enroll(identity, &descriptor),
            Err(reason) => Ok(self.enroll_rejected(identity, reason)),
        }
    }

    /// Discard an in-progress enrollment.
    pub fn reset_enrollment(&self, identity: &str) {
        if self.sessions.remove(identity).is_some() {
            tracing::info!(identity, "enrollment session reset");
        }
    }

    /// Delete the identity's stored templates and any in-progress session.
    pub fn remove_enrollment(&self, identity: &str) -> Result<bool, CheckInError> {
        self.sessions.remove(identity);
        Ok(self.store.remove(identity)?)
    }

    /// Full attendance flow: guard, enrollment, capture shape, match, record.
    pub fn check_in(
        &self,
        identity: &str,
        capture: &Capture,
        location: Location,
    ) -> Result<CheckInOutcome, CheckInError> {
        let verdict = self.guard_check(identity, ACTION_ATTENDANCE);
        if verdict.is_spam {
            return Ok(CheckInOutcome::rejected(guard_rejection(&verdict), 0.0));
        }

        let templates = match self.load_templates(identity)? {
            Ok(templates) => templates,
            Err(reason) => return Ok(CheckInOutcome::rejected(reason, 0.0)),
        };

        let descriptor = match capture.descriptor() {
            Ok(descriptor) => descriptor,
            Err(reason) => return Ok(CheckInOutcome::rejected(reason, 0.0)),
        };
        descriptor.ensure_dimension(self.descriptor_dim)?;

        let outcome = self.score(identity, &descriptor, &templates);
        if !outcome.accepted {
            let reason = outcome.reason.unwrap_or(Rejection::VerificationFailed);
            return Ok(CheckInOutcome::rejected(reason, outcome.similarity));
        }

        let previous_at = self.recent_attendance(identity)?.map(|r| r.timestamp);
        if let Some(previous) = previous_at {
            tracing::warn!(identity, previous = %previous, "attendance already recorded recently");
        }

        let record = AttendanceRecord::new(identity, location, capture.face_count(), outcome.similarity);
        self.store.record(&record)?;
        tracing::info!(
            identity,
            similarity = outcome.similarity,
            record = %record.id,
            "attendance recorded"
        );

        Ok(CheckInOutcome {
            accepted: true,
            similarity: outcome.similarity,
            reason: None,
            record: Some(record),
            previous_at,
        })
    }

    /// The latest attendance record if it falls inside the recent-attendance window.
    pub fn recent_attendance(&self, identity: &str) -> Result<Option<AttendanceRecord>, CheckInError> {
        let Some(window) = self.recent_window else {
            return Ok(None);
        };
        let cutoff = Utc::now()
            .checked_sub_signed(window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Ok(self
            .store
            .history(identity)?
            .into_iter()
            .next()
            .filter(|r| r.timestamp > cutoff))
    }

    pub fn attendance_history(&self, identity: &str) -> Result<Vec<AttendanceRecord>, CheckInError> {
        Ok(self.store.history(identity)?)
    }

    /// Number of templates currently stored for the identity, if any are readable.
    pub fn template_count(&self, identity: &str) -> Result<Option<usize>, CheckInError> {
        Ok(self.load_templates(identity)?.ok().map(|t| t.len()))
    }

    /// Reclaim expired guard state. Decisions are unaffected.
    pub fn sweep(&self) {
        self.guard.sweep();
    }

    fn load_templates(
        &self,
        identity: &str,
    ) -> Result<Result<Vec<NormalizedDescriptor>, Rejection>, CheckInError> {
        let Some(document) = self.store.load(identity)? else {
            return Ok(Err(Rejection::NoEnrollment));
        };
        let templates = match try_restore(Some(&document)) {
            Ok(templates) => templates,
            Err(err) => {
                tracing::warn!(identity, error = %err, "stored templates unreadable");
                return Ok(Err(Rejection::MalformedTemplate));
            }
        };
        if templates.is_empty() {
            return Ok(Err(Rejection::NoEnrollment));
        }
        for template in &templates {
            if template.len() != self.descriptor_dim {
                return Err(DescriptorError::DimensionMismatch {
                    expected: self.descriptor_dim,
                    actual: template.len(),
                }
                .into());
            }
        }
        Ok(Ok(templates))
    }

    fn score(
        &self,
        identity: &str,
        live: &Descriptor,
        templates: &[NormalizedDescriptor],
    ) -> VerifyOutcome {
        let probe = live.normalize();
        let result = self.matcher.compare(&probe, templates);
        let accepted =
            result.best_index.is_some() && result.best_similarity >= self.required_similarity;

        tracing::debug!(
            identity,
            similarity = result.best_similarity,
            best_index = ?result.best_index,
            accepted,
            "verification scored"
        );

        VerifyOutcome {
            accepted,
            similarity: result.best_similarity,
            best_index: result.best_index,
            reason: (!accepted).then_some(Rejection::VerificationFailed),
        }
    }

    fn enroll_rejected(&self, identity: &str, reason: Rejection) -> EnrollOutcome {
        let (sample_index, prompt) = self
            .sessions
            .get(identity)
            .map(|s| (s.collected(), s.prompt()))
            .unwrap_or((0, checkin_core::enrollment::POSE_PROMPTS.first().copied()));
        EnrollOutcome {
            state: EnrollPhase::Collecting,
            sample_index,
            total_required: self.samples_required,
            prompt,
            reason: Some(reason),
        }
    }
}

fn guard_rejection(verdict: &GuardVerdict) -> Rejection {
    match verdict.reason {
        Some(SpamReason::TooManyAttempts) => Rejection::RateLimited,
        _ => Rejection::Blocked,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::{mpsc, Mutex};
    use std::time::Duration as StdDuration;

    use checkin_core::{DetectedFace, FaceReading, FlattenedTemplates};
    use checkin_guard::ManualTimeSource;
    use serde_json::Value;

    const DIM: usize = 8;

    fn config() -> Config {
        Config {
            descriptor_dim: DIM,
            ..Config::default()
        }
    }

    fn service() -> (CheckInService<MemoryStore>, Arc<ManualTimeSource>) {
        let clock = Arc::new(ManualTimeSource::new(1_000_000));
        let svc = CheckInService::with_time_source(&config(), MemoryStore::new(), clock.clone());
        (svc, clock)
    }

    fn pose(i: usize) -> Descriptor {
        let mut values = vec![0.1f32; DIM];
        values[i % DIM] = 1.0;
        Descriptor::new(values)
    }

    fn enroll_all(svc: &CheckInService<MemoryStore>, identity: &str) {
        for i in 0..5 {
            svc.enroll(identity, &pose(i)).unwrap();
        }
    }

    fn here() -> Location {
        Location { lat: 1.0, lng: 2.0, accuracy: 5.0 }
    }

    /// Memory store whose first `save` parks until released, or whose saves
    /// all fail.
    struct TestStore {
        inner: MemoryStore,
        entered: Mutex<Option<mpsc::Sender<()>>>,
        release: Mutex<Option<mpsc::Receiver<()>>>,
        fail_saves: bool,
    }

    impl TestStore {
        fn failing() -> Self {
            Self {
                inner: MemoryStore::new(),
                entered: Mutex::new(None),
                release: Mutex::new(None),
                fail_saves: true,
            }
        }

        fn gated(entered: mpsc::Sender<()>, release: mpsc::Receiver<()>) -> Self {
            Self {
                inner: MemoryStore::new(),
                entered: Mutex::new(Some(entered)),
                release: Mutex::new(Some(release)),
                fail_saves: false,
            }
        }
    }

    impl TemplateStore for TestStore {
        fn load(&self, identity: &str) -> Result<Option<Value>, StoreError> {
            self.inner.load(identity)
        }

        fn save(&self, identity: &str, templates: &FlattenedTemplates) -> Result<(), StoreError> {
            if self.fail_saves {
                return Err(StoreError::Poisoned);
            }
            if let Some(entered) = self.entered.lock().unwrap().take() {
                entered.send(()).unwrap();
                if let Some(release) = self.release.lock().unwrap().take() {
                    release.recv().unwrap();
                }
            }
            self.inner.save(identity, templates)
        }

        fn remove(&self, identity: &str) -> Result<bool, StoreError> {
            self.inner.remove(identity)
        }
    }

    impl AttendanceLog for TestStore {
        fn record(&self, record: &AttendanceRecord) -> Result<(), StoreError> {
            self.inner.record(record)
        }

        fn history(&self, identity: &str) -> Result<Vec<AttendanceRecord>, StoreError> {
            self.inner.history(identity)
        }
    }

    #[test]
    fn test_enroll_progression() {
        let (svc, _) = service();
        let first = svc.enroll("u1", &pose(0)).unwrap();
        assert_eq!(first.state, EnrollPhase::Collecting);
        assert_eq!(first.sample_index, 1);
        assert_eq!(first.total_required, 5);
        for i in 1..4 {
            svc.enroll("u1", &pose(i)).unwrap();
        }
        let last = svc.enroll("u1", &pose(4)).unwrap();
        assert_eq!(last.state, EnrollPhase::Complete);
        assert_eq!(svc.template_count("u1").unwrap(), Some(5));
    }

    #[test]
    fn test_reenrollment_replaces() {
        let (svc, _) = service();
        enroll_all(&svc, "u1");
        let next = svc.enroll("u1", &pose(7)).unwrap();
        assert_eq!(next.state, EnrollPhase::Collecting);
        assert_eq!(next.sample_index, 1);
        // old set still in place until the new one completes
        assert_eq!(svc.template_count("u1").unwrap(), Some(5));
    }

    #[test]
    fn test_enroll_dimension_mismatch_is_error() {
        let (svc, _) = service();
        let err = svc.enroll("u1", &Descriptor::new(vec![1.0; DIM + 1])).unwrap_err();
        assert!(matches!(err, CheckInError::Enrollment(EnrollmentError::Descriptor(_))));
    }

    #[test]
    fn test_enroll_failed_save_restarts_session() {
        let svc = CheckInService::new(&config(), TestStore::failing());
        for i in 0..4 {
            svc.enroll("u1", &pose(i)).unwrap();
        }
        let err = svc.enroll("u1", &pose(4)).unwrap_err();
        assert!(matches!(err, CheckInError::Store(_)));
        assert_eq!(svc.template_count("u1").unwrap(), None);
        assert_eq!(svc.enroll("u1", &pose(0)).unwrap().sample_index, 1);
    }

    #[test]
    fn test_enroll_save_does_not_hold_session_shard() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let mut svc = CheckInService::new(&config(), TestStore::gated(entered_tx, release_rx));
        // Two shards, so the other identities share one with "u1".
        svc.sessions = DashMap::with_shard_amount(2);
        for i in 0..4 {
            svc.enroll("u1", &pose(i)).unwrap();
        }

        let svc = &svc;
        std::thread::scope(|s| {
            let finisher = s.spawn(move || svc.enroll("u1", &pose(4)).unwrap());
            entered_rx.recv().unwrap();

            let (done_tx, done_rx) = mpsc::channel();
            s.spawn(move || {
                for n in 0..32 {
                    svc.enroll(&format!("user-{n}"), &pose(0)).unwrap();
                }
                done_tx.send(()).unwrap();
            });
            let progressed = done_rx.recv_timeout(StdDuration::from_secs(5)).is_ok();

            release_tx.send(()).unwrap();
            assert_eq!(finisher.join().unwrap().state, EnrollPhase::Complete);
            assert!(progressed, "other enrollments stalled behind a template save");
        });
        assert_eq!(svc.template_count("u1").unwrap(), Some(5));
    }

    #[test]
    fn test_verify_renormalizes_stored_templates() {
        let (svc, _) = service();
        let mut raw = vec![0.0f32; DIM];
        raw[0] = 3.0;
        raw[1] = 4.0;
        svc.store().insert_raw(
            "u1",
            serde_json::json!({ "count": 1, "templates": [{ "features": raw.clone(), "length": DIM }] }),
        );
        let outcome = svc.verify("u1", &Descriptor::new(raw)).unwrap();
        assert!(outcome.accepted);
        assert!((outcome.similarity - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_verify_document_without_count_or_length() {
        let (svc, _) = service();
        let features = pose(3).normalize().values().to_vec();
        svc.store()
            .insert_raw("u1", serde_json::json!({ "templates": [{ "features": features }] }));
        let outcome = svc.verify("u1", &pose(3)).unwrap();
        assert!(outcome.accepted);
        assert_eq!(outcome.best_index, Some(0));
    }

    #[test]
    fn test_reset_enrollment() {
        let (svc, _) = service();
        svc.enroll("u1", &pose(0)).unwrap();
        svc.enroll("u1", &pose(1)).unwrap();
        svc.reset_enrollment("u1");
        assert_eq!(svc.enroll("u1", &pose(0)).unwrap().sample_index, 1);
    }

    #[test]
    fn test_verify_matches_enrolled_pose() {
        let (svc, _) = service();
        enroll_all(&svc, "u1");
        let outcome = svc.verify("u1", &pose(2)).unwrap();
        assert!(outcome.accepted);
        assert_eq!(outcome.best_index, Some(2));
        assert!((outcome.similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_verify_rejects_stranger() {
        let (svc, _) = service();
        enroll_all(&svc, "u1");
        let mut values = vec![-0.1f32; DIM];
        values[DIM - 1] = -1.0;
        let outcome = svc.verify("u1", &Descriptor::new(values)).unwrap();
        assert!(!outcome.accepted);
        assert_eq!(outcome.reason, Some(Rejection::VerificationFailed));
    }

    #[test]
    fn test_verify_without_enrollment() {
        let (svc, _) = service();
        let outcome = svc.verify("ghost", &pose(0)).unwrap();
        assert_eq!(outcome.reason, Some(Rejection::NoEnrollment));
        assert_eq!(outcome.similarity, 0.0);
    }

    #[test]
    fn test_verify_malformed_document() {
        let (svc, _) = service();
        svc.store().insert_raw("u1", serde_json::json!({ "count": 5 }));
        let outcome = svc.verify("u1", &pose(0)).unwrap();
        assert_eq!(outcome.reason, Some(Rejection::MalformedTemplate));
    }

    #[test]
    fn test_verify_empty_template_set() {
        let (svc, _) = service();
        svc.store()
            .insert_raw("u1", serde_json::json!({ "count": 0, "templates": [] }));
        let outcome = svc.verify("u1", &pose(0)).unwrap();
        assert_eq!(outcome.reason, Some(Rejection::NoEnrollment));
    }

    #[test]
    fn test_verify_dimension_mismatch_is_error() {
        let (svc, _) = service();
        enroll_all(&svc, "u1");
        let err = svc.verify("u1", &Descriptor::new(vec![1.0; 3])).unwrap_err();
        assert!(matches!(err, CheckInError::Descriptor(DescriptorError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_check_in_records_attendance() {
        let (svc, clock) = service();
        enroll_all(&svc, "u1");
        clock.advance(10_000);
        let outcome = svc.check_in("u1", &Capture::single(pose(0)), here()).unwrap();
        assert!(outcome.accepted);
        let record = outcome.record.unwrap();
        assert_eq!(record.face_count, 1);
        assert_eq!(svc.attendance_history("u1").unwrap(), vec![record]);
    }

    #[test]
    fn test_check_in_flags_recent_attendance() {
        let (svc, clock) = service();
        enroll_all(&svc, "u1");
        let first = svc.check_in("u1", &Capture::single(pose(0)), here()).unwrap();
        assert!(first.accepted);
        assert_eq!(first.previous_at, None);

        clock.advance(10_000);
        let second = svc.check_in("u1", &Capture::single(pose(0)), here()).unwrap();
        assert!(second.accepted);
        assert_eq!(second.previous_at, first.record.map(|r| r.timestamp));
        assert_eq!(svc.attendance_history("u1").unwrap().len(), 2);
    }

    #[test]
    fn test_recent_attendance_window_disabled() {
        let clock = Arc::new(ManualTimeSource::new(1_000_000));
        let config = Config {
            recent_attendance_secs: 0,
            ..config()
        };
        let svc = CheckInService::with_time_source(&config, MemoryStore::new(), clock.clone());
        enroll_all(&svc, "u1");
        svc.check_in("u1", &Capture::single(pose(0)), here()).unwrap();
        clock.advance(10_000);
        let second = svc.check_in("u1", &Capture::single(pose(0)), here()).unwrap();
        assert_eq!(second.previous_at, None);
        assert!(svc.recent_attendance("u1").unwrap().is_none());
    }

    #[test]
    fn test_check_in_capture_rejections_do_not_record() {
        let (svc, clock) = service();
        enroll_all(&svc, "u1");
        let dark = Capture::Single(DetectedFace { bbox: None, reading: FaceReading::TooDark });
        for (capture, reason) in [
            (Capture::NoFace, Rejection::NoFace),
            (Capture::Multiple(2), Rejection::AmbiguousFace),
            (dark, Rejection::TooDark),
        ] {
            clock.advance(10_000);
            let outcome = svc.check_in("u1", &capture, here()).unwrap();
            assert_eq!(outcome.reason, Some(reason));
        }
        assert!(svc.attendance_history("u1").unwrap().is_empty());
    }

    #[test]
    fn test_check_in_requires_enrollment_first() {
        let (svc, _) = service();
        let outcome = svc.check_in("u1", &Capture::NoFace, here()).unwrap();
        assert_eq!(outcome.reason, Some(Rejection::NoEnrollment));
    }

    #[test]
    fn test_check_in_burst_blocks() {
        let (svc, _) = service();
        enroll_all(&svc, "u1");
        let capture = Capture::single(pose(0));
        assert!(svc.check_in("u1", &capture, here()).unwrap().accepted);
        assert!(svc.check_in("u1", &capture, here()).unwrap().accepted);
        let third = svc.check_in("u1", &capture, here()).unwrap();
        assert_eq!(third.reason, Some(Rejection::Blocked));
        assert_eq!(svc.attendance_history("u1").unwrap().len(), 2);
    }

    #[test]
    fn test_enroll_capture_keeps_index_on_bad_frame() {
        let (svc, clock) = service();
        svc.enroll_capture("u1", &Capture::single(pose(0))).unwrap();
        clock.advance(10_000);
        let outcome = svc.enroll_capture("u1", &Capture::Multiple(3)).unwrap();
        assert_eq!(outcome.reason, Some(Rejection::AmbiguousFace));
        assert_eq!(outcome.sample_index, 1);
        clock.advance(10_000);
        let next = svc.enroll_capture("u1", &Capture::single(pose(1))).unwrap();
        assert_eq!(next.sample_index, 2);
    }

    #[test]
    fn test_attempts_remaining_tracks_guard() {
        let (svc, clock) = service();
        assert_eq!(svc.attempts_remaining("u1"), 6);
        svc.guard_check("u1", ACTION_ATTENDANCE);
        clock.advance(10_000);
        svc.guard_check("u1", ACTION_ATTENDANCE);
        assert_eq!(svc.attempts_remaining("u1"), 4);
    }
}
