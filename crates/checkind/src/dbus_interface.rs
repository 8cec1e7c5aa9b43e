use std::sync::Arc;

use checkin_core::{Capture, Descriptor, DetectedFace};
use checkin_service::{CheckInError, CheckInService, Config, Location, SqliteStore};
use serde::Serialize;
use zbus::interface;

pub const BUS_NAME: &str = "org.checkin.CheckIn1";
pub const OBJECT_PATH: &str = "/org/checkin/CheckIn1";

/// D-Bus interface for the check-in daemon.
///
/// Bus name: org.checkin.CheckIn1
/// Object path: /org/checkin/CheckIn1
pub struct CheckInInterface {
    service: Arc<CheckInService<SqliteStore>>,
    descriptor_dim: usize,
    distance_threshold: f32,
    required_similarity: f32,
}

impl CheckInInterface {
    pub fn new(service: Arc<CheckInService<SqliteStore>>, config: &Config) -> Self {
        Self {
            service,
            descriptor_dim: config.descriptor_dim,
            distance_threshold: config.distance_threshold,
            required_similarity: config.required_similarity,
        }
    }
}

#[interface(name = "org.checkin.CheckIn1")]
impl CheckInInterface {
    /// Verify a live descriptor against the user's enrolled templates.
    async fn verify(&self, user: &str, descriptor: Vec<f64>) -> zbus::fdo::Result<String> {
        tracing::info!(user, "verify requested");
        let outcome = self
            .service
            .verify(user, &to_descriptor(&descriptor))
            .map_err(to_fdo)?;
        to_json(&outcome)
    }

    /// Add one enrollment sample for the user.
    async fn enroll(&self, user: &str, descriptor: Vec<f64>) -> zbus::fdo::Result<String> {
        tracing::info!(user, "enroll requested");
        let outcome = self
            .service
            .enroll(user, &to_descriptor(&descriptor))
            .map_err(to_fdo)?;
        to_json(&outcome)
    }

    /// Discard the user's in-progress enrollment.
    async fn reset_enrollment(&self, user: &str) {
        tracing::info!(user, "reset_enrollment requested");
        self.service.reset_enrollment(user);
    }

    /// Run one attempt through the abuse guard.
    async fn guard_check(&self, user: &str, action: &str) -> zbus::fdo::Result<String> {
        to_json(&self.service.guard_check(user, action))
    }

    async fn attempts_remaining(&self, user: &str) -> u32 {
        self.service.attempts_remaining(user) as u32
    }

    /// Guarded check-in. `faces` is the detector output as a JSON array.
    async fn check_in(
        &self,
        user: &str,
        faces: &str,
        lat: f64,
        lng: f64,
        accuracy: f64,
    ) -> zbus::fdo::Result<String> {
        tracing::info!(user, "check_in requested");
        let detections: Vec<DetectedFace> = serde_json::from_str(faces)
            .map_err(|e| zbus::fdo::Error::InvalidArgs(format!("faces: {e}")))?;
        let location = Location { lat, lng, accuracy };
        let outcome = self
            .service
            .check_in(user, &Capture::from_detections(detections), location)
            .map_err(to_fdo)?;
        to_json(&outcome)
    }

    /// Attendance records for the user, newest first.
    async fn history(&self, user: &str) -> zbus::fdo::Result<String> {
        let records = self.service.attendance_history(user).map_err(to_fdo)?;
        to_json(&records)
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "descriptor_dim": self.descriptor_dim,
            "distance_threshold": self.distance_threshold,
            "required_similarity": self.required_similarity,
        })
        .to_string())
    }
}

fn to_descriptor(values: &[f64]) -> Descriptor {
    Descriptor::new(values.iter().map(|&v| v as f32).collect())
}

fn to_json<T: Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
}

fn to_fdo(err: CheckInError) -> zbus::fdo::Error {
    match err {
        CheckInError::Store(e) => {
            tracing::error!(error = %e, "store failure");
            zbus::fdo::Error::Failed(e.to_string())
        }
        other => zbus::fdo::Error::InvalidArgs(other.to_string()),
    }
}
