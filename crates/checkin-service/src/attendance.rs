use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where the check-in happened, as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
    /// Reported accuracy radius in metres.
    pub accuracy: f64,
}

/// One accepted, location-tagged check-in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: String,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    pub location: Location,
    pub face_count: usize,
    pub similarity: f32,
}

impl AttendanceRecord {
    pub fn new(user_id: &str, location: Location, face_count: usize, similarity: f32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            timestamp: Utc::now(),
            location,
            face_count,
            similarity,
        }
    }
}
