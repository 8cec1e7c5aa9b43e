use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Descriptor length produced by the upstream face encoder.
pub const DEFAULT_DESCRIPTOR_DIM: usize = 128;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DescriptorError {
    #[error("descriptor length mismatch: expected {expected} values, got {actual}; check the face encoder")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Bounding box for a detected face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

/// Raw face descriptor as emitted by the encoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub values: Vec<f32>,
}

impl Descriptor {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Check the descriptor against the configured dimensionality.
    pub fn ensure_dimension(&self, expected: usize) -> Result<(), DescriptorError> {
        if self.values.len() != expected {
            return Err(DescriptorError::DimensionMismatch {
                expected,
                actual: self.values.len(),
            });
        }
        Ok(())
    }

    /// L2-normalize into the canonical comparable form.
    ///
    /// An all-zero descriptor is returned unchanged (divisor 1).
    pub fn normalize(&self) -> NormalizedDescriptor {
        NormalizedDescriptor::from_raw(&self.values)
    }
}

impl From<Vec<f32>> for Descriptor {
    fn from(values: Vec<f32>) -> Self {
        Self { values }
    }
}

/// A descriptor with unit Euclidean norm.
///
/// Only produced by [`Descriptor::normalize`] or by restoring a persisted
/// template set, which renormalizes values that are off unit length.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedDescriptor {
    values: Vec<f32>,
}

impl NormalizedDescriptor {
    pub(crate) fn from_raw(raw: &[f32]) -> Self {
        let norm = l2_norm(raw);
        let divisor = if norm > 0.0 { norm } else { 1.0 };
        Self {
            values: raw.iter().map(|x| x / divisor).collect(),
        }
    }

    /// Adopt persisted template values.
    ///
    /// Unit-length values are kept bit-for-bit; anything else is
    /// renormalized.
    pub(crate) fn from_stored(values: Vec<f32>) -> Self {
        if (l2_norm(&values) - 1.0).abs() <= UNIT_NORM_TOLERANCE {
            Self { values }
        } else {
            Self::from_raw(&values)
        }
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn norm(&self) -> f32 {
        l2_norm(&self.values)
    }

    /// Euclidean distance over the shared prefix of both vectors.
    pub fn euclidean_distance(&self, other: &NormalizedDescriptor) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

const UNIT_NORM_TOLERANCE: f32 = 1e-5;

fn l2_norm(values: &[f32]) -> f32 {
    values.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Why an attempt was turned away. Every variant is retryable by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Rejection {
    NoFace,
    AmbiguousFace,
    TooDark,
    PoorPosition,
    NoEnrollment,
    MalformedTemplate,
    VerificationFailed,
    RateLimited,
    Blocked,
}

impl Rejection {
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::NoFace => "NO_FACE",
            Rejection::AmbiguousFace => "AMBIGUOUS_FACE",
            Rejection::TooDark => "TOO_DARK",
            Rejection::PoorPosition => "POOR_POSITION",
            Rejection::NoEnrollment => "NO_ENROLLMENT",
            Rejection::MalformedTemplate => "MALFORMED_TEMPLATE",
            Rejection::VerificationFailed => "VERIFICATION_FAILED",
            Rejection::RateLimited => "RATE_LIMITED",
            Rejection::Blocked => "BLOCKED",
        }
    }

    /// Message suitable for showing to the person at the camera.
    pub fn message(&self) -> &'static str {
        match self {
            Rejection::NoFace => "No face detected. Position your face in the frame.",
            Rejection::AmbiguousFace => "Multiple faces detected. Make sure only your face is visible.",
            Rejection::TooDark => "Too dark. Improve lighting and try again.",
            Rejection::PoorPosition => "Face could not be read. Center your face and try again.",
            Rejection::NoEnrollment => "No enrolled face found. Complete enrollment first.",
            Rejection::MalformedTemplate => "Stored enrollment is unreadable. Enroll again.",
            Rejection::VerificationFailed => "Face verification failed. No matching face found.",
            Rejection::RateLimited => "Too many attempts. Please try again later.",
            Rejection::Blocked => "Temporarily blocked due to suspicious activity.",
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}
