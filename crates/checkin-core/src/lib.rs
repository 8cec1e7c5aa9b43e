//! checkin-core — Face descriptor verification engine.
//!
//! Normalizes encoder descriptors, scores them against enrolled templates by
//! Euclidean distance, and aggregates enrollment samples into a persistable
//! template set.

pub mod capture;
pub mod codec;
pub mod enrollment;
pub mod matcher;
pub mod types;

pub use capture::{Capture, DetectedFace, FaceReading};
pub use codec::{flatten, restore, try_restore, CodecError, FlatTemplate, FlattenedTemplates};
pub use enrollment::{EnrollmentError, EnrollmentSession, EnrollmentState, SampleOutcome, SAMPLES_REQUIRED};
pub use matcher::{
    best_match, similarity, BestMatch, EuclideanMatcher, Matcher, DEFAULT_DISTANCE_THRESHOLD,
    DEFAULT_REQUIRED_SIMILARITY,
};
pub use types::{
    BoundingBox, Descriptor, DescriptorError, NormalizedDescriptor, Rejection, DEFAULT_DESCRIPTOR_DIM,
};
