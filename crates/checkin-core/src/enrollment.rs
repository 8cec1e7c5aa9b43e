//! Enrollment aggregation: collect a fixed number of pose-diverse samples
//! into one template set.

use serde::Serialize;
use thiserror::Error;

use crate::codec::{flatten, FlattenedTemplates};
use crate::types::{Descriptor, DescriptorError, NormalizedDescriptor};

/// Samples per enrollment (straight, left, right, up, down).
pub const SAMPLES_REQUIRED: usize = 5;

/// Pose prompts shown for each sample index.
pub const POSE_PROMPTS: [&str; SAMPLES_REQUIRED] = [
    "Look straight at the camera",
    "Turn your head slightly left",
    "Turn your head slightly right",
    "Tilt your head slightly up",
    "Tilt your head slightly down",
];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EnrollmentError {
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    #[error("enrollment session already complete")]
    AlreadyComplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentState {
    /// Waiting for the sample at this index.
    Collecting(usize),
    Complete,
}

/// Outcome of feeding one sample into a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleOutcome {
    Collecting { next_index: usize },
    Complete(FlattenedTemplates),
}

/// One identity's in-progress enrollment.
#[derive(Debug, Clone)]
pub struct EnrollmentSession {
    required: usize,
    dimension: usize,
    samples: Vec<NormalizedDescriptor>,
    complete: bool,
}

impl EnrollmentSession {
    pub fn new(required: usize, dimension: usize) -> Self {
        Self {
            required: required.max(1),
            dimension,
            samples: Vec::with_capacity(required),
            complete: false,
        }
    }

    pub fn state(&self) -> EnrollmentState {
        if self.complete {
            EnrollmentState::Complete
        } else {
            EnrollmentState::Collecting(self.samples.len())
        }
    }

    pub fn required(&self) -> usize {
        self.required
    }

    pub fn collected(&self) -> usize {
        self.samples.len()
    }

    /// Prompt for the sample currently being collected.
    pub fn prompt(&self) -> Option<&'static str> {
        match self.state() {
            EnrollmentState::Collecting(i) => POSE_PROMPTS.get(i).copied(),
            EnrollmentState::Complete => None,
        }
    }

    /// Append a sample. On the final sample the set is flattened and the
    /// session becomes terminal.
    pub fn add_sample(&mut self, sample: &Descriptor) -> Result<SampleOutcome, EnrollmentError> {
        if self.complete {
            return Err(EnrollmentError::AlreadyComplete);
        }
        sample.ensure_dimension(self.dimension)?;

        self.samples.push(sample.normalize());
        if self.samples.len() < self.required {
            return Ok(SampleOutcome::Collecting {
                next_index: self.samples.len(),
            });
        }

        self.complete = true;
        Ok(SampleOutcome::Complete(flatten(&self.samples)))
    }

    /// Discard collected samples. Has no effect once complete.
    pub fn reset(&mut self) {
        if !self.complete {
            self.samples.clear();
        }
    }
}
