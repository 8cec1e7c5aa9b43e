//! Result shapes consumed from the face detector/encoder collaborator.

use serde::{Deserialize, Serialize};

use crate::types::{BoundingBox, Descriptor, Rejection};

/// What the encoder produced for a single detected face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FaceReading {
    Descriptor { values: Vec<f32> },
    TooDark,
    PoorPosition,
}

/// One detected face region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedFace {
    pub bbox: Option<BoundingBox>,
    pub reading: FaceReading,
}

/// A captured frame reduced to the three shapes this core distinguishes.
#[derive(Debug, Clone, PartialEq)]
pub enum Capture {
    NoFace,
    Single(DetectedFace),
    Multiple(usize),
}

impl Capture {
    pub fn from_detections(mut faces: Vec<DetectedFace>) -> Self {
        match faces.len() {
            0 => Capture::NoFace,
            1 => Capture::Single(faces.remove(0)),
            n => Capture::Multiple(n),
        }
    }

    /// Convenience for a clean single-face capture.
    pub fn single(descriptor: Descriptor) -> Self {
        Capture::Single(DetectedFace {
            bbox: None,
            reading: FaceReading::Descriptor {
                values: descriptor.values,
            },
        })
    }

    pub fn face_count(&self) -> usize {
        match self {
            Capture::NoFace => 0,
            Capture::Single(_) => 1,
            Capture::Multiple(n) => *n,
        }
    }

    /// The usable descriptor, or the reason this frame cannot be used.
    pub fn descriptor(&self) -> Result<Descriptor, Rejection> {
        match self {
            Capture::NoFace => Err(Rejection::NoFace),
            Capture::Multiple(_) => Err(Rejection::AmbiguousFace),
            Capture::Single(face) => match &face.reading {
                FaceReading::Descriptor { values } => Ok(Descriptor::new(values.clone())),
                FaceReading::TooDark => Err(Rejection::TooDark),
                FaceReading::PoorPosition => Err(Rejection::PoorPosition),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(reading: FaceReading) -> DetectedFace {
        DetectedFace { bbox: None, reading }
    }

    #[test]
    fn test_from_detections_shapes() {
        assert_eq!(Capture::from_detections(vec![]), Capture::NoFace);
        let two = vec![face(FaceReading::TooDark), face(FaceReading::PoorPosition)];
        assert_eq!(Capture::from_detections(two), Capture::Multiple(2));
        let one = Capture::from_detections(vec![face(FaceReading::TooDark)]);
        assert_eq!(one.face_count(), 1);
    }

    #[test]
    fn test_descriptor_rejections() {
        assert_eq!(Capture::NoFace.descriptor(), Err(Rejection::NoFace));
        assert_eq!(Capture::Multiple(3).descriptor(), Err(Rejection::AmbiguousFace));
        let dark = Capture::Single(face(FaceReading::TooDark));
        assert_eq!(dark.descriptor(), Err(Rejection::TooDark));
        let poor = Capture::Single(face(FaceReading::PoorPosition));
        assert_eq!(poor.descriptor(), Err(Rejection::PoorPosition));
    }

    #[test]
    fn test_reading_json_shape() {
        let reading: FaceReading =
            serde_json::from_str(r#"{"kind":"descriptor","values":[0.5,0.5]}"#).unwrap();
        assert_eq!(reading, FaceReading::Descriptor { values: vec![0.5, 0.5] });
        let dark: FaceReading = serde_json::from_str(r#"{"kind":"too_dark"}"#).unwrap();
        assert_eq!(dark, FaceReading::TooDark);
    }
}
