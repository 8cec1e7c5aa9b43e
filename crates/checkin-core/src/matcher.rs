//! Distance-based similarity and best-match selection over a template set.

use crate::types::NormalizedDescriptor;

/// Distance at which similarity saturates to zero. Tuned for 128-d face descriptors.
pub const DEFAULT_DISTANCE_THRESHOLD: f32 = 0.6;

/// Minimum best-match similarity to accept an identity claim.
///
/// Deliberately a separate constant from [`DEFAULT_DISTANCE_THRESHOLD`]: one
/// calibrates the embedding space, the other is acceptance policy.
pub const DEFAULT_REQUIRED_SIMILARITY: f32 = 0.6;

/// Map the Euclidean distance between two descriptors into [0, 1].
///
/// `1 - d / threshold`, clamped. Distance at or beyond `threshold` yields 0.
pub fn similarity(a: &NormalizedDescriptor, b: &NormalizedDescriptor, threshold: f32) -> f32 {
    distance_to_similarity(a.euclidean_distance(b), threshold)
}

fn distance_to_similarity(distance: f32, threshold: f32) -> f32 {
    if threshold <= 0.0 {
        return if distance == 0.0 { 1.0 } else { 0.0 };
    }
    (1.0 - distance / threshold).clamp(0.0, 1.0)
}

/// Result of comparing a candidate against every template of one identity.
#[derive(Debug, Clone, PartialEq)]
pub struct BestMatch {
    pub best_similarity: f32,
    /// Index of the best template; `None` when nothing scored above zero.
    pub best_index: Option<usize>,
    /// Raw Euclidean distance to each template, in template order.
    pub distances: Vec<f32>,
}

impl BestMatch {
    fn empty() -> Self {
        Self {
            best_similarity: 0.0,
            best_index: None,
            distances: Vec::new(),
        }
    }
}

/// Compare `candidate` against every template and keep the highest similarity.
///
/// Ties resolve to the earliest template: the running best is only replaced
/// on a strictly greater score. An empty template set yields similarity 0
/// and no index.
pub fn best_match(
    candidate: &NormalizedDescriptor,
    templates: &[NormalizedDescriptor],
    threshold: f32,
) -> BestMatch {
    if templates.is_empty() {
        return BestMatch::empty();
    }

    let mut result = BestMatch::empty();
    result.distances.reserve(templates.len());

    // Scores are collected for every template; the first maximum wins.
    for (i, template) in templates.iter().enumerate() {
        let distance = candidate.euclidean_distance(template);
        let sim = distance_to_similarity(distance, threshold);
        result.distances.push(distance);
        if sim > result.best_similarity {
            result.best_similarity = sim;
            result.best_index = Some(i);
        }
    }

    result
}

/// Strategy for scoring a probe against an identity's enrolled templates.
pub trait Matcher {
    fn compare(&self, probe: &NormalizedDescriptor, templates: &[NormalizedDescriptor]) -> BestMatch;
}

/// Euclidean-distance matcher with a configurable saturation threshold.
#[derive(Debug, Clone, Copy)]
pub struct EuclideanMatcher {
    pub distance_threshold: f32,
}

impl Default for EuclideanMatcher {
    fn default() -> Self {
        Self {
            distance_threshold: DEFAULT_DISTANCE_THRESHOLD,
        }
    }
}

impl Matcher for EuclideanMatcher {
    fn compare(&self, probe: &NormalizedDescriptor, templates: &[NormalizedDescriptor]) -> BestMatch {
        best_match(probe, templates, self.distance_threshold)
    }
}
