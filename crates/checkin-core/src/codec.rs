//! Template codec: in-memory template sets to and from the persisted document shape
//! `{ "count": n, "templates": [{ "features": [..], "length": n }] }`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::types::NormalizedDescriptor;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("malformed template: {0}")]
    MalformedTemplate(String),
}

/// One persisted template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatTemplate {
    pub features: Vec<f32>,
    pub length: usize,
}

/// Persistable form of a template set, in enrollment order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlattenedTemplates {
    pub count: usize,
    pub templates: Vec<FlatTemplate>,
}

/// Read-side view of a persisted document. Only `templates[].features` is
/// required; `count` and `length` are checked when present.
#[derive(Deserialize)]
struct StoredDocument {
    count: Option<usize>,
    templates: Vec<StoredTemplate>,
}

#[derive(Deserialize)]
struct StoredTemplate {
    features: Vec<f32>,
    length: Option<usize>,
}

pub fn flatten(templates: &[NormalizedDescriptor]) -> FlattenedTemplates {
    FlattenedTemplates {
        count: templates.len(),
        templates: templates
            .iter()
            .map(|t| FlatTemplate {
                features: t.values().to_vec(),
                length: t.len(),
            })
            .collect(),
    }
}

/// Restore a persisted document, distinguishing a malformed one.
///
/// `None` (no document) restores to an empty set; a document missing its
/// `templates` field, or whose entries disagree with a stated `length`, is
/// [`CodecError::MalformedTemplate`]. Stored features that are not unit
/// length are renormalized.
pub fn try_restore(flattened: Option<&Value>) -> Result<Vec<NormalizedDescriptor>, CodecError> {
    let Some(value) = flattened else {
        return Ok(Vec::new());
    };

    let doc: StoredDocument = serde_json::from_value(value.clone())
        .map_err(|e| CodecError::MalformedTemplate(e.to_string()))?;

    if let Some(count) = doc.count.filter(|&c| c != doc.templates.len()) {
        tracing::warn!(
            count,
            templates = doc.templates.len(),
            "template count field disagrees with stored templates"
        );
    }

    doc.templates
        .into_iter()
        .enumerate()
        .map(|(i, t)| match t.length {
            Some(length) if length != t.features.len() => Err(CodecError::MalformedTemplate(
                format!("template {i}: length {length} but {} features", t.features.len()),
            )),
            _ => Ok(NormalizedDescriptor::from_stored(t.features)),
        })
        .collect()
}

/// Tolerant restore: anything unreadable counts as "not enrolled".
pub fn restore(flattened: Option<&Value>) -> Vec<NormalizedDescriptor> {
    match try_restore(flattened) {
        Ok(templates) => templates,
        Err(err) => {
            tracing::warn!(error = %err, "discarding unreadable template set");
            Vec::new()
        }
    }
}
