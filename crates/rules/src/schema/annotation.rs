//! Annotation documents: predicate, payload, merge strategy and metadata.

use std::collections::BTreeMap;

use archivist_core::Payload;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AppliesTo, MergeStrategy};

/// A persisted annotation rule as authored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Annotation {
    /// Assigned by the store on first save when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub applies_to: AppliesTo,
    pub annotation: Payload,
    pub merge_strategy: MergeStrategy,
    #[serde(default)]
    pub metadata: AnnotationMetadata,
    /// Creation time, assigned by the store on first save when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Annotation {
    pub fn new(applies_to: AppliesTo, annotation: Payload, merge_strategy: MergeStrategy) -> Self {
        Self {
            id: None,
            applies_to,
            annotation,
            merge_strategy,
            metadata: AnnotationMetadata::default(),
            created_at: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn with_expires(mut self, expires: impl Into<String>) -> Self {
        self.metadata.expires = Some(expires.into());
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

/// Free-form metadata. `expires` and `created_by` are recognized; every
/// other key is carried through untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AnnotationMetadata {
    /// Date or timestamp at which the annotation stops applying.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}
