//! Compiled, immutable annotation rules.

use archivist_core::Payload;
use chrono::{DateTime, Utc};

use crate::evaluator::Predicate;
use crate::schema::{Annotation, MergeStrategy};

/// A validated annotation ready for evaluation.
///
/// Rules are shared as `Arc<Rule>` snapshots between the store, in-flight
/// evaluations and callers; nothing mutates them after compilation.
#[derive(Debug, Clone)]
pub struct Rule {
    id: String,
    document: Annotation,
    pub predicate: Predicate,
    pub expires: Option<DateTime<Utc>>,
}

impl Rule {
    /// Assemble a rule from parts produced by validation. `document.id`
    /// is overwritten with `id` so the two never disagree.
    pub(crate) fn from_parts(
        id: String,
        mut document: Annotation,
        predicate: Predicate,
        expires: Option<DateTime<Utc>>,
    ) -> Self {
        document.id = Some(id.clone());
        Self {
            id,
            document,
            predicate,
            expires,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn document(&self) -> &Annotation {
        &self.document
    }

    pub fn payload(&self) -> &Payload {
        &self.document.annotation
    }

    pub fn merge_strategy(&self) -> MergeStrategy {
        self.document.merge_strategy
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.document.created_at
    }

    /// Expired rules are excluded from every match set.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|expires| expires <= now)
    }
}
