//! Annotation persistence behind the [`AnnotationStore`] trait.
//!
//! Stores answer coarse candidate queries: every rule that could match the
//! query target must be returned, false positives are fine because the
//! evaluator filters exactly. Implementations:
//! - [`MemoryStore`]: indexed in-process store
//! - [`FileStore`](crate::loader::FileStore): YAML files with hot reload
//! - [`OpenSearchStore`]: search-engine index behind an injected client

mod index;
mod memory;
pub mod opensearch;

use std::sync::Arc;

use archivist_core::{is_within, FileRecord, ItemType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::rule::Rule;
use crate::schema::{Annotation, MergeStrategy};
use crate::validation::{compile, ValidationResult};

pub use index::RuleIndex;
pub use memory::MemoryStore;
pub use opensearch::{HttpSearchClient, OpenSearchStore, SearchClient, SearchHits};

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("annotation store unavailable: {0}")]
    Unavailable(String),

    #[error("annotation store query timed out after {0}ms")]
    Timeout(u64),

    #[error("annotation '{0}' not found")]
    NotFound(String),

    #[error("annotation rejected: {0}")]
    Rejected(ValidationResult),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("corrupt store entry: {0}")]
    Corrupt(String),

    #[error("backend returned {status}: {message}")]
    Backend { status: u16, message: String },
}

impl StoreError {
    /// Errors worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Unavailable(_) | StoreError::Timeout(_) => true,
            StoreError::Backend { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

// ── Queries ─────────────────────────────────────────────────────────

/// What a candidate query is asked about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryTarget {
    /// One record: its path and parent directory.
    Record { path: String, directory: String },
    /// Every entry of a directory partition.
    Directory(String),
}

/// Coarse, indexable description of the rules worth evaluating.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateQuery {
    pub target: QueryTarget,
    pub ext: Option<String>,
    pub item_type: Option<ItemType>,
    /// Rules expired at this instant may be left out.
    pub now: DateTime<Utc>,
}

impl CandidateQuery {
    pub fn for_record(record: &FileRecord, now: DateTime<Utc>) -> Self {
        Self {
            target: QueryTarget::Record {
                path: record.path.clone(),
                directory: record.directory.clone(),
            },
            ext: Some(record.ext.clone()),
            item_type: Some(record.item_type),
            now,
        }
    }

    pub fn for_directory(directory: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            target: QueryTarget::Directory(directory.into()),
            ext: None,
            item_type: None,
            now,
        }
    }

    /// Label for log fields.
    pub fn scope(&self) -> &str {
        match &self.target {
            QueryTarget::Record { path, .. } => path,
            QueryTarget::Directory(dir) => dir,
        }
    }

    /// Attribute narrowing: a rule constraint must be absent or equal.
    pub(crate) fn admits_attributes(&self, rule: &Rule) -> bool {
        let ext_ok = match (&self.ext, &rule.predicate.ext) {
            (Some(wanted), Some(ext)) => wanted.eq_ignore_ascii_case(ext),
            _ => true,
        };
        let type_ok = match (self.item_type, rule.predicate.item_type) {
            (Some(wanted), Some(item_type)) => wanted == item_type,
            _ => true,
        };
        ext_ok && type_ok
    }
}

/// Inventory filters for [`AnnotationStore::search`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchFilters {
    /// Rule scope must lie inside this subtree. Unscoped rules have scope `/`.
    pub under: Option<String>,
    pub ext: Option<String>,
    /// Every key must be present in the payload.
    pub annotation_keys: Vec<String>,
    pub merge_strategy: Option<MergeStrategy>,
    pub include_expired: bool,
}

impl SearchFilters {
    pub fn matches(&self, rule: &Rule, now: DateTime<Utc>) -> bool {
        if !self.include_expired && rule.is_expired(now) {
            return false;
        }
        if let Some(under) = &self.under {
            let scope = rule_scope(rule);
            if !is_within(scope, &archivist_core::normalize_path(under)) {
                return false;
            }
        }
        if let Some(ext) = &self.ext {
            let wanted = normalize_ext(ext);
            if !rule.predicate.ext.as_deref().is_some_and(|e| e == wanted) {
                return false;
            }
        }
        if let Some(strategy) = self.merge_strategy {
            if rule.merge_strategy() != strategy {
                return false;
            }
        }
        self.annotation_keys
            .iter()
            .all(|key| rule.payload().contains_key(key))
    }
}

/// Deepest spatial anchor of a rule: its `path`, else its `under`, else `/`.
pub fn rule_scope(rule: &Rule) -> &str {
    rule.predicate
        .spatial
        .exact_path()
        .or_else(|| rule.predicate.spatial.under())
        .unwrap_or("/")
}

pub(crate) fn normalize_ext(ext: &str) -> String {
    let ext = ext.trim().to_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{ext}")
    }
}

// ── Trait ───────────────────────────────────────────────────────────

/// Persistence and retrieval of annotation rules.
#[async_trait::async_trait]
pub trait AnnotationStore: Send + Sync {
    /// Validate and persist, returning the id. Assigns an id and
    /// `created_at` when absent. Rejected documents are never stored.
    async fn save(&self, annotation: Annotation) -> Result<String, StoreError>;

    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<Annotation, StoreError>;

    /// A superset of the rules that can match the query target.
    async fn query_candidates(&self, query: &CandidateQuery) -> Result<Vec<Arc<Rule>>, StoreError>;

    /// Inventory listing, sorted by id.
    async fn search(&self, filters: &SearchFilters) -> Result<Vec<Annotation>, StoreError>;
}

/// Assign missing id / `created_at` and compile. Shared by every store's
/// `save`.
pub fn prepare(mut annotation: Annotation, now: DateTime<Utc>) -> Result<Arc<Rule>, StoreError> {
    if annotation.id.is_none() {
        annotation.id = Some(uuid::Uuid::new_v4().to_string());
    }
    if annotation.created_at.is_none() {
        annotation.created_at = Some(now);
    }
    let rule = compile(annotation).map_err(StoreError::Rejected)?;
    info!(rule_id = %rule.id(), strategy = %rule.merge_strategy(), "annotation accepted");
    Ok(Arc::new(rule))
}

#[cfg(test)]
mod tests;
