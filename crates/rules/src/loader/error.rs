//! Error types and load result structures for the file store.

use std::path::PathBuf;

use crate::store::StoreError;
use crate::validation::ValidationResult;

/// Errors that can occur while loading or writing annotation files.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// Filesystem I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The document parsed but failed validation.
    #[error("invalid annotation: {0}")]
    Invalid(ValidationResult),

    /// Another file already defines this id.
    #[error("duplicate annotation id '{id}' (already loaded from {existing})")]
    DuplicateId { id: String, existing: String },

    /// Filesystem watcher error.
    #[error("Notify watcher error: {0}")]
    Notify(#[from] notify::Error),
}

/// Result alias for file store operations.
pub type Result<T> = std::result::Result<T, RuleError>;

impl From<RuleError> for StoreError {
    fn from(err: RuleError) -> Self {
        match err {
            RuleError::Io(e) => StoreError::Io(e),
            RuleError::Yaml(e) => StoreError::Yaml(e),
            RuleError::Invalid(result) => StoreError::Rejected(result),
            RuleError::Notify(e) => StoreError::Watch(e),
            dup @ RuleError::DuplicateId { .. } => StoreError::Corrupt(dup.to_string()),
        }
    }
}

/// Outcome of loading a single annotation file.
#[derive(Debug)]
pub struct LoadResult {
    /// Path to the file that was loaded.
    pub path: PathBuf,
    /// Status of the load attempt.
    pub status: LoadStatus,
}

/// Status of a single file load attempt.
#[derive(Debug)]
pub enum LoadStatus {
    /// Annotation was successfully loaded.
    Loaded { rule_id: String },
    /// File was skipped (dotfile, non-YAML, etc.).
    Skipped { reason: String },
    /// Parse or validation error occurred.
    Failed { error: String },
}
