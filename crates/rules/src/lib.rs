//! Rule-based annotation engine for archive file records.
//!
//! This crate provides:
//! - YAML annotation documents with validation and fuzzy suggestions
//! - Predicate evaluation over file records (scope, extension, size, dates)
//! - Specificity ranking and the default / addition / override merge
//! - Annotation stores: in-memory, YAML directory with hot-reload, OpenSearch
//! - Candidate retrieval with timeouts and retries, and bulk application

pub mod bulk;
pub mod engine;
pub mod evaluator;
pub mod loader;
pub mod merge;
pub mod planner;
pub mod ranking;
pub mod rule;
pub mod schema;
pub mod source;
pub mod store;
pub mod validation;

pub use bulk::{BulkReport, FileOutcome, FileResult};
pub use engine::{AnnotationEngine, EngineError, EngineOptions, EvaluationContext};
pub use merge::MergedResult;
pub use rule::Rule;
pub use schema::{Annotation, AppliesTo, MergeStrategy};
pub use source::{JsonlRecordSource, MemoryRecordSource, RecordSource};
pub use store::{AnnotationStore, SearchFilters, StoreError};
