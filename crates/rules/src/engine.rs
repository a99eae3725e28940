//! Annotation engine: retrieval, evaluation, ranking and merge.
//!
//! Control flow for one record:
//! planner (coarse store query) → evaluator (exact filter, expiry) →
//! ranker (least → most specific) → merge (default, addition, override).

use std::collections::BTreeSet;
use std::sync::Arc;

use archivist_core::{Config, FileRecord};
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::bulk::{self, BulkReport};
use crate::evaluator::{DateRecognizer, Evaluator};
use crate::merge::{merge, MergedResult};
use crate::planner::{Planner, RetryPolicy};
use crate::ranking::rank;
use crate::rule::Rule;
use crate::schema::Annotation;
use crate::source::{RecordSource, SourceError};
use crate::store::{rule_scope, AnnotationStore, SearchFilters, StoreError};
use crate::validation::{compile, ValidationResult};

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("record source error: {0}")]
    Source(#[from] SourceError),

    /// Two distinct rules share an id.
    #[error("duplicate rule id '{0}' in candidate set")]
    DuplicateRuleId(String),

    #[error("invalid annotation: {0}")]
    Invalid(ValidationResult),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("evaluation worker failed: {0}")]
    Worker(String),
}

impl EngineError {
    /// Invariant violations abort whole operations, bulk runs included.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, EngineError::DuplicateRuleId(_))
    }
}

// ── Evaluation context ──────────────────────────────────────────────

/// Per-batch evaluation state. `now` is captured once so every record in a
/// batch sees the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationContext {
    pub now: DateTime<Utc>,
}

impl EvaluationContext {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now }
    }

    pub fn wall_clock() -> Self {
        Self { now: Utc::now() }
    }
}

// ── Engine ──────────────────────────────────────────────────────────

/// Engine tuning, usually derived from [`Config`].
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub recognizer: DateRecognizer,
    pub retry: RetryPolicy,
    pub worker_threads: usize,
    pub partition_concurrency: usize,
}

impl EngineOptions {
    pub fn from_config(config: &Config) -> Result<Self, EngineError> {
        let recognizer =
            DateRecognizer::from_names(&config.engine.date_formats).map_err(EngineError::Config)?;
        Ok(Self {
            recognizer,
            retry: RetryPolicy::from_config(&config.store),
            worker_threads: config.engine.resolved_worker_threads(),
            partition_concurrency: config.engine.partition_concurrency.max(1),
        })
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        let engine = archivist_core::config::EngineConfig::default();
        Self {
            recognizer: DateRecognizer::default(),
            retry: RetryPolicy::default(),
            worker_threads: engine.resolved_worker_threads(),
            partition_concurrency: engine.partition_concurrency,
        }
    }
}

pub struct AnnotationEngine {
    planner: Planner,
    source: Arc<dyn RecordSource>,
    evaluator: Arc<Evaluator>,
    pool: Arc<rayon::ThreadPool>,
    partition_concurrency: usize,
}

impl AnnotationEngine {
    pub fn new(
        store: Arc<dyn AnnotationStore>,
        source: Arc<dyn RecordSource>,
        options: EngineOptions,
    ) -> Result<Self, EngineError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.worker_threads)
            .thread_name(|i| format!("archivist-eval-{i}"))
            .build()
            .map_err(|e| EngineError::Config(e.to_string()))?;

        info!(
            workers = options.worker_threads,
            partition_concurrency = options.partition_concurrency,
            date_formats = ?options.recognizer.formats(),
            "annotation engine ready"
        );

        Ok(Self {
            planner: Planner::new(store, options.retry),
            source,
            evaluator: Arc::new(Evaluator::new(options.recognizer)),
            pool: Arc::new(pool),
            partition_concurrency: options.partition_concurrency,
        })
    }

    pub fn from_config(
        store: Arc<dyn AnnotationStore>,
        source: Arc<dyn RecordSource>,
        config: &Config,
    ) -> Result<Self, EngineError> {
        Self::new(store, source, EngineOptions::from_config(config)?)
    }

    pub fn store(&self) -> &Arc<dyn AnnotationStore> {
        self.planner.store()
    }

    pub fn source(&self) -> &Arc<dyn RecordSource> {
        &self.source
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    pub(crate) fn planner(&self) -> &Planner {
        &self.planner
    }

    pub(crate) fn shared_evaluator(&self) -> Arc<Evaluator> {
        Arc::clone(&self.evaluator)
    }

    pub(crate) fn pool(&self) -> Arc<rayon::ThreadPool> {
        Arc::clone(&self.pool)
    }

    pub(crate) fn partition_concurrency(&self) -> usize {
        self.partition_concurrency
    }

    /// Matching, non-expired rules for `record`, least specific first.
    pub async fn find_annotations_for(
        &self,
        record: &FileRecord,
        now: DateTime<Utc>,
    ) -> Result<Vec<Arc<Rule>>, EngineError> {
        let candidates = self.planner.candidates_for_record(record, now).await?;
        let matched = self.evaluator.select(&candidates, record, now);
        debug!(
            path = %record.path,
            candidates = candidates.len(),
            matched = matched.len(),
            "evaluated candidates"
        );
        rank_or_abort(matched)
    }

    /// `record` with every applicable annotation merged in.
    pub async fn annotated_record(
        &self,
        record: &FileRecord,
        now: DateTime<Utc>,
    ) -> Result<MergedResult, EngineError> {
        let ranked = self.find_annotations_for(record, now).await?;
        Ok(merged_result(record.clone(), &ranked))
    }

    /// Look up `path` in the record source and annotate it.
    pub async fn annotated_path(
        &self,
        path: &str,
        now: DateTime<Utc>,
    ) -> Result<MergedResult, EngineError> {
        let record = self.source.get(path).await?;
        self.annotated_record(&record, now).await
    }

    /// Records the annotation's predicate selects, for authoring. The scope
    /// is `scope_hint`, else the rule's own `path`/`under`, else `/`.
    /// Expiry is ignored.
    pub async fn find_records_matched_by(
        &self,
        annotation: &Annotation,
        scope_hint: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Vec<FileRecord>, EngineError> {
        let mut draft = annotation.clone();
        if draft.id.is_none() {
            draft.id = Some("draft".to_string());
        }
        let rule = compile(draft).map_err(EngineError::Invalid)?;
        let scope = scope_hint
            .map(archivist_core::normalize_path)
            .unwrap_or_else(|| rule_scope(&rule).to_string());

        let records = self.source.list_under(&scope).await?;
        let total = records.len();
        let matched: Vec<FileRecord> = records
            .into_iter()
            .filter(|record| self.evaluator.matches(&rule.predicate, record, now))
            .collect();
        info!(scope = %scope, scanned = total, matched = matched.len(), "predicate preview");
        Ok(matched)
    }

    /// Rules applying to at least one direct entry of `directory`, least
    /// specific first. One directory-scoped candidate query serves every
    /// entry.
    pub async fn annotations_for_directory(
        &self,
        directory: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Arc<Rule>>, EngineError> {
        let directory = archivist_core::normalize_path(directory);
        let entries: Vec<FileRecord> = self
            .source
            .list_under(&directory)
            .await?
            .into_iter()
            .filter(|record| record.directory == directory && record.path != directory)
            .collect();
        let candidates = self.planner.candidates_for_directory(&directory, now).await?;

        let probes: Vec<_> = entries.iter().map(|record| self.evaluator.probe(record)).collect();
        let applying: Vec<Arc<Rule>> = candidates
            .iter()
            .filter(|rule| {
                !rule.is_expired(now) && probes.iter().any(|probe| probe.matches(&rule.predicate, now))
            })
            .cloned()
            .collect();

        let exts: BTreeSet<&str> = entries
            .iter()
            .map(|record| record.ext.as_str())
            .filter(|ext| !ext.is_empty())
            .collect();
        let sizes = entries.iter().filter_map(|record| record.size);
        debug!(
            directory = %directory,
            entries = entries.len(),
            exts = ?exts,
            min_size = ?sizes.clone().min(),
            max_size = ?sizes.max(),
            candidates = candidates.len(),
            applying = applying.len(),
            "directory summary evaluated"
        );
        rank_or_abort(applying)
    }

    /// Inventory search, delegated to the store.
    pub async fn search_annotations(
        &self,
        filters: &SearchFilters,
    ) -> Result<Vec<Annotation>, EngineError> {
        Ok(self.store().search(filters).await?)
    }

    /// Annotate every record under `prefix`.
    pub async fn apply_under(
        &self,
        prefix: &str,
        now: DateTime<Utc>,
        cancel: CancellationToken,
    ) -> Result<BulkReport, EngineError> {
        bulk::apply_under(self, prefix, EvaluationContext::at(now), cancel).await
    }
}

/// Rank matched rules, logging invariant violations.
pub(crate) fn rank_or_abort(matched: Vec<Arc<Rule>>) -> Result<Vec<Arc<Rule>>, EngineError> {
    rank(matched).inspect_err(|e| error!(error = %e, "rule set invariant violated"))
}

pub(crate) fn merged_result(record: FileRecord, ranked: &[Arc<Rule>]) -> MergedResult {
    let payload = merge(ranked);
    let rule_ids = ranked.iter().map(|r| r.id().to_string()).collect();
    MergedResult::new(record, payload, rule_ids)
}

#[cfg(test)]
mod tests;
