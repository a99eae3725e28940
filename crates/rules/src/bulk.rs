//! Bulk application of annotations to every record under a prefix.
//!
//! Records are partitioned by directory. Each partition issues one
//! directory-scoped candidate query (at most `partition_concurrency` in
//! flight) and its files are then evaluated in memory on the rayon pool.
//! The cancellation token is checked before every file and ends the
//! query stream, so no further partitions are queried; files never
//! evaluated count as skipped.
//!
//! A failed store query fails only its partition. Invariant violations
//! abort the whole run.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use archivist_core::FileRecord;
use futures::stream::{self, StreamExt};
use rayon::prelude::*;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::engine::{merged_result, rank_or_abort, AnnotationEngine, EngineError, EvaluationContext};
use crate::evaluator::Evaluator;
use crate::merge::MergedResult;
use crate::rule::Rule;

// ── Outcomes ────────────────────────────────────────────────────────

/// What happened to one file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FileOutcome {
    /// At least one annotation applied.
    Enriched { result: MergedResult },
    /// No annotation applied.
    Unmatched,
    /// The file's partition could not be evaluated.
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileResult {
    pub path: String,
    #[serde(flatten)]
    pub outcome: FileOutcome,
}

/// Summary of a bulk run. `results` is ordered by path.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulkReport {
    pub prefix: String,
    pub partitions: usize,
    pub enriched: usize,
    pub unmatched: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: bool,
    pub elapsed_ms: u64,
    pub results: Vec<FileResult>,
}

impl BulkReport {
    /// Files evaluated without error.
    pub fn success_count(&self) -> usize {
        self.enriched + self.unmatched
    }

    fn record(&mut self, result: FileResult) {
        match result.outcome {
            FileOutcome::Enriched { .. } => self.enriched += 1,
            FileOutcome::Unmatched => self.unmatched += 1,
            FileOutcome::Failed { .. } => self.failed += 1,
        }
        self.results.push(result);
    }
}

// ── Run ─────────────────────────────────────────────────────────────

pub(crate) async fn apply_under(
    engine: &AnnotationEngine,
    prefix: &str,
    ctx: EvaluationContext,
    cancel: CancellationToken,
) -> Result<BulkReport, EngineError> {
    let start = Instant::now();
    let records = engine.source().list_under(prefix).await?;

    let total = records.len();
    let mut partitions: BTreeMap<String, Vec<FileRecord>> = BTreeMap::new();
    for record in records {
        partitions
            .entry(record.directory.clone())
            .or_default()
            .push(record);
    }

    let mut report = BulkReport {
        prefix: prefix.to_string(),
        partitions: partitions.len(),
        ..Default::default()
    };
    info!(prefix = %prefix, partitions = partitions.len(), "bulk run started");

    // Cancellation drops in-flight queries and stops issuing new ones.
    let planner = engine.planner();
    let mut queries = std::pin::pin!(stream::iter(partitions)
        .map(|(dir, files)| async move {
            let candidates = planner.candidates_for_directory(&dir, ctx.now).await;
            (dir, files, candidates)
        })
        .buffer_unordered(engine.partition_concurrency())
        .take_until(cancel.cancelled()));

    while let Some((dir, files, candidates)) = queries.next().await {
        if cancel.is_cancelled() {
            break;
        }

        let candidates = match candidates {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(directory = %dir, files = files.len(), error = %e, "partition failed");
                let error = e.to_string();
                for file in files {
                    report.record(FileResult {
                        path: file.path,
                        outcome: FileOutcome::Failed {
                            error: error.clone(),
                        },
                    });
                }
                continue;
            }
        };

        let evaluated = evaluate_partition(engine, files, candidates, ctx, cancel.clone()).await?;
        for result in evaluated.into_iter().flatten() {
            report.record(result);
        }
    }
    drop(queries);

    // Files in partitions never pulled, or cut short inside one.
    report.skipped = total - report.results.len();
    report.cancelled = cancel.is_cancelled();
    report.results.sort_by(|a, b| a.path.cmp(&b.path));
    report.elapsed_ms = start.elapsed().as_millis() as u64;

    info!(
        prefix = %prefix,
        enriched = report.enriched,
        unmatched = report.unmatched,
        failed = report.failed,
        skipped = report.skipped,
        cancelled = report.cancelled,
        elapsed_ms = report.elapsed_ms,
        "bulk run finished"
    );
    Ok(report)
}

/// Evaluate one partition on the rayon pool. `None` marks a file skipped
/// after cancellation.
async fn evaluate_partition(
    engine: &AnnotationEngine,
    files: Vec<FileRecord>,
    candidates: Vec<Arc<Rule>>,
    ctx: EvaluationContext,
    cancel: CancellationToken,
) -> Result<Vec<Option<FileResult>>, EngineError> {
    let evaluator = engine.shared_evaluator();
    let pool = engine.pool();

    let outcomes = tokio::task::spawn_blocking(move || {
        pool.install(|| {
            files
                .into_par_iter()
                .map(|file| {
                    if cancel.is_cancelled() {
                        return Ok(None);
                    }
                    evaluate_file(&evaluator, &candidates, file, ctx).map(Some)
                })
                .collect::<Vec<Result<Option<FileResult>, EngineError>>>()
        })
    })
    .await
    .map_err(|e| EngineError::Worker(e.to_string()))?;

    outcomes.into_iter().collect()
}

fn evaluate_file(
    evaluator: &Evaluator,
    candidates: &[Arc<Rule>],
    file: FileRecord,
    ctx: EvaluationContext,
) -> Result<FileResult, EngineError> {
    let matched = evaluator.select(candidates, &file, ctx.now);
    let path = file.path.clone();
    if matched.is_empty() {
        return Ok(FileResult {
            path,
            outcome: FileOutcome::Unmatched,
        });
    }
    let ranked = rank_or_abort(matched)?;
    Ok(FileResult {
        path,
        outcome: FileOutcome::Enriched {
            result: merged_result(file, &ranked),
        },
    })
}
