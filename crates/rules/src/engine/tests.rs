//! Engine tests over the worked example annotations `a` through `e`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use archivist_core::{AnnotationValue, FileRecord, ItemType};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::bulk::FileOutcome;
use crate::schema::MergeStrategy;
use crate::source::MemoryRecordSource;
use crate::store::{CandidateQuery, MemoryStore};
use crate::validation::parse_yaml;

const A: &str = "id: a\napplies_to:\n  ext: .nc\nannotation:\n  format: NetCDF-4\nmerge_strategy: default\nmetadata:\n  created_by: scanner\n";
const B: &str = "id: b\napplies_to:\n  path: /data/cmip5\nannotation:\n  storage_plan: tape only\nmerge_strategy: override\nmetadata:\n  created_by: SJP\n";
const C: &str = "id: c\napplies_to:\n  under: /data\n  smaller: 1000\nannotation:\n  note: tiny file\nmerge_strategy: addition\ncreated_at: 2024-01-10T09:00:00Z\n";
const D: &str = "id: d\napplies_to:\n  under: /data\n  smaller: 1000000000\nannotation:\n  note: not huge\nmerge_strategy: addition\ncreated_at: 2024-02-14T09:00:00Z\n";
const E: &str = "id: e\napplies_to:\n  ext: .txt\nannotation:\n  format: Text\nmerge_strategy: default\nmetadata:\n  created_by: scanner\n";

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

fn records() -> Vec<FileRecord> {
    vec![
        FileRecord::dir("/data", day(2024, 3, 1)),
        FileRecord::dir("/data/cmip5", day(2024, 3, 20)),
        FileRecord::file("/data/cmip5/file123.nc", 234, day(2024, 3, 20)),
        FileRecord::file("/data/cmip5/readme.txt", 5120, day(2024, 3, 18)),
        FileRecord::file("/data/obs/tas_20240105.nc", 2_500_000_000, day(2024, 1, 6)),
        FileRecord::new("/data/obs/latest", None, ItemType::Link, day(2024, 1, 6)),
        FileRecord::file("/scratch/tmp.dat", 10, day(2024, 2, 1)),
    ]
}

fn store_with(docs: &[&str]) -> MemoryStore {
    MemoryStore::with_annotations(docs.iter().map(|yaml| parse_yaml(yaml).unwrap())).unwrap()
}

fn options() -> EngineOptions {
    EngineOptions {
        worker_threads: 2,
        partition_concurrency: 2,
        ..EngineOptions::default()
    }
}

fn engine_with(store: impl AnnotationStore + 'static) -> AnnotationEngine {
    AnnotationEngine::new(
        Arc::new(store),
        Arc::new(MemoryRecordSource::new(records())),
        options(),
    )
    .unwrap()
}

fn engine(extra: &[&str]) -> AnnotationEngine {
    let mut docs = vec![A, B, C, D, E];
    docs.extend_from_slice(extra);
    engine_with(store_with(&docs))
}

fn file123() -> FileRecord {
    FileRecord::file("/data/cmip5/file123.nc", 234, day(2024, 3, 20))
}

fn text(value: &str) -> AnnotationValue {
    AnnotationValue::Text(value.to_string())
}

// ── Single record ───────────────────────────────────────────────────

#[tokio::test]
async fn worked_example_merges_all_three_strategies() {
    let result = engine(&[]).annotated_record(&file123(), now()).await.unwrap();

    assert_eq!(
        result.to_json(),
        json!({
            "path": "/data/cmip5/file123.nc",
            "directory": "/data/cmip5",
            "name": "file123.nc",
            "size": 234,
            "item_type": "file",
            "last_modified": "2024-03-20T00:00:00Z",
            "format": "NetCDF-4",
            "note": ["tiny file", "not huge"],
            "storage_plan": "tape only"
        })
    );
    assert_eq!(result.rule_ids, vec!["a", "c", "d", "b"]);
}

#[tokio::test]
async fn find_annotations_ranks_least_specific_first() {
    let ranked = engine(&[]).find_annotations_for(&file123(), now()).await.unwrap();
    let ids: Vec<&str> = ranked.iter().map(|r| r.id()).collect();
    assert_eq!(ids, vec!["a", "c", "d", "b"]);
}

#[tokio::test]
async fn unmatched_record_keeps_only_its_fields() {
    let record = FileRecord::file("/scratch/tmp.dat", 10, day(2024, 2, 1));
    let result = engine(&[]).annotated_record(&record, now()).await.unwrap();
    assert!(result.annotations.is_empty());
    assert!(result.rule_ids.is_empty());
    assert_eq!(result.get("name"), Some(json!("tmp.dat")));
}

#[tokio::test]
async fn results_are_independent_of_store_order() {
    let forward = engine_with(store_with(&[A, B, C, D, E]));
    let backward = engine_with(store_with(&[E, D, C, B, A]));
    let first = forward.annotated_record(&file123(), now()).await.unwrap();
    let second = backward.annotated_record(&file123(), now()).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(
        first.to_json(),
        forward.annotated_record(&file123(), now()).await.unwrap().to_json()
    );
}

#[tokio::test]
async fn more_specific_default_wins() {
    let f = "id: f\napplies_to:\n  under: /data/cmip5\n  ext: .nc\nannotation:\n  format: NetCDF-3\nmerge_strategy: default\n";
    let result = engine(&[f]).annotated_record(&file123(), now()).await.unwrap();
    assert_eq!(result.annotations["format"], text("NetCDF-3"));
}

#[tokio::test]
async fn override_beats_default_regardless_of_specificity() {
    let g = "id: g\napplies_to: {}\nannotation:\n  format: archived\nmerge_strategy: override\n";
    let result = engine(&[g]).annotated_record(&file123(), now()).await.unwrap();
    assert_eq!(result.annotations["format"], text("archived"));
    assert_eq!(result.rule_ids.first().map(String::as_str), Some("g"));
}

#[tokio::test]
async fn addition_after_default_is_dropped() {
    let h = "id: h\napplies_to:\n  under: /data/cmip5\nannotation:\n  format: extra\nmerge_strategy: addition\n";
    let result = engine(&[h]).annotated_record(&file123(), now()).await.unwrap();
    assert_eq!(result.annotations["format"], text("NetCDF-4"));
}

#[tokio::test]
async fn expired_annotations_stop_applying() {
    let embargo = "id: embargo\napplies_to:\n  under: /data/cmip5\nannotation:\n  status: embargoed\nmerge_strategy: override\nmetadata:\n  expires: 2024-05-01T00:00:00Z\n";
    let engine = engine(&[embargo]);

    let before = engine.annotated_record(&file123(), day(2024, 4, 1)).await.unwrap();
    assert_eq!(before.annotations["status"], text("embargoed"));

    let after = engine.annotated_record(&file123(), now()).await.unwrap();
    assert!(!after.annotations.contains_key("status"));

    let at_expiry = engine.annotated_record(&file123(), day(2024, 5, 1)).await.unwrap();
    assert!(!at_expiry.annotations.contains_key("status"));
}

#[tokio::test]
async fn record_field_keys_are_shadowed() {
    let bad = "id: bad\napplies_to: {}\nannotation:\n  size: 99\n  owner: ops\nmerge_strategy: override\n";
    let result = engine(&[bad]).annotated_record(&file123(), now()).await.unwrap();
    assert_eq!(result.get("size"), Some(json!(234)));
    assert_eq!(result.get("owner"), Some(json!("ops")));
}

#[tokio::test]
async fn annotated_path_uses_the_record_source() {
    let engine = engine(&[]);
    let result = engine.annotated_path("/data/cmip5/readme.txt", now()).await.unwrap();
    assert_eq!(result.annotations["format"], text("Text"));
    assert_eq!(result.annotations["note"], text("not huge"));

    let err = engine.annotated_path("/data/missing.nc", now()).await.unwrap_err();
    assert!(matches!(err, EngineError::Source(SourceError::RecordNotFound(_))));
}

// ── Authoring helpers ───────────────────────────────────────────────

fn matched_paths(records: &[FileRecord]) -> Vec<&str> {
    records.iter().map(|r| r.path.as_str()).collect()
}

#[tokio::test]
async fn matched_by_defaults_to_rule_scope() {
    let draft = parse_yaml(
        "applies_to:\n  under: /data\n  smaller: 1000\nannotation:\n  note: tiny\nmerge_strategy: addition\n",
    )
    .unwrap();
    let matched = engine(&[]).find_records_matched_by(&draft, None, now()).await.unwrap();
    assert_eq!(matched_paths(&matched), vec!["/data/cmip5/file123.nc"]);
}

#[tokio::test]
async fn matched_by_honours_scope_hint() {
    let draft = parse_yaml(A).unwrap();
    let engine = engine(&[]);

    let everywhere = engine.find_records_matched_by(&draft, None, now()).await.unwrap();
    assert_eq!(
        matched_paths(&everywhere),
        vec!["/data/cmip5/file123.nc", "/data/obs/tas_20240105.nc"]
    );

    let narrowed = engine
        .find_records_matched_by(&draft, Some("/data/obs/"), now())
        .await
        .unwrap();
    assert_eq!(matched_paths(&narrowed), vec!["/data/obs/tas_20240105.nc"]);
}

#[tokio::test]
async fn matched_by_ignores_expiry_and_rejects_invalid_drafts() {
    let engine = engine(&[]);
    let expired = parse_yaml(E).unwrap().with_expires("2020-01-01T00:00:00Z");
    let matched = engine.find_records_matched_by(&expired, None, now()).await.unwrap();
    assert_eq!(matched_paths(&matched), vec!["/data/cmip5/readme.txt"]);

    let mut invalid = parse_yaml(E).unwrap();
    invalid.applies_to.filename_regex = Some("(".into());
    let err = engine.find_records_matched_by(&invalid, None, now()).await.unwrap_err();
    assert!(matches!(err, EngineError::Invalid(_)));
}

fn rule_ids(ranked: &[Arc<Rule>]) -> Vec<&str> {
    ranked.iter().map(|r| r.id()).collect()
}

#[tokio::test]
async fn directory_annotations_cover_every_entry_kind() {
    // .nc (234 bytes) and .txt (5120 bytes) entries.
    let ranked = engine(&[])
        .annotations_for_directory("/data/cmip5/", now())
        .await
        .unwrap();
    assert_eq!(rule_ids(&ranked), vec!["a", "e", "c", "d", "b"]);
}

#[tokio::test]
async fn directory_annotations_need_a_matching_entry() {
    // Only a 2.5 GB .nc file and a size-less link.
    let ranked = engine(&[])
        .annotations_for_directory("/data/obs", now())
        .await
        .unwrap();
    assert_eq!(rule_ids(&ranked), vec!["a"]);

    let ranked = engine(&[])
        .annotations_for_directory("/scratch", now())
        .await
        .unwrap();
    assert!(ranked.is_empty());
}

#[tokio::test]
async fn directory_annotations_skip_expired_rules() {
    let gone = "id: gone\napplies_to:\n  ext: .txt\nannotation:\n  k: v\nmerge_strategy: default\nmetadata:\n  expires: 2024-05-01\n";
    let ranked = engine(&[gone])
        .annotations_for_directory("/data/cmip5", now())
        .await
        .unwrap();
    assert!(!rule_ids(&ranked).contains(&"gone"));
}

#[tokio::test]
async fn search_delegates_to_the_store() {
    let filters = SearchFilters {
        annotation_keys: vec!["note".into()],
        ..SearchFilters::default()
    };
    let found = engine(&[]).search_annotations(&filters).await.unwrap();
    let ids: Vec<Option<&str>> = found.iter().map(|a| a.id()).collect();
    assert_eq!(ids, vec![Some("c"), Some("d")]);

    let defaults = SearchFilters {
        merge_strategy: Some(MergeStrategy::Default),
        ..SearchFilters::default()
    };
    assert_eq!(engine(&[]).search_annotations(&defaults).await.unwrap().len(), 2);
}

// ── Bulk ────────────────────────────────────────────────────────────

#[tokio::test]
async fn apply_under_counts_every_outcome() {
    let report = engine(&[])
        .apply_under("/data", now(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.partitions, 4);
    assert_eq!(report.enriched, 4);
    assert_eq!(report.unmatched, 2);
    assert_eq!(report.failed, 0);
    assert_eq!(report.skipped, 0);
    assert!(!report.cancelled);

    let paths: Vec<&str> = report.results.iter().map(|r| r.path.as_str()).collect();
    assert_eq!(
        paths,
        vec![
            "/data",
            "/data/cmip5",
            "/data/cmip5/file123.nc",
            "/data/cmip5/readme.txt",
            "/data/obs/latest",
            "/data/obs/tas_20240105.nc",
        ]
    );
    match &report.results[2].outcome {
        FileOutcome::Enriched { result } => {
            assert_eq!(result.rule_ids, vec!["a", "c", "d", "b"]);
        }
        other => panic!("expected enrichment, got {other:?}"),
    }
}

#[tokio::test]
async fn bulk_agrees_with_single_record_path() {
    let engine = engine(&[]);
    let report = engine
        .apply_under("/", now(), CancellationToken::new())
        .await
        .unwrap();
    for file in &report.results {
        let single = engine.annotated_path(&file.path, now()).await.unwrap();
        match &file.outcome {
            FileOutcome::Enriched { result } => assert_eq!(result, &single),
            FileOutcome::Unmatched => assert!(single.rule_ids.is_empty()),
            FileOutcome::Failed { error } => panic!("{}: {error}", file.path),
        }
    }
    assert_eq!(report.success_count(), 7);
}

#[tokio::test]
async fn cancelled_run_skips_remaining_files() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = engine(&[]).apply_under("/data", now(), cancel).await.unwrap();
    assert!(report.cancelled);
    assert_eq!(report.skipped, 6);
    assert!(report.results.is_empty());
}

/// Counts candidate queries reaching the store.
struct CountingStore {
    inner: MemoryStore,
    queries: AtomicUsize,
}

#[async_trait::async_trait]
impl AnnotationStore for CountingStore {
    async fn save(&self, annotation: Annotation) -> Result<String, StoreError> {
        self.inner.save(annotation).await
    }
    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.inner.delete(id).await
    }
    async fn get(&self, id: &str) -> Result<Annotation, StoreError> {
        self.inner.get(id).await
    }
    async fn query_candidates(&self, query: &CandidateQuery) -> Result<Vec<Arc<Rule>>, StoreError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.query_candidates(query).await
    }
    async fn search(&self, filters: &SearchFilters) -> Result<Vec<Annotation>, StoreError> {
        self.inner.search(filters).await
    }
}

#[tokio::test]
async fn cancelled_run_stops_querying_the_store() {
    let store = Arc::new(CountingStore {
        inner: store_with(&[A, B, C, D, E]),
        queries: AtomicUsize::new(0),
    });
    let engine = AnnotationEngine::new(
        store.clone(),
        Arc::new(MemoryRecordSource::new(records())),
        options(),
    )
    .unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = engine.apply_under("/", now(), cancel).await.unwrap();

    assert!(report.cancelled);
    assert_eq!(report.skipped, 7);
    assert_eq!(store.queries.load(Ordering::SeqCst), 0);
}

/// Fails directory queries for one partition with a permanent error.
struct PartitionFailingStore {
    inner: MemoryStore,
    broken: &'static str,
}

#[async_trait::async_trait]
impl AnnotationStore for PartitionFailingStore {
    async fn save(&self, annotation: Annotation) -> Result<String, StoreError> {
        self.inner.save(annotation).await
    }
    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.inner.delete(id).await
    }
    async fn get(&self, id: &str) -> Result<Annotation, StoreError> {
        self.inner.get(id).await
    }
    async fn query_candidates(&self, query: &CandidateQuery) -> Result<Vec<Arc<Rule>>, StoreError> {
        if query.scope() == self.broken {
            return Err(StoreError::Corrupt("shard offline".into()));
        }
        self.inner.query_candidates(query).await
    }
    async fn search(&self, filters: &SearchFilters) -> Result<Vec<Annotation>, StoreError> {
        self.inner.search(filters).await
    }
}

#[tokio::test]
async fn failed_partition_does_not_abort_the_run() {
    let engine = engine_with(PartitionFailingStore {
        inner: store_with(&[A, B, C, D, E]),
        broken: "/data/obs",
    });
    let report = engine
        .apply_under("/data", now(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.failed, 2);
    assert_eq!(report.enriched, 3);
    assert_eq!(report.unmatched, 1);
    let failed: Vec<&str> = report
        .results
        .iter()
        .filter(|r| matches!(r.outcome, FileOutcome::Failed { .. }))
        .map(|r| r.path.as_str())
        .collect();
    assert_eq!(failed, vec!["/data/obs/latest", "/data/obs/tas_20240105.nc"]);
}

/// Returns two different rules sharing one id.
struct DuplicatingStore;

#[async_trait::async_trait]
impl AnnotationStore for DuplicatingStore {
    async fn save(&self, _annotation: Annotation) -> Result<String, StoreError> {
        Err(StoreError::Unavailable("read only".into()))
    }
    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        Err(StoreError::NotFound(id.to_string()))
    }
    async fn get(&self, id: &str) -> Result<Annotation, StoreError> {
        Err(StoreError::NotFound(id.to_string()))
    }
    async fn query_candidates(&self, _query: &CandidateQuery) -> Result<Vec<Arc<Rule>>, StoreError> {
        let first = "id: twin\napplies_to: {}\nannotation:\n  k: one\nmerge_strategy: default\n";
        let second = "id: twin\napplies_to: {}\nannotation:\n  k: two\nmerge_strategy: override\n";
        Ok(vec![
            Arc::new(compile(parse_yaml(first).unwrap()).unwrap()),
            Arc::new(compile(parse_yaml(second).unwrap()).unwrap()),
        ])
    }
    async fn search(&self, _filters: &SearchFilters) -> Result<Vec<Annotation>, StoreError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn duplicate_ids_abort_single_and_bulk_operations() {
    let engine = engine_with(DuplicatingStore);

    let err = engine.annotated_record(&file123(), now()).await.unwrap_err();
    assert!(matches!(&err, EngineError::DuplicateRuleId(id) if id == "twin"));
    assert!(err.is_invariant_violation());

    let err = engine
        .apply_under("/data", now(), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.is_invariant_violation());
}

#[test]
fn options_follow_config() {
    let mut config = archivist_core::Config::for_profile("");
    config.engine.worker_threads = 3;
    config.engine.date_formats = vec!["iso".into()];
    let options = EngineOptions::from_config(&config).unwrap();
    assert_eq!(options.worker_threads, 3);
    assert_eq!(options.recognizer.formats().len(), 1);

    config.engine.date_formats = vec!["julian".into()];
    assert!(matches!(
        EngineOptions::from_config(&config),
        Err(EngineError::Config(_))
    ));
}
