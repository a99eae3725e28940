use super::*;
use crate::validation::parse_yaml;
use archivist_core::FileRecord;
use chrono::{Duration, TimeZone};

fn annotation(id: &str, applies_to: &str, strategy: &str) -> Annotation {
    let yaml = format!(
        "id: {id}\napplies_to:\n{applies_to}\nannotation:\n  key-{id}: v\nmerge_strategy: {strategy}\n"
    );
    parse_yaml(&yaml).unwrap()
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
}

async fn seeded() -> MemoryStore {
    let store = MemoryStore::new();
    for (id, applies_to) in [
        ("global", "  ext: .nc"),
        ("data", "  under: /data"),
        ("cmip5", "  under: /data/cmip5"),
        ("deep", "  under: /data/cmip5/day"),
        ("elsewhere", "  under: /database"),
        ("dir-path", "  path: /data/cmip5"),
        ("file-path", "  path: /data/cmip5/file123.nc"),
        ("txt-only", "  under: /data\n  ext: .txt"),
        ("dirs-only", "  under: /data\n  item_type: dir"),
    ] {
        store.save(annotation(id, applies_to, "default")).await.unwrap();
    }
    store
}

fn ids(rules: &[Arc<Rule>]) -> Vec<&str> {
    rules.iter().map(|r| r.id()).collect()
}

#[tokio::test]
async fn record_query_returns_ancestors_paths_and_globals() {
    let store = seeded().await;
    let record = FileRecord::file("/data/cmip5/file123.nc", 234, now());
    let candidates = store
        .query_candidates(&CandidateQuery::for_record(&record, now()))
        .await
        .unwrap();
    assert_eq!(
        ids(&candidates),
        vec!["cmip5", "data", "dir-path", "file-path", "global"]
    );
}

#[tokio::test]
async fn directory_query_includes_descendants() {
    let store = seeded().await;
    let candidates = store
        .query_candidates(&CandidateQuery::for_directory("/data/cmip5", now()))
        .await
        .unwrap();
    assert_eq!(
        ids(&candidates),
        vec![
            "cmip5",
            "data",
            "deep",
            "dir-path",
            "dirs-only",
            "file-path",
            "global",
            "txt-only"
        ]
    );
}

#[tokio::test]
async fn save_assigns_id_and_created_at() {
    let store = MemoryStore::new();
    let doc = parse_yaml("applies_to: {}\nannotation:\n  a: 1\nmerge_strategy: default\n").unwrap();
    let id = store.save(doc).await.unwrap();
    assert!(uuid::Uuid::parse_str(&id).is_ok());
    let stored = store.get(&id).await.unwrap();
    assert_eq!(stored.id(), Some(id.as_str()));
    assert!(stored.created_at.is_some());
}

#[tokio::test]
async fn rejected_annotation_is_not_stored() {
    let store = MemoryStore::new();
    let mut doc = annotation("bad", "  under: /data", "default");
    doc.applies_to.filename_regex = Some("(".into());
    let err = store.save(doc).await.unwrap_err();
    assert!(matches!(err, StoreError::Rejected(_)));
    assert!(store.is_empty());
}

#[tokio::test]
async fn delete_and_missing_ids() {
    let store = seeded().await;
    store.delete("data").await.unwrap();
    assert!(matches!(store.get("data").await, Err(StoreError::NotFound(_))));
    assert!(matches!(store.delete("data").await, Err(StoreError::NotFound(_))));
}

#[tokio::test]
async fn resave_moves_rule_between_indexes() {
    let store = seeded().await;
    store
        .save(annotation("data", "  under: /archive", "default"))
        .await
        .unwrap();
    let record = FileRecord::file("/data/x.nc", 1, now());
    let candidates = store
        .query_candidates(&CandidateQuery::for_record(&record, now()))
        .await
        .unwrap();
    assert!(!ids(&candidates).contains(&"data"));
}

#[tokio::test]
async fn expired_rules_are_left_out_of_candidates() {
    let store = MemoryStore::new();
    let doc = annotation("old", "  under: /data", "default").with_expires("2024-01-01");
    store.save(doc).await.unwrap();
    let record = FileRecord::file("/data/x.nc", 1, now());
    let query = CandidateQuery::for_record(&record, now());
    assert!(store.query_candidates(&query).await.unwrap().is_empty());

    let earlier = CandidateQuery::for_record(&record, now() - Duration::days(365));
    assert_eq!(store.query_candidates(&earlier).await.unwrap().len(), 1);
}

#[tokio::test]
async fn search_filters_combine() {
    let store = seeded().await;
    store
        .save(annotation("add-data", "  under: /data/obs", "addition"))
        .await
        .unwrap();

    let under = SearchFilters {
        under: Some("/data/cmip5/".into()),
        ..Default::default()
    };
    let found: Vec<String> = store
        .search(&under)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|a| a.id)
        .collect();
    assert_eq!(found, vec!["cmip5", "deep", "dir-path", "file-path"]);

    let by_strategy = SearchFilters {
        merge_strategy: Some(MergeStrategy::Addition),
        ..Default::default()
    };
    assert_eq!(store.search(&by_strategy).await.unwrap().len(), 1);

    let by_ext = SearchFilters {
        ext: Some("TXT".into()),
        ..Default::default()
    };
    assert_eq!(store.search(&by_ext).await.unwrap()[0].id(), Some("txt-only"));

    let by_key = SearchFilters {
        annotation_keys: vec!["key-global".into()],
        ..Default::default()
    };
    assert_eq!(store.search(&by_key).await.unwrap()[0].id(), Some("global"));
}

#[tokio::test]
async fn search_hides_expired_unless_asked() {
    let store = MemoryStore::new();
    let doc = annotation("gone", "  under: /data", "default").with_expires("2000-01-01");
    store.save(doc).await.unwrap();
    assert!(store.search(&SearchFilters::default()).await.unwrap().is_empty());
    let all = SearchFilters {
        include_expired: true,
        ..Default::default()
    };
    assert_eq!(store.search(&all).await.unwrap().len(), 1);
}

#[test]
fn transient_errors() {
    assert!(StoreError::Timeout(10).is_transient());
    assert!(StoreError::Unavailable("down".into()).is_transient());
    assert!(!StoreError::NotFound("x".into()).is_transient());
}
