//! Index settings and query DSL builders.
//!
//! Each attribute clause follows the same shape: the rule either leaves the
//! attribute out or names the queried value. The `*.tree` sub-fields use a
//! path-hierarchy tokenizer so one term on `/data/cmip5` finds every rule
//! scoped at or below that directory.

use archivist_core::ancestors;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};

use crate::rule::Rule;
use crate::store::{CandidateQuery, QueryTarget, SearchFilters};

/// Field holding the payload keys of an indexed annotation.
pub const KEYS_FIELD: &str = "annotation_keys";

/// Index settings and mappings.
pub fn index_settings() -> Value {
    let hierarchy = json!({
        "type": "keyword",
        "fields": {"tree": {"type": "text", "analyzer": "path_analyzer"}}
    });
    json!({
        "settings": {
            "index": {"number_of_shards": "1", "number_of_replicas": "1"},
            "analysis": {
                "analyzer": {"path_analyzer": {"tokenizer": "path_tokenizer"}},
                "tokenizer": {"path_tokenizer": {"type": "path_hierarchy"}}
            }
        },
        "mappings": {"properties": {
            "id": {"type": "keyword"},
            "applies_to": {"properties": {
                "under": hierarchy,
                "path": hierarchy,
                "ext": {"type": "keyword"},
                "item_type": {"type": "keyword"}
            }},
            "annotation": {"type": "object", "enabled": false},
            (KEYS_FIELD): {"type": "keyword"},
            "merge_strategy": {"type": "keyword"},
            "metadata": {"properties": {"expires": {"type": "date"}}},
            "created_at": {"type": "date"}
        }}
    })
}

/// Document body for `rule`, with normalized scope fields and the payload
/// key list used by inventory search.
pub fn indexed_document(rule: &Rule) -> Result<Value, serde_json::Error> {
    let mut doc = serde_json::to_value(rule.document())?;
    if let Some(applies) = doc.get_mut("applies_to").and_then(Value::as_object_mut) {
        let spatial = &rule.predicate.spatial;
        if let Some(under) = spatial.under() {
            applies.insert("under".into(), json!(under));
        }
        if let Some(path) = spatial.exact_path() {
            applies.insert("path".into(), json!(path));
        }
        if let Some(ext) = &rule.predicate.ext {
            applies.insert("ext".into(), json!(ext));
        }
    }
    if let Some(obj) = doc.as_object_mut() {
        let keys: Vec<&String> = rule.payload().keys().collect();
        obj.insert(KEYS_FIELD.into(), json!(keys));
        if let Some(expires) = rule.expires {
            if let Some(meta) = obj.get_mut("metadata").and_then(Value::as_object_mut) {
                meta.insert("expires".into(), json!(timestamp(expires)));
            }
        }
    }
    Ok(doc)
}

/// Strip derived fields so the source deserializes as an annotation.
pub fn source_to_annotation_value(mut source: Value) -> Value {
    if let Some(obj) = source.as_object_mut() {
        obj.remove(KEYS_FIELD);
    }
    source
}

fn timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn absent(field: &str) -> Value {
    json!({"bool": {"must_not": [{"exists": {"field": field}}]}})
}

/// `field` is absent or one of `values`.
fn absent_or_terms(field: &str, values: &[String]) -> Value {
    json!({"bool": {
        "should": [absent(field), {"terms": {(field): values}}],
        "minimum_should_match": 1
    }})
}

fn expired(now: DateTime<Utc>) -> Value {
    json!({"range": {"metadata.expires": {"lte": timestamp(now)}}})
}

/// Candidate query DSL.
pub fn candidate_query(query: &CandidateQuery, size: usize) -> Value {
    let global = json!({"bool": {"must_not": [
        {"exists": {"field": "applies_to.under"}},
        {"exists": {"field": "applies_to.path"}}
    ]}});

    let mut spatial = vec![global];
    match &query.target {
        QueryTarget::Record { path, directory } => {
            spatial.push(json!({"terms": {"applies_to.under": ancestors(path)}}));
            spatial.push(json!({"terms": {"applies_to.path": [path, directory]}}));
        }
        // Path-hierarchy tokens never include a bare `/`, and every
        // scoped rule can reach some entry of the root directory.
        QueryTarget::Directory(dir) if dir == "/" => {
            spatial.push(json!({"match_all": {}}));
        }
        QueryTarget::Directory(dir) => {
            spatial.push(json!({"terms": {"applies_to.under": ancestors(dir)}}));
            spatial.push(json!({"term": {"applies_to.under.tree": dir}}));
            spatial.push(json!({"term": {"applies_to.path.tree": dir}}));
        }
    }

    let mut filter = vec![json!({"bool": {"should": spatial, "minimum_should_match": 1}})];
    if let Some(ext) = &query.ext {
        filter.push(absent_or_terms("applies_to.ext", &[ext.to_lowercase()]));
    }
    if let Some(item_type) = query.item_type {
        filter.push(absent_or_terms(
            "applies_to.item_type",
            &[item_type.as_str().to_string()],
        ));
    }

    json!({
        "size": size,
        "sort": [{"id": "asc"}],
        "query": {"bool": {
            "filter": filter,
            "must_not": [expired(query.now)]
        }}
    })
}

/// Inventory search DSL. Results are re-checked locally, so this only
/// needs to be a superset.
pub fn search_query(filters: &SearchFilters, now: DateTime<Utc>, size: usize) -> Value {
    let mut filter = Vec::new();
    if let Some(ext) = &filters.ext {
        filter.push(json!({"term": {"applies_to.ext": crate::store::normalize_ext(ext)}}));
    }
    if let Some(strategy) = filters.merge_strategy {
        filter.push(json!({"term": {"merge_strategy": strategy.as_str()}}));
    }
    for key in &filters.annotation_keys {
        filter.push(json!({"term": {(KEYS_FIELD): key}}));
    }
    if let Some(under) = &filters.under {
        let under = archivist_core::normalize_path(under);
        if under != "/" {
            filter.push(json!({"bool": {
                "should": [
                    {"term": {"applies_to.under.tree": under}},
                    {"term": {"applies_to.path.tree": under}}
                ],
                "minimum_should_match": 1
            }}));
        }
    }

    let mut bool_query = json!({"filter": filter});
    if !filters.include_expired {
        bool_query["must_not"] = json!([expired(now)]);
    }
    json!({
        "size": size,
        "sort": [{"id": "asc"}],
        "query": {"bool": bool_query}
    })
}

/// `body` continued after the hit whose sort values are `cursor`.
pub fn after(body: &Value, cursor: &[Value]) -> Value {
    let mut next = body.clone();
    next["search_after"] = json!(cursor);
    next
}

/// Lookup of one document by id.
pub fn id_query(id: &str) -> Value {
    json!({"size": 1, "query": {"ids": {"values": [id]}}})
}
