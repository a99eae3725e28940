//! Merge of ranked rule payloads into one annotation mapping.
//!
//! Three passes over the ranked rules (least specific first), each
//! restricted to rules of one strategy:
//! - **default**: most specific first, only fills absent keys
//! - **addition**: least specific first, accumulates values from other
//!   addition rules into an ordered list; never replaces a default value
//! - **override**: least specific first, overwrites unconditionally
//!
//! Input rules are never mutated; every pass writes into a fresh mapping.

use std::collections::BTreeMap;
use std::sync::Arc;

use archivist_core::{AnnotationValue, FileRecord, Payload};
use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::debug;

use crate::rule::Rule;
use crate::schema::MergeStrategy;

/// Record fields exposed in a [`MergedResult`]; payload keys with these
/// names are shadowed.
pub const RECORD_FIELDS: [&str; 6] = [
    "path",
    "directory",
    "name",
    "size",
    "item_type",
    "last_modified",
];

// ── Merge passes ────────────────────────────────────────────────────

/// Merged payload plus the strategy that last wrote each key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Merged {
    pub values: Payload,
    pub origins: BTreeMap<String, MergeStrategy>,
}

impl Merged {
    fn default_pass(&mut self, ranked: &[Arc<Rule>]) {
        for rule in ranked.iter().rev() {
            if rule.merge_strategy() != MergeStrategy::Default {
                continue;
            }
            for (key, value) in rule.payload() {
                if !self.values.contains_key(key) {
                    self.set(key, value.clone(), MergeStrategy::Default);
                }
            }
        }
    }

    fn addition_pass(&mut self, ranked: &[Arc<Rule>]) {
        for rule in ranked {
            if rule.merge_strategy() != MergeStrategy::Addition {
                continue;
            }
            for (key, value) in rule.payload() {
                match self.origins.get(key) {
                    None => self.set(key, value.clone(), MergeStrategy::Addition),
                    Some(MergeStrategy::Addition) => {
                        if let Some(existing) = self.values.get_mut(key) {
                            accumulate(existing, value);
                        }
                    }
                    Some(_) => {
                        debug!(rule_id = %rule.id(), key = %key, "addition dropped, key already set");
                    }
                }
            }
        }
    }

    fn override_pass(&mut self, ranked: &[Arc<Rule>]) {
        for rule in ranked {
            if rule.merge_strategy() != MergeStrategy::Override {
                continue;
            }
            for (key, value) in rule.payload() {
                self.set(key, value.clone(), MergeStrategy::Override);
            }
        }
    }

    fn set(&mut self, key: &str, value: AnnotationValue, origin: MergeStrategy) {
        self.values.insert(key.to_string(), value);
        self.origins.insert(key.to_string(), origin);
    }
}

/// Fold `incoming` into `existing` as an ordered list without duplicates.
fn accumulate(existing: &mut AnnotationValue, incoming: &AnnotationValue) {
    let mut items = match std::mem::replace(existing, AnnotationValue::List(Vec::new())) {
        AnnotationValue::List(items) => items,
        scalar => vec![scalar],
    };
    let additions: Vec<&AnnotationValue> = match incoming {
        AnnotationValue::List(values) => values.iter().collect(),
        scalar => vec![scalar],
    };
    for value in additions {
        if !items.contains(value) {
            items.push(value.clone());
        }
    }
    *existing = AnnotationValue::List(items);
}

/// Merge `ranked` (least specific first) with origin tracking.
pub fn merge_with_origins(ranked: &[Arc<Rule>]) -> Merged {
    let mut merged = Merged::default();
    merged.default_pass(ranked);
    merged.addition_pass(ranked);
    merged.override_pass(ranked);
    merged
}

/// Merge `ranked` (least specific first) into one payload.
pub fn merge(ranked: &[Arc<Rule>]) -> Payload {
    merge_with_origins(ranked).values
}

// ── Merged result ───────────────────────────────────────────────────

/// A record together with the annotations that apply to it.
///
/// Serializes as one flat mapping: the six record fields followed by the
/// annotation keys.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedResult {
    pub record: FileRecord,
    pub annotations: Payload,
    /// Ids of the contributing rules, least specific first.
    pub rule_ids: Vec<String>,
}

impl MergedResult {
    /// Combine a record with merged annotations. Keys colliding with a
    /// record field are dropped.
    pub fn new(record: FileRecord, mut annotations: Payload, rule_ids: Vec<String>) -> Self {
        for field in RECORD_FIELDS {
            if annotations.remove(field).is_some() {
                debug!(path = %record.path, key = field, "annotation key shadowed by record field");
            }
        }
        Self {
            record,
            annotations,
            rule_ids,
        }
    }

    /// Look up a key in the flat view.
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        match key {
            "path" => Some(self.record.path.clone().into()),
            "directory" => Some(self.record.directory.clone().into()),
            "name" => Some(self.record.name.clone().into()),
            "size" => Some(self.record.size.map_or(serde_json::Value::Null, Into::into)),
            "item_type" => Some(self.record.item_type.as_str().into()),
            "last_modified" => Some(self.record.last_modified.to_rfc3339().into()),
            other => self.annotations.get(other).map(AnnotationValue::to_json),
        }
    }

    /// Flat JSON view.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl Serialize for MergedResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(RECORD_FIELDS.len() + self.annotations.len()))?;
        map.serialize_entry("path", &self.record.path)?;
        map.serialize_entry("directory", &self.record.directory)?;
        map.serialize_entry("name", &self.record.name)?;
        map.serialize_entry("size", &self.record.size)?;
        map.serialize_entry("item_type", &self.record.item_type)?;
        map.serialize_entry("last_modified", &self.record.last_modified)?;
        for (key, value) in &self.annotations {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}
