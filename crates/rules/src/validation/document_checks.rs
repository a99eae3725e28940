//! Document-level checks: raw shape, id, payload keys.

use crate::merge::RECORD_FIELDS;
use crate::schema::{Annotation, APPLIES_TO_KEYS, MERGE_STRATEGIES};

use super::fuzzy::{closest, is_kebab_case};
use super::ValidationResult;

const TOP_LEVEL_KEYS: &[&str] = &[
    "id",
    "applies_to",
    "annotation",
    "merge_strategy",
    "metadata",
    "created_at",
];

// ── Raw shape ───────────────────────────────────────────────────────

/// Check a raw document before deserialization so misspellings get a
/// suggestion rather than a serde message.
pub(super) fn validate_shape(value: &serde_json::Value, result: &mut ValidationResult) {
    let obj = match value.as_object() {
        Some(o) => o,
        None => {
            result.error("", "annotation document must be a mapping");
            return;
        }
    };

    for key in obj.keys() {
        if !TOP_LEVEL_KEYS.contains(&key.as_str()) {
            unknown_key(key, key, TOP_LEVEL_KEYS, result);
        }
    }

    for required in ["applies_to", "annotation", "merge_strategy"] {
        if !obj.contains_key(required) {
            result.error(required, format!("missing required field '{required}'"));
        }
    }

    match obj.get("applies_to") {
        Some(serde_json::Value::Object(applies)) => {
            for key in applies.keys() {
                if !APPLIES_TO_KEYS.contains(&key.as_str()) {
                    unknown_key(key, &format!("applies_to.{key}"), APPLIES_TO_KEYS, result);
                }
            }
        }
        Some(serde_json::Value::Null) | None => {}
        Some(_) => result.error("applies_to", "applies_to must be a mapping"),
    }

    match obj.get("annotation") {
        Some(serde_json::Value::Object(_)) | None => {}
        Some(_) => result.error("annotation", "annotation payload must be a mapping"),
    }

    if let Some(strategy) = obj.get("merge_strategy") {
        match strategy.as_str() {
            Some(s) if MERGE_STRATEGIES.contains(&s) => {}
            Some(s) => match closest(s, MERGE_STRATEGIES) {
                Some(suggestion) => result.error_with_suggestion(
                    "merge_strategy",
                    format!("Unknown merge strategy '{s}'"),
                    format!("Did you mean '{suggestion}'?"),
                ),
                None => result.error(
                    "merge_strategy",
                    format!("Unknown merge strategy '{s}'; expected one of default, override, addition"),
                ),
            },
            None => result.error("merge_strategy", "merge_strategy must be a string"),
        }
    }
}

fn unknown_key(key: &str, path: &str, known: &[&str], result: &mut ValidationResult) {
    match closest(key, known) {
        Some(s) => result.error_with_suggestion(
            path,
            format!("Unknown field '{key}'"),
            format!("Did you mean '{s}'?"),
        ),
        None => result.error(path, format!("Unknown field '{key}'")),
    }
}

// ── Parsed document ─────────────────────────────────────────────────

pub(super) fn validate_document(annotation: &Annotation, result: &mut ValidationResult) {
    if let Some(id) = annotation.id.as_deref() {
        if !is_kebab_case(id) {
            result.error(
                "id",
                format!("id '{id}' must be kebab-case (lowercase letters, digits, hyphens)"),
            );
        }
    }

    if annotation.annotation.is_empty() {
        result.warn("annotation", "annotation payload is empty; the rule contributes nothing");
    }

    for key in annotation.annotation.keys() {
        if key.is_empty() {
            result.error("annotation", "payload keys must not be empty");
        } else if RECORD_FIELDS.contains(&key.as_str()) {
            result.warn(
                format!("annotation.{key}"),
                format!("'{key}' is a file record field and will always be shadowed by it"),
            );
        }
    }
}
