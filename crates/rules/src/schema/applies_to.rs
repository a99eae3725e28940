//! `applies_to` predicate vocabulary as written in annotation documents.

use archivist_core::ItemType;
use serde::{Deserialize, Serialize};

/// Every key accepted inside `applies_to`, used for "did you mean" suggestions.
pub const APPLIES_TO_KEYS: &[&str] = &[
    "under",
    "path",
    "ext",
    "item_type",
    "larger",
    "smaller",
    "filename_regex",
    "before_regex_date",
    "after_regex_date",
    "older_regex_date",
    "younger_regex_date",
    "before_mod_date",
    "after_mod_date",
    "older_mod_date",
    "younger_mod_date",
];

/// Matching condition of an annotation. Absent fields match everything;
/// present fields are ANDed.
///
/// Dates are kept as written (`2024-03-20` or an RFC 3339 timestamp) and
/// parsed once during validation; relative `older_*` / `younger_*` values
/// are whole days counted back from the evaluation time.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AppliesTo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub under: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_type: Option<ItemType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub larger: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smaller: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename_regex: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_regex_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_regex_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub older_regex_date: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub younger_regex_date: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_mod_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_mod_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub older_mod_date: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub younger_mod_date: Option<u32>,
}

impl AppliesTo {
    /// Number of present, non-empty constraints.
    pub fn constraint_count(&self) -> usize {
        let strings = [
            &self.under,
            &self.path,
            &self.ext,
            &self.filename_regex,
            &self.before_regex_date,
            &self.after_regex_date,
            &self.before_mod_date,
            &self.after_mod_date,
        ];
        let days = [
            self.older_regex_date,
            self.younger_regex_date,
            self.older_mod_date,
            self.younger_mod_date,
        ];
        strings
            .iter()
            .filter(|s| s.as_deref().is_some_and(|v| !v.is_empty()))
            .count()
            + days.iter().filter(|d| d.is_some()).count()
            + usize::from(self.item_type.is_some())
            + usize::from(self.larger.is_some())
            + usize::from(self.smaller.is_some())
    }

    /// No `under` and no `path`: the rule applies archive-wide.
    pub fn is_unscoped(&self) -> bool {
        self.under.is_none() && self.path.is_none()
    }

    pub fn has_regex_date(&self) -> bool {
        self.before_regex_date.is_some()
            || self.after_regex_date.is_some()
            || self.older_regex_date.is_some()
            || self.younger_regex_date.is_some()
    }

    pub fn has_mod_date(&self) -> bool {
        self.before_mod_date.is_some()
            || self.after_mod_date.is_some()
            || self.older_mod_date.is_some()
            || self.younger_mod_date.is_some()
    }

    /// Filename regex or any date constraint present.
    pub fn has_regex_or_date(&self) -> bool {
        self.filename_regex.is_some() || self.has_regex_date() || self.has_mod_date()
    }
}
