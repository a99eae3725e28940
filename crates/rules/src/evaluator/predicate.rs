//! Compiled form of `applies_to`, ready for repeated evaluation.

use archivist_core::{is_within, FileRecord, ItemType};
use chrono::{DateTime, Duration, Utc};
use regex::Regex;

/// Where in the archive a rule applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Spatial {
    /// No `under` and no `path`: the rule is global.
    Unscoped,
    /// Segment-aware subtree rooted at the prefix (inclusive).
    Under(String),
    /// A named item plus, when it is a directory, its direct entries.
    /// An accompanying `under` is ANDed.
    Path { path: String, under: Option<String> },
}

impl Spatial {
    pub fn matches(&self, record: &FileRecord) -> bool {
        match self {
            Spatial::Unscoped => true,
            Spatial::Under(prefix) => is_within(&record.path, prefix),
            Spatial::Path { path, under } => {
                let named = record.path == *path || record.directory == *path;
                named && under.as_deref().map_or(true, |u| is_within(&record.path, u))
            }
        }
    }

    pub fn is_unscoped(&self) -> bool {
        matches!(self, Spatial::Unscoped)
    }

    pub fn exact_path(&self) -> Option<&str> {
        match self {
            Spatial::Path { path, .. } => Some(path),
            _ => None,
        }
    }

    pub fn under(&self) -> Option<&str> {
        match self {
            Spatial::Under(prefix) => Some(prefix),
            Spatial::Path { under, .. } => under.as_deref(),
            Spatial::Unscoped => None,
        }
    }
}

/// Absolute and relative bounds for one time source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateBounds {
    /// Strictly earlier than this instant.
    pub before: Option<DateTime<Utc>>,
    /// Strictly later than this instant.
    pub after: Option<DateTime<Utc>>,
    /// At or before `now - older_days`.
    pub older_days: Option<u32>,
    /// Strictly after `now - younger_days`.
    pub younger_days: Option<u32>,
}

impl DateBounds {
    pub fn is_empty(&self) -> bool {
        self.before.is_none()
            && self.after.is_none()
            && self.older_days.is_none()
            && self.younger_days.is_none()
    }

    pub fn matches(&self, date: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        if let Some(before) = self.before {
            if date >= before {
                return false;
            }
        }
        if let Some(after) = self.after {
            if date <= after {
                return false;
            }
        }
        if let Some(days) = self.older_days {
            // Nothing is older than the start of representable time.
            match days_before(now, days) {
                Some(cutoff) if date <= cutoff => {}
                _ => return false,
            }
        }
        if let Some(days) = self.younger_days {
            if days_before(now, days).is_some_and(|cutoff| date <= cutoff) {
                return false;
            }
        }
        true
    }
}

fn days_before(now: DateTime<Utc>, days: u32) -> Option<DateTime<Utc>> {
    now.checked_sub_signed(Duration::try_days(i64::from(days))?)
}

/// A validated predicate. Only produced by validation, so every regex
/// compiled and every threshold parsed.
#[derive(Debug, Clone)]
pub struct Predicate {
    pub spatial: Spatial,
    /// Lower-cased, with leading dot.
    pub ext: Option<String>,
    pub item_type: Option<ItemType>,
    pub larger: Option<u64>,
    pub smaller: Option<u64>,
    pub filename: Option<Regex>,
    pub regex_date: DateBounds,
    pub mod_date: DateBounds,
}

impl Predicate {
    /// A predicate with no constraints at all.
    pub fn match_all() -> Self {
        Self {
            spatial: Spatial::Unscoped,
            ext: None,
            item_type: None,
            larger: None,
            smaller: None,
            filename: None,
            regex_date: DateBounds::default(),
            mod_date: DateBounds::default(),
        }
    }

    /// Every constraint except the path-embedded date.
    pub(crate) fn matches_attributes(&self, record: &FileRecord, now: DateTime<Utc>) -> bool {
        if !self.spatial.matches(record) {
            return false;
        }
        if let Some(ext) = &self.ext {
            if !record.ext.eq_ignore_ascii_case(ext) {
                return false;
            }
        }
        if let Some(item_type) = self.item_type {
            if record.item_type != item_type {
                return false;
            }
        }
        if let Some(larger) = self.larger {
            if !record.size.is_some_and(|size| size > larger) {
                return false;
            }
        }
        if let Some(smaller) = self.smaller {
            if !record.size.is_some_and(|size| size < smaller) {
                return false;
            }
        }
        if let Some(re) = &self.filename {
            if !re.is_match(&record.name) {
                return false;
            }
        }
        if !self.mod_date.is_empty() && !self.mod_date.matches(record.last_modified, now) {
            return false;
        }
        true
    }
}
