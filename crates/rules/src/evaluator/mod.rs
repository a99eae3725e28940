//! Exact predicate evaluation of annotation rules against file records.
//!
//! Candidates arrive from the store as a superset of the true matches; the
//! evaluator decides precisely which of them apply:
//! - expired rules (`metadata.expires <= now`) never apply
//! - every present `applies_to` constraint must hold (AND)
//! - `*_regex_date` constraints use the first date found in the path and
//!   fail closed when the path carries none

mod dates;
mod predicate;

use std::cell::OnceCell;
use std::sync::Arc;

use archivist_core::FileRecord;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::rule::Rule;

pub use dates::{parse_timestamp, DateFormat, DateRecognizer};
pub use predicate::{DateBounds, Predicate, Spatial};

// ── Evaluator ───────────────────────────────────────────────────────

/// Stateless matcher; holds only the date recognizer configuration.
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    recognizer: DateRecognizer,
}

impl Evaluator {
    pub fn new(recognizer: DateRecognizer) -> Self {
        Self { recognizer }
    }

    pub fn recognizer(&self) -> &DateRecognizer {
        &self.recognizer
    }

    /// Whether `predicate` matches `record` at evaluation time `now`.
    pub fn matches(&self, predicate: &Predicate, record: &FileRecord, now: DateTime<Utc>) -> bool {
        self.probe(record).matches(predicate, now)
    }

    /// Non-expired rules from `candidates` whose predicate matches `record`,
    /// in candidate order.
    pub fn select(
        &self,
        candidates: &[Arc<Rule>],
        record: &FileRecord,
        now: DateTime<Utc>,
    ) -> Vec<Arc<Rule>> {
        let probe = self.probe(record);
        candidates
            .iter()
            .filter(|rule| !rule.is_expired(now) && probe.matches(&rule.predicate, now))
            .cloned()
            .collect()
    }

    /// Per-record view that extracts the path date at most once.
    pub fn probe<'a>(&'a self, record: &'a FileRecord) -> RecordProbe<'a> {
        RecordProbe {
            record,
            recognizer: &self.recognizer,
            path_date: OnceCell::new(),
        }
    }
}

/// Convenience form using the default date formats.
pub fn matches(predicate: &Predicate, record: &FileRecord, now: DateTime<Utc>) -> bool {
    Evaluator::default().matches(predicate, record, now)
}

// ── Record probe ────────────────────────────────────────────────────

/// A record being evaluated against many predicates.
pub struct RecordProbe<'a> {
    record: &'a FileRecord,
    recognizer: &'a DateRecognizer,
    path_date: OnceCell<Option<DateTime<Utc>>>,
}

impl RecordProbe<'_> {
    pub fn record(&self) -> &FileRecord {
        self.record
    }

    /// Date embedded in the record's path, if any.
    pub fn path_date(&self) -> Option<DateTime<Utc>> {
        *self
            .path_date
            .get_or_init(|| self.recognizer.extract(&self.record.path))
    }

    pub fn matches(&self, predicate: &Predicate, now: DateTime<Utc>) -> bool {
        if !predicate.matches_attributes(self.record, now) {
            return false;
        }
        if predicate.regex_date.is_empty() {
            return true;
        }
        match self.path_date() {
            Some(date) => predicate.regex_date.matches(date, now),
            None => {
                debug!(path = %self.record.path, "no date in path, regex date constraint fails closed");
                false
            }
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests;
