//! Specificity ordering of matched rules.
//!
//! Rules are ordered from least to most specific by the key
//! `(exact path, constraint count, under prefix length, regex/date use)`.
//! Ties fall back to `created_at` (missing first, newer later) and finally
//! to the id, so the order is total and independent of input order.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use crate::engine::EngineError;
use crate::rule::Rule;

/// Sort key of one rule. Derived `Ord` compares fields in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Specificity {
    pub exact_path: bool,
    pub constraint_count: usize,
    pub under_len: usize,
    pub uses_regex_or_date: bool,
}

impl Specificity {
    pub fn of(rule: &Rule) -> Self {
        let applies = &rule.document().applies_to;
        Self {
            exact_path: rule.predicate.spatial.exact_path().is_some(),
            constraint_count: applies.constraint_count(),
            under_len: rule.predicate.spatial.under().map_or(0, str::len),
            uses_regex_or_date: applies.has_regex_or_date(),
        }
    }
}

/// Total order from least to most specific.
pub fn compare(a: &Rule, b: &Rule) -> Ordering {
    Specificity::of(a)
        .cmp(&Specificity::of(b))
        .then_with(|| a.created_at().cmp(&b.created_at()))
        .then_with(|| a.id().cmp(b.id()))
}

/// Order `rules` least specific first. Two rules sharing an id is a store
/// invariant violation and is reported rather than silently resolved.
pub fn rank(mut rules: Vec<Arc<Rule>>) -> Result<Vec<Arc<Rule>>, EngineError> {
    let mut seen = HashSet::with_capacity(rules.len());
    for rule in &rules {
        if !seen.insert(rule.id()) {
            return Err(EngineError::DuplicateRuleId(rule.id().to_string()));
        }
    }
    rules.sort_by(|a, b| compare(a, b));
    Ok(rules)
}
