//! Spatial index over compiled rules.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use archivist_core::{ancestors, is_within};
use chrono::{DateTime, Utc};

use crate::evaluator::Spatial;
use crate::rule::Rule;

use super::{CandidateQuery, QueryTarget, SearchFilters};

/// Rules keyed by id plus three lookup structures: `under` prefix,
/// `path`, and the global (unscoped) set.
#[derive(Debug, Default, Clone)]
pub struct RuleIndex {
    rules: HashMap<String, Arc<Rule>>,
    by_under: BTreeMap<String, BTreeSet<String>>,
    by_path: BTreeMap<String, BTreeSet<String>>,
    globals: BTreeSet<String>,
}

impl RuleIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<Arc<Rule>> {
        self.rules.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.rules.contains_key(id)
    }

    /// Insert or replace a rule by id.
    pub fn insert(&mut self, rule: Arc<Rule>) {
        let id = rule.id().to_string();
        self.remove(&id);
        match &rule.predicate.spatial {
            Spatial::Unscoped => {
                self.globals.insert(id.clone());
            }
            Spatial::Under(prefix) => {
                self.by_under.entry(prefix.clone()).or_default().insert(id.clone());
            }
            Spatial::Path { path, .. } => {
                self.by_path.entry(path.clone()).or_default().insert(id.clone());
            }
        }
        self.rules.insert(id, rule);
    }

    pub fn remove(&mut self, id: &str) -> Option<Arc<Rule>> {
        let rule = self.rules.remove(id)?;
        match &rule.predicate.spatial {
            Spatial::Unscoped => {
                self.globals.remove(id);
            }
            Spatial::Under(prefix) => unlink(&mut self.by_under, prefix, id),
            Spatial::Path { path, .. } => unlink(&mut self.by_path, path, id),
        }
        Some(rule)
    }

    /// Candidate rules for `query`, in id order.
    pub fn candidates(&self, query: &CandidateQuery) -> Vec<Arc<Rule>> {
        let mut ids: BTreeSet<&str> = self.globals.iter().map(String::as_str).collect();

        match &query.target {
            QueryTarget::Record { path, directory } => {
                for ancestor in ancestors(path) {
                    extend(&mut ids, self.by_under.get(&ancestor));
                }
                extend(&mut ids, self.by_path.get(path));
                extend(&mut ids, self.by_path.get(directory));
            }
            QueryTarget::Directory(dir) => {
                for ancestor in ancestors(dir) {
                    extend(&mut ids, self.by_under.get(&ancestor));
                }
                for (_, set) in subtree(&self.by_under, dir) {
                    extend(&mut ids, Some(set));
                }
                for (_, set) in subtree(&self.by_path, dir) {
                    extend(&mut ids, Some(set));
                }
            }
        }

        ids.into_iter()
            .filter_map(|id| self.rules.get(id))
            .filter(|rule| !rule.is_expired(query.now) && query.admits_attributes(rule))
            .cloned()
            .collect()
    }

    /// Rules passing `filters`, in id order.
    pub fn search(&self, filters: &SearchFilters, now: DateTime<Utc>) -> Vec<Arc<Rule>> {
        let mut found: Vec<Arc<Rule>> = self
            .rules
            .values()
            .filter(|rule| filters.matches(rule, now))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.id().cmp(b.id()));
        found
    }

    pub fn rules(&self) -> impl Iterator<Item = &Arc<Rule>> {
        self.rules.values()
    }
}

fn extend<'a>(ids: &mut BTreeSet<&'a str>, set: Option<&'a BTreeSet<String>>) {
    if let Some(set) = set {
        ids.extend(set.iter().map(String::as_str));
    }
}

fn unlink(map: &mut BTreeMap<String, BTreeSet<String>>, key: &str, id: &str) {
    if let Some(set) = map.get_mut(key) {
        set.remove(id);
        if set.is_empty() {
            map.remove(key);
        }
    }
}

/// Entries whose key is `dir` or lies beneath it.
fn subtree<'a>(
    map: &'a BTreeMap<String, BTreeSet<String>>,
    dir: &'a str,
) -> impl Iterator<Item = (&'a String, &'a BTreeSet<String>)> + 'a {
    let start = if dir == "/" { "" } else { dir };
    map.range(start.to_string()..)
        .take_while(move |(key, _)| key.starts_with(start))
        .filter(move |(key, _)| is_within(key, dir))
}
