//! In-process annotation store.

use std::sync::{Arc, RwLock};

use chrono::Utc;
use tracing::info;

use crate::rule::Rule;
use crate::schema::Annotation;

use super::{prepare, AnnotationStore, CandidateQuery, RuleIndex, SearchFilters, StoreError};

/// Indexed in-memory store. Used by tests, the CLI's scratch mode and as
/// the cache behind [`FileStore`](crate::loader::FileStore).
#[derive(Debug, Default)]
pub struct MemoryStore {
    index: RwLock<RuleIndex>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from annotations, rejecting the first invalid one.
    pub fn with_annotations(
        annotations: impl IntoIterator<Item = Annotation>,
    ) -> Result<Self, StoreError> {
        let store = Self::new();
        let now = Utc::now();
        for annotation in annotations {
            let rule = prepare(annotation, now)?;
            store.insert_rule(rule);
        }
        Ok(store)
    }

    /// Insert an already compiled rule.
    pub fn insert_rule(&self, rule: Arc<Rule>) {
        self.index.write().expect("index lock poisoned").insert(rule);
    }

    pub fn len(&self) -> usize {
        self.index.read().expect("index lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl AnnotationStore for MemoryStore {
    async fn save(&self, annotation: Annotation) -> Result<String, StoreError> {
        let rule = prepare(annotation, Utc::now())?;
        let id = rule.id().to_string();
        self.insert_rule(rule);
        Ok(id)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let removed = self.index.write().expect("index lock poisoned").remove(id);
        match removed {
            Some(_) => {
                info!(rule_id = %id, "deleted annotation");
                Ok(())
            }
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    async fn get(&self, id: &str) -> Result<Annotation, StoreError> {
        self.index
            .read()
            .expect("index lock poisoned")
            .get(id)
            .map(|rule| rule.document().clone())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn query_candidates(&self, query: &CandidateQuery) -> Result<Vec<Arc<Rule>>, StoreError> {
        Ok(self.index.read().expect("index lock poisoned").candidates(query))
    }

    async fn search(&self, filters: &SearchFilters) -> Result<Vec<Annotation>, StoreError> {
        let index = self.index.read().expect("index lock poisoned");
        Ok(index
            .search(filters, Utc::now())
            .iter()
            .map(|rule| rule.document().clone())
            .collect())
    }
}
