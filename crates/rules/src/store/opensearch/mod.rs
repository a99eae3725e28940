//! OpenSearch-backed annotation store.
//!
//! Annotations live in one index (`fbi-annotations` by default). Candidate
//! queries become bool DSL with one "absent or equal" clause per attribute
//! and an expiry exclusion; every hit is compiled before use, so the store
//! never hands out an unvalidated rule.
//!
//! The HTTP layer sits behind [`SearchClient`]. [`HttpSearchClient`] talks
//! to a live cluster; tests substitute a mock.

mod client;
mod http;
pub mod query;

use std::sync::Arc;

use archivist_core::config::{OpenSearchConfig, StoreConfig};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::rule::Rule;
use crate::schema::Annotation;
use crate::validation::compile;

use super::{prepare, AnnotationStore, CandidateQuery, SearchFilters, StoreError};

pub use client::{Hit, SearchClient, SearchHits};
pub use http::HttpSearchClient;

/// Hits fetched per search request.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

pub struct OpenSearchStore {
    client: Arc<dyn SearchClient>,
    index: String,
    timeout_ms: u64,
    page_size: usize,
}

impl OpenSearchStore {
    pub fn new(client: Arc<dyn SearchClient>, index: impl Into<String>) -> Self {
        Self {
            client,
            index: index.into(),
            timeout_ms: StoreConfig::default().query_timeout_ms,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn from_config(
        client: Arc<dyn SearchClient>,
        opensearch: &OpenSearchConfig,
        store: &StoreConfig,
    ) -> Self {
        Self::new(client, opensearch.index.clone()).with_timeout_ms(store.query_timeout_ms)
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn index_name(&self) -> &str {
        &self.index
    }

    /// Create the index with path-hierarchy analysis if missing.
    pub async fn ensure_index(&self) -> Result<(), StoreError> {
        self.client
            .ensure_index(&self.index, &query::index_settings())
            .await?;
        info!(index = %self.index, "annotation index ready");
        Ok(())
    }

    /// Run an id-sorted query to exhaustion, one page at a time. A page
    /// shorter than `page_size` is the last one.
    async fn run(&self, body: &serde_json::Value) -> Result<Vec<Arc<Rule>>, StoreError> {
        let mut rules = Vec::new();
        let mut cursor: Option<Vec<serde_json::Value>> = None;
        let mut pages = 0usize;
        let mut took_ms = 0u64;
        loop {
            let page_body = match &cursor {
                Some(after) => query::after(body, after),
                None => body.clone(),
            };
            let page = self.client.search(&self.index, &page_body, self.timeout_ms).await?;
            pages += 1;
            took_ms += page.took_ms;
            let fetched = page.hits.len();

            let next = page.hits.last().map(|hit| {
                if hit.sort.is_empty() {
                    vec![serde_json::Value::String(hit.id.clone())]
                } else {
                    hit.sort.clone()
                }
            });
            rules.extend(page.hits.into_iter().filter_map(hit_to_rule));

            if fetched < self.page_size {
                break;
            }
            if next == cursor {
                return Err(StoreError::Corrupt(format!(
                    "search on {} did not advance past {:?}",
                    self.index, next
                )));
            }
            cursor = next;
        }
        debug!(index = %self.index, rules = rules.len(), pages, took_ms, "search complete");
        Ok(rules)
    }
}

/// Compile one hit; broken documents are logged and skipped.
fn hit_to_rule(hit: Hit) -> Option<Arc<Rule>> {
    let value = query::source_to_annotation_value(hit.source);
    let mut annotation: Annotation = match serde_json::from_value(value) {
        Ok(a) => a,
        Err(e) => {
            warn!(doc_id = %hit.id, error = %e, "skipping unreadable annotation document");
            return None;
        }
    };
    if annotation.id.is_none() {
        annotation.id = Some(hit.id.clone());
    }
    match compile(annotation) {
        Ok(rule) => Some(Arc::new(rule)),
        Err(result) => {
            warn!(doc_id = %hit.id, errors = %result, "skipping invalid annotation document");
            None
        }
    }
}

#[async_trait::async_trait]
impl AnnotationStore for OpenSearchStore {
    async fn save(&self, annotation: Annotation) -> Result<String, StoreError> {
        let rule = prepare(annotation, Utc::now())?;
        let document = query::indexed_document(&rule)?;
        self.client.index(&self.index, rule.id(), &document).await?;
        info!(rule_id = %rule.id(), index = %self.index, "indexed annotation");
        Ok(rule.id().to_string())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        if self.client.delete(&self.index, id).await? {
            info!(rule_id = %id, index = %self.index, "deleted annotation");
            Ok(())
        } else {
            Err(StoreError::NotFound(id.to_string()))
        }
    }

    async fn get(&self, id: &str) -> Result<Annotation, StoreError> {
        let hits = self
            .client
            .search(&self.index, &query::id_query(id), self.timeout_ms)
            .await?;
        hits.hits
            .into_iter()
            .find_map(hit_to_rule)
            .map(|rule| rule.document().clone())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn query_candidates(&self, query: &CandidateQuery) -> Result<Vec<Arc<Rule>>, StoreError> {
        self.run(&query::candidate_query(query, self.page_size)).await
    }

    async fn search(&self, filters: &SearchFilters) -> Result<Vec<Annotation>, StoreError> {
        let now = Utc::now();
        let mut rules = self
            .run(&query::search_query(filters, now, self.page_size))
            .await?;
        rules.retain(|rule| filters.matches(rule, now));
        rules.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(rules.iter().map(|rule| rule.document().clone()).collect())
    }
}
