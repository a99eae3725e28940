//! Client abstraction for the search-engine backend.

use super::super::StoreError;

/// Abstraction over the OpenSearch HTTP client.
#[async_trait::async_trait]
pub trait SearchClient: Send + Sync {
    /// Execute a query DSL body against `index`.
    async fn search(
        &self,
        index: &str,
        body: &serde_json::Value,
        timeout_ms: u64,
    ) -> Result<SearchHits, StoreError>;

    /// Create or replace the document `id`.
    async fn index(
        &self,
        index: &str,
        id: &str,
        document: &serde_json::Value,
    ) -> Result<(), StoreError>;

    /// Delete the document `id`. Returns `false` when it did not exist.
    async fn delete(&self, index: &str, id: &str) -> Result<bool, StoreError>;

    /// Create `index` with `settings` unless it already exists.
    async fn ensure_index(&self, index: &str, settings: &serde_json::Value) -> Result<(), StoreError>;
}

/// Raw search response.
#[derive(Debug, Clone, Default)]
pub struct SearchHits {
    pub total: u64,
    pub hits: Vec<Hit>,
    /// Server-side query time in milliseconds.
    pub took_ms: u64,
}

#[derive(Debug, Clone)]
pub struct Hit {
    pub id: String,
    pub source: serde_json::Value,
    /// Sort values, used as the `search_after` cursor for the next page.
    pub sort: Vec<serde_json::Value>,
}
