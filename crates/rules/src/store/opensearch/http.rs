//! `reqwest` implementation of [`SearchClient`] for a live cluster.

use std::time::Duration;

use archivist_core::config::OpenSearchConfig;
use reqwest::{Method, StatusCode, Url};
use serde_json::Value;
use tracing::debug;

use super::client::{Hit, SearchClient, SearchHits};
use crate::store::StoreError;

/// Longest error body echoed back in a `Backend` error.
const MAX_ERROR_BODY: usize = 512;

/// Timeout for index administration and writes.
const WRITE_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpSearchClient {
    base_url: Url,
    http: reqwest::Client,
}

impl HttpSearchClient {
    pub fn new(base_url: &str) -> Result<Self, StoreError> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| StoreError::Unavailable(format!("invalid cluster url '{base_url}': {e}")))?;
        Ok(Self {
            base_url,
            http: reqwest::Client::new(),
        })
    }

    pub fn from_config(config: &OpenSearchConfig) -> Result<Self, StoreError> {
        Self::new(&config.base_url())
    }

    fn url(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Unavailable(format!("cluster url '{}' cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
        timeout: Duration,
    ) -> Result<reqwest::Response, StoreError> {
        debug!(method = %method, url = %url, "search backend request");
        let mut request = self.http.request(method, url).timeout(timeout);
        if let Some(body) = body {
            request = request.json(body);
        }
        request.send().await.map_err(|e| {
            if e.is_timeout() {
                StoreError::Timeout(timeout.as_millis() as u64)
            } else {
                StoreError::Unavailable(e.to_string())
            }
        })
    }
}

/// Turn a non-success response into a `Backend` error.
async fn check(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let mut message = response.text().await.unwrap_or_default();
    if message.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !message.is_char_boundary(cut) {
            cut -= 1;
        }
        message.truncate(cut);
    }
    Err(StoreError::Backend {
        status: status.as_u16(),
        message,
    })
}

/// Decode a `_search` response body.
pub(crate) fn parse_hits(body: &Value) -> Result<SearchHits, StoreError> {
    let hits = body
        .get("hits")
        .ok_or_else(|| StoreError::Corrupt("search response has no 'hits'".into()))?;
    let total = match hits.get("total") {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(obj) => obj.get("value").and_then(Value::as_u64).unwrap_or(0),
        None => 0,
    };
    let hits = hits
        .get("hits")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| {
                    Some(Hit {
                        id: entry.get("_id")?.as_str()?.to_string(),
                        source: entry.get("_source").cloned().unwrap_or(Value::Null),
                        sort: entry
                            .get("sort")
                            .and_then(Value::as_array)
                            .cloned()
                            .unwrap_or_default(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    Ok(SearchHits {
        total,
        hits,
        took_ms: body.get("took").and_then(Value::as_u64).unwrap_or(0),
    })
}

#[async_trait::async_trait]
impl SearchClient for HttpSearchClient {
    async fn search(
        &self,
        index: &str,
        body: &Value,
        timeout_ms: u64,
    ) -> Result<SearchHits, StoreError> {
        let url = self.url(&[index, "_search"])?;
        let response = self
            .send(Method::POST, url, Some(body), Duration::from_millis(timeout_ms))
            .await?;
        let body: Value = check(response)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        parse_hits(&body)
    }

    async fn index(&self, index: &str, id: &str, document: &Value) -> Result<(), StoreError> {
        let mut url = self.url(&[index, "_doc", id])?;
        url.query_pairs_mut().append_pair("refresh", "wait_for");
        let response = self
            .send(Method::PUT, url, Some(document), WRITE_TIMEOUT)
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn delete(&self, index: &str, id: &str) -> Result<bool, StoreError> {
        let mut url = self.url(&[index, "_doc", id])?;
        url.query_pairs_mut().append_pair("refresh", "wait_for");
        let response = self.send(Method::DELETE, url, None, WRITE_TIMEOUT).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check(response).await?;
        Ok(true)
    }

    async fn ensure_index(&self, index: &str, settings: &Value) -> Result<(), StoreError> {
        let url = self.url(&[index])?;
        let exists = self
            .send(Method::HEAD, url.clone(), None, WRITE_TIMEOUT)
            .await?;
        if exists.status().is_success() {
            return Ok(());
        }
        let response = self.send(Method::PUT, url, Some(settings), WRITE_TIMEOUT).await?;
        check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_modern_and_legacy_totals() {
        let modern = json!({
            "took": 7,
            "hits": {"total": {"value": 2, "relation": "eq"}, "hits": [
                {"_id": "a", "_source": {"id": "a"}},
                {"_id": "b", "_source": {"id": "b"}, "sort": ["b"]}
            ]}
        });
        let hits = parse_hits(&modern).unwrap();
        assert_eq!(hits.total, 2);
        assert_eq!(hits.took_ms, 7);
        assert_eq!(hits.hits[1].id, "b");
        assert!(hits.hits[0].sort.is_empty());
        assert_eq!(hits.hits[1].sort, vec![json!("b")]);

        let legacy = json!({"hits": {"total": 5, "hits": []}});
        assert_eq!(parse_hits(&legacy).unwrap().total, 5);
    }

    #[test]
    fn missing_hits_is_corrupt() {
        assert!(matches!(
            parse_hits(&json!({"error": "boom"})),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn document_urls_escape_ids() {
        let client = HttpSearchClient::new("http://search.internal:9200/").unwrap();
        let url = client.url(&["fbi-annotations", "_doc", "a/b c"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://search.internal:9200/fbi-annotations/_doc/a%2Fb%20c"
        );
    }

    #[test]
    fn server_errors_are_transient() {
        let busy = StoreError::Backend {
            status: 503,
            message: String::new(),
        };
        let bad = StoreError::Backend {
            status: 400,
            message: String::new(),
        };
        assert!(busy.is_transient());
        assert!(!bad.is_transient());
    }
}
