//! Candidate retrieval: coarse store queries with timeout and retries.
//!
//! The planner turns a record (or a bulk directory partition) into a
//! [`CandidateQuery`] and runs it against the store. Each attempt is bounded
//! by a timeout; transient failures (`Unavailable`, `Timeout`) are retried
//! with exponential backoff capped at `max_backoff`. Anything else fails
//! immediately.

use std::sync::Arc;
use std::time::{Duration, Instant};

use archivist_core::config::StoreConfig;
use archivist_core::FileRecord;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::rule::Rule;
use crate::store::{AnnotationStore, CandidateQuery, StoreError};

/// Backoff multiplier between retries.
const BACKOFF_FACTOR: f64 = 2.0;

/// Store call limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &StoreConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.query_timeout_ms),
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = BACKOFF_FACTOR.powi(attempt.saturating_sub(1) as i32);
        let millis = (self.initial_backoff.as_millis() as f64 * factor) as u64;
        Duration::from_millis(millis).min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&StoreConfig::default())
    }
}

pub struct Planner {
    store: Arc<dyn AnnotationStore>,
    policy: RetryPolicy,
}

impl Planner {
    pub fn new(store: Arc<dyn AnnotationStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &Arc<dyn AnnotationStore> {
        &self.store
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Candidates for a single record.
    pub async fn candidates_for_record(
        &self,
        record: &FileRecord,
        now: DateTime<Utc>,
    ) -> Result<Vec<Arc<Rule>>, StoreError> {
        self.fetch(&CandidateQuery::for_record(record, now)).await
    }

    /// Candidates for every entry of `directory`.
    pub async fn candidates_for_directory(
        &self,
        directory: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Arc<Rule>>, StoreError> {
        self.fetch(&CandidateQuery::for_directory(directory, now)).await
    }

    /// Run `query` under the retry policy. Exhausted retries surface as
    /// `StoreError::Unavailable`.
    pub async fn fetch(&self, query: &CandidateQuery) -> Result<Vec<Arc<Rule>>, StoreError> {
        let start = Instant::now();
        let timeout_ms = self.policy.timeout.as_millis() as u64;
        let mut attempt: u32 = 0;

        loop {
            let outcome =
                match tokio::time::timeout(self.policy.timeout, self.store.query_candidates(query))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(StoreError::Timeout(timeout_ms)),
                };

            match outcome {
                Ok(rules) => {
                    debug!(
                        scope = %query.scope(),
                        candidates = rules.len(),
                        attempts = attempt + 1,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "candidate query complete"
                    );
                    return Ok(rules);
                }
                Err(e) if e.is_transient() && attempt < self.policy.max_retries => {
                    attempt += 1;
                    let delay = self.policy.backoff(attempt);
                    warn!(
                        scope = %query.scope(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "candidate query failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) if e.is_transient() => {
                    warn!(scope = %query.scope(), attempts = attempt + 1, error = %e, "candidate query retries exhausted");
                    return Err(StoreError::Unavailable(format!(
                        "{} after {} attempts",
                        e,
                        attempt + 1
                    )));
                }
                Err(e) => return Err(e),
            }
        }
    }
}
