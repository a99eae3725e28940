use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub engine: EngineConfig,
    pub store: StoreConfig,
    pub opensearch: OpenSearchConfig,
}

/// Well-known env keys that identify a profile when prefixed.
const PROFILE_MARKER_KEYS: &[&str] = &["ANNOTATIONS_DIR", "RECORDS_FILE", "OPENSEARCH_HOST"];

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `ARCHIVIST_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("ARCHIVIST_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            engine: EngineConfig::from_env_profiled(p),
            store: StoreConfig::from_env_profiled(p),
            opensearch: OpenSearchConfig::from_env_profiled(p),
        }
    }

    /// Discover available profiles by scanning env vars for `{PREFIX}_{MARKER_KEY}` patterns.
    /// Always includes "default" (the unprefixed config).
    pub fn available_profiles() -> Vec<String> {
        let mut profiles = std::collections::BTreeSet::new();
        profiles.insert("default".to_string());

        for (key, _) in env::vars() {
            for marker in PROFILE_MARKER_KEYS {
                if let Some(prefix) = key.strip_suffix(&format!("_{}", marker)) {
                    if !prefix.is_empty()
                        && prefix.chars().all(|c| c.is_ascii_uppercase() || c == '_')
                    {
                        profiles.insert(prefix.to_string());
                    }
                }
            }
        }

        profiles.into_iter().collect()
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  engine:      workers={}, partitions={}, date_formats={}",
            self.engine.resolved_worker_threads(),
            self.engine.partition_concurrency,
            self.engine.date_formats.join(",")
        );
        tracing::info!(
            "  store:       annotations_dir={}, timeout_ms={}, retries={}",
            self.store.annotations_dir.display(),
            self.store.query_timeout_ms,
            self.store.max_retries
        );
        tracing::info!("  opensearch:  host={}, index={}", self.opensearch.host, self.opensearch.index);
    }

    /// Return a redacted view safe for output (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "engine": {
                "worker_threads": self.engine.resolved_worker_threads(),
                "partition_concurrency": self.engine.partition_concurrency,
                "date_formats": self.engine.date_formats,
            },
            "store": {
                "annotations_dir": self.store.annotations_dir,
                "records_file": self.store.records_file,
                "query_timeout_ms": self.store.query_timeout_ms,
                "max_retries": self.store.max_retries,
            },
            "opensearch": {
                "host": self.opensearch.host,
                "port": self.opensearch.port,
                "index": self.opensearch.index,
                "configured": self.opensearch.is_configured(),
            },
        })
    }
}

// ── Engine ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Evaluation threads for bulk runs (0 = one per available core).
    pub worker_threads: usize,
    /// Maximum directory partitions whose candidate queries run concurrently.
    pub partition_concurrency: usize,
    /// Date recognizer formats, by name (`iso`, `compact`, `slashed`, `year_month`).
    pub date_formats: Vec<String>,
}

impl EngineConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            worker_threads: profiled_env_u32(p, "WORKER_THREADS", 0) as usize,
            partition_concurrency: profiled_env_u32(p, "PARTITION_CONCURRENCY", 8).max(1) as usize,
            date_formats: profiled_env_or(p, "DATE_FORMATS", "iso,compact,slashed,year_month")
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    /// Worker thread count with `0` resolved to the available parallelism.
    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads > 0 {
            self.worker_threads
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            partition_concurrency: 8,
            date_formats: vec![
                "iso".to_string(),
                "compact".to_string(),
                "slashed".to_string(),
                "year_month".to_string(),
            ],
        }
    }
}

// ── Annotation store ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub annotations_dir: PathBuf,
    /// JSON-lines snapshot of file records used by the local harness.
    pub records_file: PathBuf,
    pub query_timeout_ms: u64,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl StoreConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            annotations_dir: PathBuf::from(profiled_env_or(p, "ANNOTATIONS_DIR", "data/annotations")),
            records_file: PathBuf::from(profiled_env_or(p, "RECORDS_FILE", "data/records.jsonl")),
            query_timeout_ms: profiled_env_u64(p, "STORE_QUERY_TIMEOUT_MS", 5000),
            max_retries: profiled_env_u32(p, "STORE_MAX_RETRIES", 3),
            initial_backoff_ms: profiled_env_u64(p, "STORE_INITIAL_BACKOFF_MS", 200),
            max_backoff_ms: profiled_env_u64(p, "STORE_MAX_BACKOFF_MS", 5000),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            annotations_dir: PathBuf::from("data/annotations"),
            records_file: PathBuf::from("data/records.jsonl"),
            query_timeout_ms: 5000,
            max_retries: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 5000,
        }
    }
}

// ── OpenSearch / Elasticsearch ────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenSearchConfig {
    pub host: String,
    pub port: u16,
    pub index: String,
    pub use_ssl: bool,
}

impl OpenSearchConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "OPENSEARCH_HOST", "localhost"),
            port: profiled_env_u16(p, "OPENSEARCH_PORT", 9200),
            index: profiled_env_or(p, "OPENSEARCH_INDEX", "fbi-annotations"),
            use_ssl: profiled_env_or(p, "OPENSEARCH_USE_SSL", "false") == "true",
        }
    }

    pub fn base_url(&self) -> String {
        let scheme = if self.use_ssl { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    pub fn is_configured(&self) -> bool {
        self.host != "localhost"
    }
}
