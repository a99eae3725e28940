//! File record sources.
//!
//! The engine never crawls a filesystem; it asks a [`RecordSource`] for
//! records already collected by the scanner.

use std::collections::BTreeMap;
use std::path::Path;

use archivist_core::{is_within, normalize_path, FileRecord};
use tracing::info;

pub use archivist_core::ArchivistError as SourceError;

/// Read access to file records.
#[async_trait::async_trait]
pub trait RecordSource: Send + Sync {
    /// The record at `path`, failing with `RecordNotFound` when absent.
    async fn get(&self, path: &str) -> Result<FileRecord, SourceError>;

    /// Every record at or beneath `prefix`, ordered by path.
    async fn list_under(&self, prefix: &str) -> Result<Vec<FileRecord>, SourceError>;
}

/// Records held in memory, keyed by path.
#[derive(Debug, Default, Clone)]
pub struct MemoryRecordSource {
    records: BTreeMap<String, FileRecord>,
}

impl MemoryRecordSource {
    pub fn new(records: impl IntoIterator<Item = FileRecord>) -> Self {
        Self {
            records: records.into_iter().map(|r| (r.path.clone(), r)).collect(),
        }
    }

    pub fn insert(&mut self, record: FileRecord) {
        self.records.insert(record.path.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait::async_trait]
impl RecordSource for MemoryRecordSource {
    async fn get(&self, path: &str) -> Result<FileRecord, SourceError> {
        self.records
            .get(&normalize_path(path))
            .cloned()
            .ok_or_else(|| SourceError::RecordNotFound(path.to_string()))
    }

    async fn list_under(&self, prefix: &str) -> Result<Vec<FileRecord>, SourceError> {
        let prefix = normalize_path(prefix);
        Ok(self
            .records
            .range(prefix.clone()..)
            .take_while(|(path, _)| prefix == "/" || path.starts_with(&prefix))
            .filter(|(path, _)| is_within(path, &prefix))
            .map(|(_, record)| record.clone())
            .collect())
    }
}

/// A JSON-lines snapshot of scanner output, one record per line.
#[derive(Debug, Clone)]
pub struct JsonlRecordSource {
    inner: MemoryRecordSource,
}

impl JsonlRecordSource {
    /// Load a snapshot. Blank lines are ignored; a malformed line fails
    /// the load with its line number.
    pub async fn load(path: &Path) -> Result<Self, SourceError> {
        let contents = tokio::fs::read_to_string(path).await?;
        let source = Self::parse(&contents)?;
        info!(path = %path.display(), records = source.inner.len(), "record snapshot loaded");
        Ok(source)
    }

    pub fn parse(contents: &str) -> Result<Self, SourceError> {
        let mut inner = MemoryRecordSource::default();
        for (n, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let record: FileRecord = serde_json::from_str(line)
                .map_err(|e| SourceError::Serialize(format!("line {}: {}", n + 1, e)))?;
            inner.insert(record);
        }
        Ok(Self { inner })
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[async_trait::async_trait]
impl RecordSource for JsonlRecordSource {
    async fn get(&self, path: &str) -> Result<FileRecord, SourceError> {
        self.inner.get(path).await
    }

    async fn list_under(&self, prefix: &str) -> Result<Vec<FileRecord>, SourceError> {
        self.inner.list_under(prefix).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn source() -> MemoryRecordSource {
        let now = Utc::now();
        MemoryRecordSource::new([
            FileRecord::dir("/data", now),
            FileRecord::file("/data/a.nc", 1, now),
            FileRecord::file("/data/sub/b.nc", 2, now),
            FileRecord::file("/database/c.nc", 3, now),
            FileRecord::file("/data-old/d.nc", 4, now),
        ])
    }

    #[tokio::test]
    async fn list_under_is_segment_aware() {
        let paths: Vec<String> = source()
            .list_under("/data/")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.path)
            .collect();
        assert_eq!(paths, vec!["/data", "/data/a.nc", "/data/sub/b.nc"]);
    }

    #[tokio::test]
    async fn list_under_root_returns_everything() {
        assert_eq!(source().list_under("/").await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn get_missing_record() {
        let err = source().get("/nope").await.unwrap_err();
        assert!(matches!(err, SourceError::RecordNotFound(_)));
    }

    #[tokio::test]
    async fn jsonl_parses_and_derives_fields() {
        let snapshot = r#"
{"path": "/data/cmip5/file123.nc", "size": 234, "item_type": "file", "last_modified": "2024-03-20T10:00:00Z"}

{"path": "/data/cmip5/", "item_type": "dir", "last_modified": "2024-03-20T10:00:00Z"}
"#;
        let source = JsonlRecordSource::parse(snapshot).unwrap();
        assert_eq!(source.len(), 2);
        let record = source.get("/data/cmip5/file123.nc").await.unwrap();
        assert_eq!(record.directory, "/data/cmip5");
        assert_eq!(record.ext, ".nc");
        assert!(source.get("/data/cmip5").await.is_ok());
    }

    #[test]
    fn jsonl_reports_bad_line() {
        let err = JsonlRecordSource::parse("{\"path\": \"/a\"}\n").unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }
}
