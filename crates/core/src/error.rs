use thiserror::Error;

/// Failures reading file records.
#[derive(Error, Debug)]
pub enum ArchivistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed record: {0}")]
    Serialize(String),

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    /// Backend failure reported by a `RecordSource` implementation.
    #[error("Record source error: {0}")]
    Source(String),
}

impl From<serde_json::Error> for ArchivistError {
    fn from(e: serde_json::Error) -> Self {
        ArchivistError::Serialize(e.to_string())
    }
}
