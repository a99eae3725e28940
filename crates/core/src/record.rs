use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of archive item observed by the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    File,
    Dir,
    Link,
}

impl ItemType {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemType::File => "file",
            ItemType::Dir => "dir",
            ItemType::Link => "link",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(ItemType::File),
            "dir" => Ok(ItemType::Dir),
            "link" => Ok(ItemType::Link),
            other => Err(format!("unknown item type: '{}'", other)),
        }
    }
}

/// Snapshot of one file, directory or link in the archive.
///
/// `directory`, `name` and `ext` are derived from `path` on construction.
/// The scanner owns these records; the annotation engine only reads them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawFileRecord")]
pub struct FileRecord {
    pub path: String,
    pub directory: String,
    pub name: String,
    pub ext: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    pub item_type: ItemType,
    pub last_modified: DateTime<Utc>,
}

/// Wire shape accepted from record snapshots. Derived fields are recomputed
/// so a snapshot can never disagree with its own `path`.
#[derive(Deserialize)]
struct RawFileRecord {
    path: String,
    #[serde(default)]
    size: Option<u64>,
    item_type: ItemType,
    last_modified: DateTime<Utc>,
}

impl From<RawFileRecord> for FileRecord {
    fn from(raw: RawFileRecord) -> Self {
        FileRecord::new(raw.path, raw.size, raw.item_type, raw.last_modified)
    }
}

impl FileRecord {
    pub fn new(
        path: impl Into<String>,
        size: Option<u64>,
        item_type: ItemType,
        last_modified: DateTime<Utc>,
    ) -> Self {
        let path = normalize_path(&path.into());
        let (directory, name) = split_path(&path);
        let ext = if item_type == ItemType::Dir {
            String::new()
        } else {
            extension_of(&name)
        };
        Self {
            path,
            directory,
            name,
            ext,
            size,
            item_type,
            last_modified,
        }
    }

    /// Convenience constructor for a regular file.
    pub fn file(path: impl Into<String>, size: u64, last_modified: DateTime<Utc>) -> Self {
        Self::new(path, Some(size), ItemType::File, last_modified)
    }

    /// Convenience constructor for a directory without a recorded size.
    pub fn dir(path: impl Into<String>, last_modified: DateTime<Utc>) -> Self {
        Self::new(path, None, ItemType::Dir, last_modified)
    }

    /// All ancestors of this record's path including the path itself,
    /// from the deepest up to `/`.
    pub fn ancestors(&self) -> Vec<String> {
        ancestors(&self.path)
    }
}

/// Strip trailing slashes (except for the root) and collapse an empty path to `/`.
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Parent directory of a normalized path. The parent of a top-level entry is `/`.
pub fn parent_of(path: &str) -> Option<String> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/".to_string()),
        Some(idx) => Some(path[..idx].to_string()),
        None => None,
    }
}

/// `path` and each of its parents up to `/`, deepest first.
pub fn ancestors(path: &str) -> Vec<String> {
    let mut out = vec![path.to_string()];
    let mut current = path.to_string();
    while let Some(parent) = parent_of(&current) {
        out.push(parent.clone());
        current = parent;
    }
    out
}

/// Segment-aware containment: `/data` contains `/data` and `/data/x`
/// but not `/database`.
pub fn is_within(path: &str, prefix: &str) -> bool {
    if prefix == "/" {
        return path.starts_with('/');
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

fn split_path(path: &str) -> (String, String) {
    match parent_of(path) {
        Some(parent) => {
            let name = path.rsplit('/').next().unwrap_or_default().to_string();
            (parent, name)
        }
        None => ("/".to_string(), String::new()),
    }
}

fn extension_of(name: &str) -> String {
    match name.rfind('.') {
        // Leading-dot names like `.bashrc` have no extension.
        Some(0) | None => String::new(),
        Some(idx) if idx + 1 == name.len() => String::new(),
        Some(idx) => name[idx..].to_lowercase(),
    }
}
