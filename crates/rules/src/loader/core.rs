//! Core [`FileStore`] struct: directory-backed annotations with optional hot-reload.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{info, warn};

use crate::rule::Rule;
use crate::schema::Annotation;
use crate::store::{
    prepare, AnnotationStore, CandidateQuery, RuleIndex, SearchFilters, StoreError,
};
use crate::validation::{compile, parse_yaml};

use super::error::{LoadResult, LoadStatus, Result, RuleError};
use super::watcher::handle_fs_event;

/// Index plus the file each rule came from.
#[derive(Debug, Default)]
pub(super) struct Shared {
    pub(super) index: RuleIndex,
    pub(super) files: HashMap<PathBuf, String>,
}

impl Shared {
    fn path_of(&self, id: &str) -> Option<PathBuf> {
        self.files
            .iter()
            .find(|(_, file_id)| file_id.as_str() == id)
            .map(|(path, _)| path.clone())
    }

    /// Register `rule` as defined by `path`, replacing whatever that file
    /// defined before. An id owned by a different file is refused.
    pub(super) fn register(&mut self, path: &Path, rule: Arc<Rule>) -> Result<()> {
        if let Some(existing) = self.path_of(rule.id()) {
            if existing != path {
                return Err(RuleError::DuplicateId {
                    id: rule.id().to_string(),
                    existing: existing.display().to_string(),
                });
            }
        }
        if let Some(previous) = self.files.insert(path.to_path_buf(), rule.id().to_string()) {
            if previous != rule.id() {
                self.index.remove(&previous);
            }
        }
        self.index.insert(rule);
        Ok(())
    }

    /// Forget whatever rule `path` defined.
    pub(super) fn unregister(&mut self, path: &Path) -> Option<String> {
        let id = self.files.remove(path)?;
        self.index.remove(&id);
        Some(id)
    }
}

/// Parse, validate and compile one annotation file. A document without an
/// id takes the file stem.
pub(super) fn load_file(path: &Path) -> Result<Arc<Rule>> {
    let contents = fs::read_to_string(path)?;
    let mut annotation = parse_yaml(&contents).map_err(RuleError::Invalid)?;
    if annotation.id.is_none() {
        annotation.id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_string);
    }
    compile(annotation).map(Arc::new).map_err(RuleError::Invalid)
}

pub(super) fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e == "yml" || e == "yaml")
        .unwrap_or(false)
}

/// Filesystem-backed annotation store with optional hot-reload.
///
/// Scans a directory (recursively) for `*.yml` / `*.yaml` files and keeps
/// the compiled rules in an in-memory index keyed by annotation id.
pub struct FileStore {
    /// Root directory containing annotation YAML files.
    dir: PathBuf,
    shared: Arc<RwLock<Shared>>,
    /// Active filesystem watcher (held to keep it alive).
    _watcher: Option<RecommendedWatcher>,
}

impl FileStore {
    /// Create a store for the given directory, creating it if needed.
    pub fn new(dir: PathBuf) -> Self {
        if !dir.exists() {
            if let Err(e) = fs::create_dir_all(&dir) {
                warn!(path = %dir.display(), error = %e, "failed to create annotations directory");
            }
        }
        // Watcher events carry absolute paths; keys must match them.
        let dir = fs::canonicalize(&dir).unwrap_or(dir);
        Self {
            dir,
            shared: Arc::new(RwLock::new(Shared::default())),
            _watcher: None,
        }
    }

    /// Create a store and load every file in it.
    pub fn open(dir: PathBuf) -> Result<(Self, Vec<LoadResult>)> {
        let store = Self::new(dir);
        let results = store.load_all()?;
        Ok((store, results))
    }

    /// Recursively scan the directory and load all YAML files.
    ///
    /// Dotfiles and non-YAML files are skipped. Parse and validation
    /// errors are reported per file but do not abort the scan.
    pub fn load_all(&self) -> Result<Vec<LoadResult>> {
        let mut results = Vec::new();
        self.scan_dir_recursive(&self.dir, &mut results)?;
        let loaded = results
            .iter()
            .filter(|r| matches!(r.status, LoadStatus::Loaded { .. }))
            .count();
        info!(path = %self.dir.display(), loaded, files = results.len(), "annotations loaded");
        Ok(results)
    }

    fn scan_dir_recursive(&self, dir: &Path, results: &mut Vec<LoadResult>) -> Result<()> {
        let mut entries: Vec<PathBuf> = match fs::read_dir(dir) {
            Ok(entries) => entries.map(|e| e.map(|e| e.path())).collect::<std::io::Result<_>>()?,
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "failed to read directory");
                return Ok(());
            }
        };
        // Deterministic order so duplicate ids resolve the same way every time.
        entries.sort();

        for path in entries {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if name.starts_with('.') {
                    if path.is_file() {
                        results.push(LoadResult {
                            path,
                            status: LoadStatus::Skipped {
                                reason: "dotfile".to_string(),
                            },
                        });
                    }
                    continue;
                }
            }

            if path.is_dir() {
                self.scan_dir_recursive(&path, results)?;
                continue;
            }

            if !is_yaml(&path) {
                results.push(LoadResult {
                    path,
                    status: LoadStatus::Skipped {
                        reason: "not a YAML file".to_string(),
                    },
                });
                continue;
            }

            let loaded = load_file(&path).and_then(|rule| {
                let rule_id = rule.id().to_string();
                self.shared
                    .write()
                    .expect("store lock poisoned")
                    .register(&path, rule)?;
                Ok(rule_id)
            });
            match loaded {
                Ok(rule_id) => {
                    info!(rule_id = %rule_id, path = %path.display(), "loaded annotation");
                    results.push(LoadResult {
                        path,
                        status: LoadStatus::Loaded { rule_id },
                    });
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to load annotation file");
                    results.push(LoadResult {
                        path,
                        status: LoadStatus::Failed {
                            error: e.to_string(),
                        },
                    });
                }
            }
        }

        Ok(())
    }

    /// Start a filesystem watcher with 500ms polling.
    ///
    /// On file create/modify the annotation is re-parsed and upserted.
    /// On file delete it is removed from the index.
    /// Invalid files are logged as warnings; the previous version is kept.
    pub fn watch(&mut self) -> Result<()> {
        let shared = Arc::clone(&self.shared);

        let mut watcher = notify::recommended_watcher(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => handle_fs_event(&event, &shared),
                Err(e) => warn!(error = %e, "filesystem watcher error"),
            },
        )?;

        watcher.watch(&self.dir, RecursiveMode::Recursive)?;

        let _ = watcher
            .configure(notify::Config::default().with_poll_interval(Duration::from_millis(500)));

        info!(path = %self.dir.display(), "watching annotations directory for changes (recursive)");
        self._watcher = Some(watcher);
        Ok(())
    }

    /// Get the annotations directory path.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub(super) fn shared(&self) -> &Arc<RwLock<Shared>> {
        &self.shared
    }

    pub fn len(&self) -> usize {
        self.shared.read().expect("store lock poisoned").index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Atomically write a compiled rule's document to its YAML file.
    ///
    /// Writes to a `.tmp` file first, then renames to the final path to
    /// avoid partial writes on crash.
    fn write_rule(&self, rule: Arc<Rule>) -> Result<PathBuf> {
        let id = rule.id().to_string();
        let final_path = {
            let shared = self.shared.read().expect("store lock poisoned");
            shared
                .path_of(&id)
                .unwrap_or_else(|| self.dir.join(format!("{id}.yml")))
        };
        let tmp_path = self.dir.join(format!(".{id}.tmp"));

        let yaml = serde_yaml::to_string(rule.document())?;
        fs::write(&tmp_path, yaml)?;
        fs::rename(&tmp_path, &final_path)?;

        info!(rule_id = %id, path = %final_path.display(), "wrote annotation file");

        self.shared
            .write()
            .expect("store lock poisoned")
            .register(&final_path, rule)?;
        Ok(final_path)
    }

    /// Delete an annotation file by id, removing the file and the index entry.
    fn delete_rule(&self, id: &str) -> std::result::Result<(), StoreError> {
        let path = self
            .shared
            .read()
            .expect("store lock poisoned")
            .path_of(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        fs::remove_file(&path)?;
        self.shared
            .write()
            .expect("store lock poisoned")
            .unregister(&path);

        info!(rule_id = %id, path = %path.display(), "deleted annotation");
        Ok(())
    }
}

#[async_trait::async_trait]
impl AnnotationStore for FileStore {
    async fn save(&self, annotation: Annotation) -> std::result::Result<String, StoreError> {
        let rule = prepare(annotation, Utc::now())?;
        let id = rule.id().to_string();
        self.write_rule(rule)?;
        Ok(id)
    }

    async fn delete(&self, id: &str) -> std::result::Result<(), StoreError> {
        self.delete_rule(id)
    }

    async fn get(&self, id: &str) -> std::result::Result<Annotation, StoreError> {
        self.shared
            .read()
            .expect("store lock poisoned")
            .index
            .get(id)
            .map(|rule| rule.document().clone())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn query_candidates(
        &self,
        query: &CandidateQuery,
    ) -> std::result::Result<Vec<Arc<Rule>>, StoreError> {
        Ok(self
            .shared
            .read()
            .expect("store lock poisoned")
            .index
            .candidates(query))
    }

    async fn search(
        &self,
        filters: &SearchFilters,
    ) -> std::result::Result<Vec<Annotation>, StoreError> {
        let shared = self.shared.read().expect("store lock poisoned");
        Ok(shared
            .index
            .search(filters, Utc::now())
            .iter()
            .map(|rule| rule.document().clone())
            .collect())
    }
}
