//! Hot-reload: applies notify events to the shared index.

use std::path::Path;
use std::sync::{Arc, RwLock};

use notify::event::{CreateKind, ModifyKind, RemoveKind};
use notify::{Event, EventKind};
use tracing::{debug, info, warn};

use super::core::{is_yaml, load_file, Shared};

/// What an event means for one annotation file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Upsert,
    Remove,
}

fn classify(kind: &EventKind) -> Option<Change> {
    match kind {
        EventKind::Create(CreateKind::File)
        | EventKind::Modify(ModifyKind::Data(_))
        | EventKind::Modify(ModifyKind::Name(_)) => Some(Change::Upsert),
        EventKind::Remove(RemoveKind::File) => Some(Change::Remove),
        _ => None,
    }
}

/// Dotfiles cover the store's own `.id.tmp` staging files.
fn is_watched(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| name.starts_with('.'));
    !hidden && is_yaml(path)
}

pub(super) fn handle_fs_event(event: &Event, shared: &Arc<RwLock<Shared>>) {
    let Some(change) = classify(&event.kind) else {
        return;
    };
    for path in event.paths.iter().filter(|p| is_watched(p)) {
        // A rename reports both ends; the old name no longer exists.
        if change == Change::Remove || !path.exists() {
            forget(shared, path);
        } else {
            reload(shared, path);
        }
    }
}

fn reload(shared: &Arc<RwLock<Shared>>, path: &Path) {
    let rule = match load_file(path) {
        Ok(rule) => rule,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "edited annotation is invalid, keeping previous version");
            return;
        }
    };
    let rule_id = rule.id().to_string();
    let mut guard = shared.write().expect("store lock poisoned");
    match guard.register(path, rule) {
        Ok(()) => info!(rule_id = %rule_id, path = %path.display(), "reloaded annotation"),
        Err(e) => warn!(path = %path.display(), error = %e, "reload refused"),
    }
}

fn forget(shared: &Arc<RwLock<Shared>>, path: &Path) {
    match shared.write().expect("store lock poisoned").unregister(path) {
        Some(rule_id) => info!(rule_id = %rule_id, path = %path.display(), "annotation file removed"),
        None => debug!(path = %path.display(), "removed file held no annotation"),
    }
}
