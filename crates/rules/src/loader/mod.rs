//! Filesystem annotation store with hot-reload via `notify` watcher.
//!
//! Each annotation lives in its own YAML file under the annotations
//! directory. Files are validated and compiled on load; the compiled rules
//! sit in a shared [`RuleIndex`](crate::store::RuleIndex) that the watcher
//! updates when files are created, modified or deleted.

mod core;
mod error;
mod watcher;


pub use self::core::FileStore;
pub use self::error::{LoadResult, LoadStatus, Result, RuleError};
