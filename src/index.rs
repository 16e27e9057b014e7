//! In-memory path to fingerprint index.
//!
//! The index is the only state mutated from many tasks at once. Every
//! operation takes the lock for a bounded amount of work.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::hasher::Digest;

/// Last known fingerprint of one existing file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatchedFile {
    /// Absolute path under the watch root.
    pub path: PathBuf,
    /// Content digest.
    pub digest: Digest,
    /// When the digest was recorded.
    pub observed_at: DateTime<Utc>,
}

impl WatchedFile {
    /// Create an entry observed now.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, digest: Digest) -> Self {
        Self {
            path: path.into(),
            digest,
            observed_at: Utc::now(),
        }
    }
}

/// Concurrent map from path to [`WatchedFile`].
#[derive(Debug, Default)]
pub struct Index {
    entries: RwLock<HashMap<PathBuf, WatchedFile>>,
}

impl Index {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `path`.
    ///
    /// Returns the entry it replaced, if any.
    pub fn upsert(&self, path: impl Into<PathBuf>, digest: Digest) -> Option<WatchedFile> {
        let entry = WatchedFile::new(path, digest);
        self.entries.write().insert(entry.path.clone(), entry)
    }

    /// Remove the entry for `path`. Absent paths are a no-op.
    pub fn remove(&self, path: &Path) -> Option<WatchedFile> {
        self.entries.write().remove(path)
    }

    /// Remove every entry located strictly below `dir`.
    ///
    /// Returns the number of entries removed.
    pub fn remove_under(&self, dir: &Path) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|path, _| !(path != dir && path.starts_with(dir)));
        before - entries.len()
    }

    /// Look up the entry for `path`.
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<WatchedFile> {
        self.entries.read().get(path).cloned()
    }

    /// Point-in-time copy of every entry.
    ///
    /// The read lock is held only while cloning, so writers wait at most
    /// for one copy of the map.
    #[must_use]
    pub fn snapshot(&self) -> Vec<WatchedFile> {
        self.entries.read().values().cloned().collect()
    }

    /// Number of indexed files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
