//! Per-event handling and detection cycles.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::FutureExt;

use crate::detector::{find_duplicates, DetectionSummary, DuplicateGroup};
use crate::error::HashError;
use crate::hasher::{ContentHasher, Digest};
use crate::index::Index;
use crate::reporter::{Report, Reporter};
use crate::watcher::{scan_directory_async, FileEvent, PathFilter};
use crate::{Error, Result};

/// Counters for engine activity.
#[derive(Debug, Default)]
pub struct EngineStats {
    pub events_received: AtomicU64,
    pub events_ignored: AtomicU64,
    pub hashes_updated: AtomicU64,
    pub entries_removed: AtomicU64,
    pub errors: AtomicU64,
    pub cycles: AtomicU64,
}

impl EngineStats {
    /// Create new stats tracker.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Get snapshot of current stats.
    #[must_use]
    pub fn snapshot(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            events_received: self.events_received.load(Ordering::Relaxed),
            events_ignored: self.events_ignored.load(Ordering::Relaxed),
            hashes_updated: self.hashes_updated.load(Ordering::Relaxed),
            entries_removed: self.entries_removed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            cycles: self.cycles.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of engine stats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStatsSnapshot {
    pub events_received: u64,
    pub events_ignored: u64,
    pub hashes_updated: u64,
    pub entries_removed: u64,
    pub errors: u64,
    pub cycles: u64,
}

/// Applies file events to the index and runs detection cycles.
///
/// One handler is shared by every task of a running engine.
pub struct EventHandler {
    index: Arc<Index>,
    hasher: ContentHasher,
    filter: Arc<PathFilter>,
    reporter: Arc<dyn Reporter>,
    stats: Arc<EngineStats>,
}

impl EventHandler {
    /// Create a new event handler.
    pub fn new(
        index: Arc<Index>,
        hasher: ContentHasher,
        filter: Arc<PathFilter>,
        reporter: Arc<dyn Reporter>,
        stats: Arc<EngineStats>,
    ) -> Self {
        Self {
            index,
            hasher,
            filter,
            reporter,
            stats,
        }
    }

    /// Index this handler writes to.
    #[must_use]
    pub fn index(&self) -> &Arc<Index> {
        &self.index
    }

    /// Handle one event, containing any failure.
    ///
    /// Errors and panics are counted, logged and reported; nothing escapes
    /// to the caller.
    pub async fn dispatch(&self, event: FileEvent) {
        let path = event.path().to_path_buf();
        let kind = event.kind();

        let message = match AssertUnwindSafe(self.handle(event)).catch_unwind().await {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e.to_string(),
            Err(panic) => format!("event handler panicked: {}", panic_message(&*panic)),
        };

        tracing::error!(path = %path.display(), kind, error = %message, "Error processing file event");
        self.record_failure(Some(path), message);
    }

    /// Handle one event.
    ///
    /// # Errors
    ///
    /// Returns an error if the file could not be read for a reason other
    /// than having vanished.
    pub async fn handle(&self, event: FileEvent) -> Result<()> {
        if !self.filter.accepts(event.path()) {
            self.stats.events_ignored.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(path = %event.path().display(), "Ignoring event");
            return Ok(());
        }

        self.stats.events_received.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(kind = event.kind(), path = %event.path().display(), "File event");

        match event {
            FileEvent::Created(path) => {
                self.reporter.report(&Report::FileCreated { path: path.clone() });
                self.refresh(&path).await
            }
            FileEvent::Modified(path) => {
                self.reporter.report(&Report::FileModified { path: path.clone() });
                self.refresh(&path).await
            }
            FileEvent::Deleted(path) => {
                self.reporter.report(&Report::FileDeleted { path: path.clone() });
                self.forget(&path);
                Ok(())
            }
        }
    }

    /// Hash `path` and store the result.
    ///
    /// A directory (one just created, or renamed or moved into the root) has
    /// every file below it hashed. A path that vanished or is some other kind
    /// of non-regular file leaves the index untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but could not be read.
    pub async fn refresh(&self, path: &Path) -> Result<()> {
        match self.hash(path).await? {
            Some(digest) => {
                self.store(path, digest);
                Ok(())
            }
            None if path.is_dir() => self.refresh_tree(path).await,
            None => Ok(()),
        }
    }

    /// Hash every accepted file below `dir`.
    ///
    /// A file that fails is reported on its own and does not stop the walk.
    async fn refresh_tree(&self, dir: &Path) -> Result<()> {
        let outcome = scan_directory_async(dir, true, Arc::clone(&self.filter)).await?;
        tracing::debug!(path = %dir.display(), files = outcome.files.len(), "Indexing directory");

        for file in outcome.files {
            match self.hash(&file).await {
                Ok(Some(digest)) => self.store(&file, digest),
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(path = %file.display(), error = %e, "Error processing file event");
                    self.record_failure(Some(file), e.to_string());
                }
            }
        }

        Ok(())
    }

    /// Digest of `path`, or `None` if it vanished or is not a regular file.
    async fn hash(&self, path: &Path) -> Result<Option<Digest>> {
        match self.hasher.hash_file_async(path).await {
            Ok(digest) => Ok(Some(digest)),
            Err(Error::Hash(HashError::NotFound { .. })) => {
                tracing::debug!(path = %path.display(), "File vanished before hashing");
                Ok(None)
            }
            Err(Error::Hash(HashError::NotAFile { .. })) => {
                tracing::trace!(path = %path.display(), "Not a regular file");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn store(&self, path: &Path, digest: Digest) {
        let previous = self.index.upsert(path, digest);
        self.stats.hashes_updated.fetch_add(1, Ordering::Relaxed);

        if previous.map(|p| p.digest) != Some(digest) {
            self.reporter.report(&Report::HashUpdated {
                path: path.to_path_buf(),
                digest,
            });
        }
    }

    /// Drop `path`, and anything that was indexed below it, from the index.
    pub fn forget(&self, path: &Path) -> usize {
        let removed = if self.index.remove(path).is_some() {
            1
        } else {
            self.index.remove_under(path)
        };

        if removed > 0 {
            self.stats
                .entries_removed
                .fetch_add(removed as u64, Ordering::Relaxed);
            tracing::debug!(path = %path.display(), removed, "Removed from index");
        }

        removed
    }

    /// Run one detection cycle and report every duplicate group.
    pub fn run_cycle(&self) -> Vec<DuplicateGroup> {
        self.stats.cycles.fetch_add(1, Ordering::Relaxed);

        let snapshot = self.index.snapshot();
        let groups = find_duplicates(&snapshot);

        for group in &groups {
            self.reporter.report(&Report::duplicates(group));
        }

        let summary = DetectionSummary::new(snapshot.len(), &groups);
        tracing::info!(
            files = summary.files_scanned,
            groups = summary.groups,
            duplicates = summary.duplicate_files,
            "Duplicate check complete"
        );

        groups
    }

    /// Run one detection cycle, containing any panic.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if the cycle panicked; the failure has
    /// already been logged and reported.
    pub fn run_cycle_contained(&self) -> Result<Vec<DuplicateGroup>> {
        match std::panic::catch_unwind(AssertUnwindSafe(|| self.run_cycle())) {
            Ok(groups) => Ok(groups),
            Err(panic) => {
                let message = format!("detection cycle panicked: {}", panic_message(&*panic));
                tracing::error!(error = %message, "Error occurred while checking for duplicates");
                self.record_failure(None, message.clone());
                Err(Error::internal(message))
            }
        }
    }

    /// Count a failure and report it.
    ///
    /// The error report itself may panic inside a broken reporter; that
    /// panic is logged and dropped.
    fn record_failure(&self, path: Option<PathBuf>, message: String) {
        self.stats.errors.fetch_add(1, Ordering::Relaxed);

        let report = Report::error(path, message);
        if let Err(panic) =
            std::panic::catch_unwind(AssertUnwindSafe(|| self.reporter.report(&report)))
        {
            tracing::error!(
                error = %panic_message(&*panic),
                "Reporter panicked while reporting a failure"
            );
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
