//! Report events and the sinks that receive them.
//!
//! The engine hands every observable outcome to a [`Reporter`]. Formatting
//! and storage belong to the reporter; a failing reporter never fails the
//! engine.

mod sink;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::Serialize;

use crate::detector::DuplicateGroup;
use crate::hasher::Digest;

pub use sink::{FileReporter, LineFormat, ReportSink, TracingReporter};

/// Something the engine wants reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Report {
    /// A file appeared under the watch root.
    FileCreated { path: PathBuf },
    /// A file was removed from the watch root.
    FileDeleted { path: PathBuf },
    /// A file's content changed.
    FileModified { path: PathBuf },
    /// A new digest was stored for a file.
    HashUpdated { path: PathBuf, digest: Digest },
    /// Two or more files share one digest.
    DuplicatesDetected { digest: Digest, paths: Vec<PathBuf> },
    /// An event or detection cycle failed.
    Error {
        path: Option<PathBuf>,
        message: String,
    },
}

impl Report {
    /// Build the report for a duplicate group.
    #[must_use]
    pub fn duplicates(group: &DuplicateGroup) -> Self {
        Self::DuplicatesDetected {
            digest: group.digest,
            paths: group.paths.clone(),
        }
    }

    /// Build an error report.
    pub fn error(path: Option<PathBuf>, message: impl Into<String>) -> Self {
        Self::Error {
            path,
            message: message.into(),
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FileCreated { path } => write!(f, "File created: {}", path.display()),
            Self::FileDeleted { path } => write!(f, "File deleted: {}", path.display()),
            Self::FileModified { path } => write!(f, "File modified: {}", path.display()),
            Self::HashUpdated { path, digest } => {
                write!(f, "Hash updated: {} = {digest}", path.display())
            }
            Self::DuplicatesDetected { digest, paths } => {
                write!(f, "Duplicate files detected with hash {digest}: ")?;
                for (i, path) in paths.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", path.display())?;
                }
                Ok(())
            }
            Self::Error {
                path: Some(path),
                message,
            } => write!(f, "Error processing {}: {message}", path.display()),
            Self::Error {
                path: None,
                message,
            } => write!(f, "Error: {message}"),
        }
    }
}

/// Receiver of engine reports.
///
/// Implementations must be cheap to call from many tasks at once, must not
/// block on I/O, and must swallow their own failures.
pub trait Reporter: Send + Sync {
    /// Deliver one report.
    fn report(&self, report: &Report);

    /// Wait until everything reported so far has reached its destination.
    fn flush(&self) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }
}

impl<R: Reporter + ?Sized> Reporter for Arc<R> {
    fn report(&self, report: &Report) {
        (**self).report(report);
    }

    fn flush(&self) -> BoxFuture<'_, ()> {
        (**self).flush()
    }
}

/// Reporter that keeps every report in memory.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    reports: Mutex<Vec<Report>>,
}

impl MemoryReporter {
    /// Create an empty memory reporter.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Copy of everything reported so far.
    #[must_use]
    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().clone()
    }

    /// Drain everything reported so far.
    pub fn take(&self) -> Vec<Report> {
        std::mem::take(&mut *self.reports.lock())
    }

    /// Duplicate reports received so far, as `(digest, paths)` pairs.
    #[must_use]
    pub fn duplicates(&self) -> Vec<(Digest, Vec<PathBuf>)> {
        self.reports
            .lock()
            .iter()
            .filter_map(|r| match r {
                Report::DuplicatesDetected { digest, paths } => Some((*digest, paths.clone())),
                _ => None,
            })
            .collect()
    }

    /// Number of error reports received so far.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.reports
            .lock()
            .iter()
            .filter(|r| matches!(r, Report::Error { .. }))
            .count()
    }
}

impl Reporter for MemoryReporter {
    fn report(&self, report: &Report) {
        self.reports.lock().push(report.clone());
    }
}
