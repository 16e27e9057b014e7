//! Directory scanner for the optional initial indexing pass.
//!
//! Walks the watch root and lists every regular file the path filter accepts.

use std::path::{Path, PathBuf};

use ignore::WalkBuilder;

use super::filter::PathFilter;
use crate::Result;

/// Files found by a scan.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Regular files to hash.
    pub files: Vec<PathBuf>,
    /// Entries rejected by the filter.
    pub skipped: u64,
    /// Entries that could not be read.
    pub errors: u64,
}

/// Scan a directory for files to index.
///
/// Hidden files and VCS ignore files get no special treatment: duplicates can
/// live anywhere. Only `filter` decides what is skipped.
#[must_use]
pub fn scan_directory(root: &Path, recursive: bool, filter: &PathFilter) -> ScanOutcome {
    let mut outcome = ScanOutcome::default();

    tracing::info!(path = %root.display(), recursive, "Starting directory scan");

    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .follow_links(false)
        .max_depth(if recursive { None } else { Some(1) })
        .build();

    for entry in walker {
        match entry {
            Ok(entry) => {
                if !entry.file_type().is_some_and(|t| t.is_file()) {
                    continue;
                }

                if filter.accepts(entry.path()) {
                    outcome.files.push(entry.into_path());
                } else {
                    outcome.skipped += 1;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Error walking directory");
                outcome.errors += 1;
            }
        }
    }

    tracing::info!(
        path = %root.display(),
        found = outcome.files.len(),
        skipped = outcome.skipped,
        errors = outcome.errors,
        "Directory scan complete"
    );

    outcome
}

/// Async version of directory scan.
///
/// # Errors
///
/// Returns an error if the blocking scan task fails.
pub async fn scan_directory_async(
    root: &Path,
    recursive: bool,
    filter: std::sync::Arc<PathFilter>,
) -> Result<ScanOutcome> {
    let root = root.to_path_buf();

    tokio::task::spawn_blocking(move || scan_directory(&root, recursive, &filter))
        .await
        .map_err(|e| crate::Error::internal(format!("Scan task failed: {e}")))
}
