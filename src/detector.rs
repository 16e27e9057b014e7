//! Duplicate detection over an index snapshot.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::Serialize;

use crate::hasher::Digest;
use crate::index::WatchedFile;

/// Paths that share one digest. Always holds at least two paths, sorted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    /// Shared content digest.
    pub digest: Digest,
    /// Distinct paths in lexicographic order.
    pub paths: Vec<PathBuf>,
}

impl DuplicateGroup {
    /// Number of files in the group.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Groups are never empty; provided for API symmetry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Files beyond the first copy.
    #[must_use]
    pub fn redundant(&self) -> usize {
        self.paths.len().saturating_sub(1)
    }
}

/// Totals for one detection cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DetectionSummary {
    /// Entries in the snapshot.
    pub files_scanned: usize,
    /// Groups found.
    pub groups: usize,
    /// Files that belong to some group.
    pub duplicate_files: usize,
}

impl DetectionSummary {
    /// Summarize a set of groups found in `files_scanned` entries.
    #[must_use]
    pub fn new(files_scanned: usize, groups: &[DuplicateGroup]) -> Self {
        Self {
            files_scanned,
            groups: groups.len(),
            duplicate_files: groups.iter().map(DuplicateGroup::len).sum(),
        }
    }
}

/// Group snapshot entries by digest.
///
/// Every digest shared by two or more distinct paths yields one group.
/// Groups are ordered by digest and paths within a group lexicographically,
/// so identical input always gives identical output.
#[must_use]
pub fn find_duplicates(snapshot: &[WatchedFile]) -> Vec<DuplicateGroup> {
    let mut by_digest: BTreeMap<Digest, BTreeSet<&PathBuf>> = BTreeMap::new();
    for entry in snapshot {
        by_digest.entry(entry.digest).or_default().insert(&entry.path);
    }

    by_digest
        .into_iter()
        .filter(|(_, paths)| paths.len() >= 2)
        .map(|(digest, paths)| DuplicateGroup {
            digest,
            paths: paths.into_iter().cloned().collect(),
        })
        .collect()
}
