//! File system event types and their mapping from `notify`.

#![allow(clippy::missing_const_for_fn)]

use std::fmt;
use std::path::{Path, PathBuf};

use notify::event::{AccessKind, AccessMode, MetadataKind, ModifyKind, RenameMode};
use notify::EventKind;

/// File system event types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    /// A path appeared.
    Created(PathBuf),
    /// A path's content was written.
    Modified(PathBuf),
    /// A path disappeared.
    Deleted(PathBuf),
}

impl FileEvent {
    /// Get the path associated with this event.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Created(p) | Self::Modified(p) | Self::Deleted(p) => p,
        }
    }

    /// Short name of the event kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Created(_) => "created",
            Self::Modified(_) => "modified",
            Self::Deleted(_) => "deleted",
        }
    }

    /// Translate a raw `notify` event into zero or more file events.
    ///
    /// Renames become a delete of the old path and a create of the new one.
    /// Pure metadata changes and reads are dropped.
    #[must_use]
    pub fn from_notify(event: notify::Event) -> Vec<Self> {
        let notify::Event { kind, paths, .. } = event;

        match kind {
            EventKind::Create(_) => paths.into_iter().map(Self::Created).collect(),
            EventKind::Remove(_) => paths.into_iter().map(Self::Deleted).collect(),
            EventKind::Modify(ModifyKind::Name(mode)) => from_rename(mode, paths),
            EventKind::Modify(
                ModifyKind::Data(_)
                | ModifyKind::Any
                | ModifyKind::Other
                | ModifyKind::Metadata(MetadataKind::WriteTime),
            )
            | EventKind::Access(AccessKind::Close(AccessMode::Write)) => {
                paths.into_iter().map(Self::Modified).collect()
            }
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for FileEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.path().display())
    }
}

fn from_rename(mode: RenameMode, paths: Vec<PathBuf>) -> Vec<FileEvent> {
    match mode {
        RenameMode::From => paths.into_iter().map(FileEvent::Deleted).collect(),
        RenameMode::To => paths.into_iter().map(FileEvent::Created).collect(),
        RenameMode::Both => {
            let mut paths = paths.into_iter();
            let mut events = Vec::with_capacity(2);
            if let Some(from) = paths.next() {
                events.push(FileEvent::Deleted(from));
            }
            if let Some(to) = paths.next() {
                events.push(FileEvent::Created(to));
            }
            events
        }
        // Backend could not tell which side of the rename this is
        RenameMode::Any | RenameMode::Other => paths
            .into_iter()
            .map(|p| {
                if p.exists() {
                    FileEvent::Created(p)
                } else {
                    FileEvent::Deleted(p)
                }
            })
            .collect(),
    }
}
