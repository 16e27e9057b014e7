//! Error types and Result aliases for dupwatch.
//!
//! This module defines the error hierarchy used throughout the crate.
//! All public functions return `Result<T, Error>` or `Result<T>`.
//!
//! Only configuration and watch setup failures are fatal to the engine.
//! Per-event and per-cycle failures are contained by the engine and reported.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type alias using dupwatch's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for dupwatch operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error, including an unusable watch root.
    #[error("configuration error: {0}")]
    Config(String),

    /// File watching error.
    #[error("watcher error: {0}")]
    Watcher(#[from] WatcherError),

    /// Content hashing error.
    #[error("hash error: {0}")]
    Hash(#[from] HashError),

    /// Report sink error.
    #[error("report error: {0}")]
    Report(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// File watcher errors.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// Failed to watch path.
    #[error("failed to watch path '{path}': {reason}")]
    WatchFailed { path: String, reason: String },
}

/// Hashing errors.
///
/// Each variant is a single failed attempt; callers never retry.
#[derive(Error, Debug)]
pub enum HashError {
    /// The file vanished before hashing completed.
    #[error("file not found: '{}'", .path.display())]
    NotFound { path: PathBuf },

    /// The path is not a regular file.
    #[error("not a regular file: '{}'", .path.display())]
    NotAFile { path: PathBuf },

    /// The file could not be opened or read (locked, permission denied, read failure).
    #[error("failed to read '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error only means the file disappeared.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Hash(HashError::NotFound { .. }))
    }
}

impl HashError {
    /// Classify an I/O error raised while hashing `path`.
    pub fn from_io(path: &Path, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            Self::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }

    /// Whether the file vanished.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
