//! dupwatch library
//!
//! Monitors a directory tree, fingerprints every file it sees change, and
//! periodically reports groups of files with identical content. Nothing is
//! ever deleted or merged.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod detector;
pub mod engine;
pub mod error;
pub mod hasher;
pub mod index;
pub mod observability;
pub mod reporter;
pub mod watcher;

pub use config::Config;
pub use detector::{find_duplicates, DuplicateGroup};
pub use engine::{Engine, EngineState};
pub use error::{Error, Result};
pub use hasher::{ContentHasher, Digest};
pub use index::{Index, WatchedFile};
pub use reporter::{Report, Reporter};
