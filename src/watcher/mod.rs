//! File system watching.
//!
//! This module provides:
//! - Typed file events mapped from notify-rs notifications
//! - Event sources (OS watcher, hand-fed channel)
//! - Gitignore-style path filtering
//! - A directory scanner for the optional initial pass

mod events;
mod filter;
mod scanner;
mod watcher;

pub use events::FileEvent;
pub use filter::PathFilter;
pub use scanner::{scan_directory, scan_directory_async, ScanOutcome};
pub use watcher::{ChannelSource, EventSource, NotifySource, Subscription};
