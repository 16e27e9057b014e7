//! Configuration management for dupwatch.
//!
//! Supports configuration from:
//! - Command-line arguments (highest priority)
//! - Environment variables
//! - JSON settings file (lowest priority)

mod settings;

pub use settings::{
    Config, DEFAULT_CHECK_INTERVAL_SECS, DEFAULT_HASH_CHUNK_BYTES, DEFAULT_SHUTDOWN_GRACE_SECS,
};
