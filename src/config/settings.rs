//! Configuration settings and validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::reporter::ReportSink;
use crate::{Error, Result};

/// Default interval between duplicate detection cycles.
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 60;

/// Default read buffer for hashing (80 KiB).
pub const DEFAULT_HASH_CHUNK_BYTES: usize = 81_920;

/// Default time in-flight handlers get to finish on shutdown.
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 5;

/// Main configuration for the duplicate monitor.
///
/// Field names deserialize from camelCase so a settings file reads
/// `watchDirectory`, `checkIntervalSeconds`, `hashChunkBytes`, ...
/// The PascalCase keys of a `ServiceSettings` section (`WatchDirectory`,
/// `LogFilePath`, `CheckIntervalSeconds`, `HashBufferSize`) are accepted too.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct Config {
    /// Root of the directory tree to monitor.
    #[serde(alias = "WatchDirectory")]
    pub watch_directory: PathBuf,

    /// Where reports go (`log`, `file:<path>`, `json:<path>`).
    ///
    /// A bare path is a text file sink.
    #[serde(alias = "LogFilePath")]
    pub report_sink: String,

    /// Seconds between duplicate detection cycles.
    #[serde(alias = "CheckIntervalSeconds")]
    pub check_interval_seconds: u64,

    /// Read buffer size used while hashing.
    #[serde(alias = "HashBufferSize")]
    pub hash_chunk_bytes: usize,

    /// Watch subdirectories too.
    pub recursive: bool,

    /// Hash files already present under the root when the engine starts.
    pub initial_scan: bool,

    /// Gitignore-style patterns for paths that are never hashed.
    pub ignore_patterns: Vec<String>,

    /// Seconds to wait for in-flight handlers during shutdown.
    pub shutdown_grace_seconds: u64,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON.
    pub log_json: bool,
}

/// Settings files may nest everything under a `ServiceSettings` section.
#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SettingsFile {
    service_settings: Config,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            watch_directory: PathBuf::from("./watch"),
            report_sink: "log".to_string(),
            check_interval_seconds: DEFAULT_CHECK_INTERVAL_SECS,
            hash_chunk_bytes: DEFAULT_HASH_CHUNK_BYTES,
            recursive: true,
            initial_scan: false,
            ignore_patterns: Vec::new(),
            shutdown_grace_seconds: DEFAULT_SHUTDOWN_GRACE_SECS,
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl Config {
    /// Create a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a default configuration watching `dir`.
    #[must_use]
    pub fn for_directory(dir: impl Into<PathBuf>) -> Self {
        Self {
            watch_directory: dir.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a JSON settings file.
    ///
    /// Accepts either a flat object or one nested under `"ServiceSettings"`.
    /// Missing keys fall back to defaults. The result is validated.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON,
    /// or holds invalid values.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("cannot read settings file '{}': {e}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    /// Parse configuration from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed or invalid.
    pub fn from_json(raw: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(raw)
            .map_err(|e| Error::config(format!("invalid settings JSON: {e}")))?;

        let config = if value.get("ServiceSettings").is_some() {
            serde_json::from_value::<SettingsFile>(value).map(|f| f.service_settings)
        } else {
            serde_json::from_value::<Self>(value)
        }
        .map_err(|e| Error::config(format!("invalid settings: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.watch_directory.as_os_str().is_empty() {
            return Err(Error::config("watchDirectory cannot be empty"));
        }

        if self.check_interval_seconds == 0 {
            return Err(Error::config("checkIntervalSeconds must be greater than 0"));
        }

        if self.hash_chunk_bytes == 0 {
            return Err(Error::config("hashChunkBytes must be greater than 0"));
        }

        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(Error::config(format!(
                "invalid log level '{}', must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }

        self.sink()?;

        Ok(())
    }

    /// Interval between detection cycles.
    #[must_use]
    pub const fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_seconds)
    }

    /// Grace period for in-flight handlers on shutdown.
    #[must_use]
    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }

    /// Parsed report sink.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink identifier is malformed.
    pub fn sink(&self) -> Result<ReportSink> {
        self.report_sink.parse()
    }
}
