//! dupwatch - duplicate file monitor
//!
//! Entry point for the monitoring service.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use std::path::PathBuf;

use clap::Parser;
use dupwatch::observability::init_tracing;
use dupwatch::{Config, Engine, Result};
use tokio::signal;

/// dupwatch - report files with identical content under a directory
#[derive(Parser, Debug)]
#[command(name = "dupwatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON settings file (flat, or nested under "ServiceSettings")
    #[arg(short, long, env = "DUPWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Directory to watch
    #[arg(short, long, env = "DUPWATCH_WATCH_DIR")]
    watch: Option<PathBuf>,

    /// Report destination: log, file:<path> or json:<path>
    #[arg(long, env = "DUPWATCH_REPORT_SINK")]
    report_sink: Option<String>,

    /// Seconds between duplicate checks
    #[arg(long, env = "DUPWATCH_CHECK_INTERVAL")]
    check_interval: Option<u64>,

    /// Read buffer size for hashing, in bytes
    #[arg(long, env = "DUPWATCH_HASH_CHUNK_BYTES")]
    hash_chunk_bytes: Option<usize>,

    /// Only watch the top level of the directory
    #[arg(long, env = "DUPWATCH_FLAT")]
    flat: bool,

    /// Hash files already present when starting
    #[arg(long, env = "DUPWATCH_INITIAL_SCAN")]
    initial_scan: bool,

    /// Gitignore-style patterns to skip
    #[arg(short, long, env = "DUPWATCH_IGNORE", value_delimiter = ',')]
    ignore: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "DUPWATCH_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging output
    #[arg(long, env = "DUPWATCH_LOG_JSON")]
    log_json: bool,
}

impl Cli {
    /// Layer command-line values over the settings file (or defaults).
    fn into_config(self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        if let Some(dir) = self.watch {
            config.watch_directory = dir;
        }
        if let Some(sink) = self.report_sink {
            config.report_sink = sink;
        }
        if let Some(secs) = self.check_interval {
            config.check_interval_seconds = secs;
        }
        if let Some(bytes) = self.hash_chunk_bytes {
            config.hash_chunk_bytes = bytes;
        }
        if self.flat {
            config.recursive = false;
        }
        if self.initial_scan {
            config.initial_scan = true;
        }
        if !self.ignore.is_empty() {
            config.ignore_patterns = self.ignore;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if self.log_json {
            config.log_json = true;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Cli::parse().into_config()?;

    // Initialize tracing with configuration
    init_tracing(&config.log_level, config.log_json);

    tracing::info!("dupwatch v{} starting...", env!("CARGO_PKG_VERSION"));
    tracing::debug!(?config, "Configuration loaded");

    let reporter = config.sink()?.build()?;
    let mut engine = Engine::new(config, reporter);

    engine.run_until(shutdown_signal()).await?;

    tracing::info!("dupwatch shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
