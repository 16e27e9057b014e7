//! Report sinks: structured logs and append-only report files.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use chrono::{Local, Utc};
use futures::future::BoxFuture;
use serde::Serialize;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};

use super::{Report, Reporter};
use crate::{Error, Result};

/// Destination for reports, parsed from the `reportSink` setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportSink {
    /// Emit reports as `tracing` events.
    Log,
    /// Append human-readable lines to a file.
    File(PathBuf),
    /// Append one JSON object per line to a file.
    Json(PathBuf),
}

impl FromStr for ReportSink {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let file_path = |rest: &str| {
            if rest.is_empty() {
                Err(Error::config(format!("report sink '{s}' is missing a path")))
            } else {
                Ok(PathBuf::from(rest))
            }
        };

        if s.is_empty() || s.eq_ignore_ascii_case("log") {
            Ok(Self::Log)
        } else if let Some(rest) = s.strip_prefix("file:") {
            file_path(rest).map(Self::File)
        } else if let Some(rest) = s.strip_prefix("json:") {
            file_path(rest).map(Self::Json)
        } else {
            Ok(Self::File(PathBuf::from(s)))
        }
    }
}

impl ReportSink {
    /// Build the reporter for this sink.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Report`] if a file sink is built outside a tokio runtime.
    pub fn build(&self) -> Result<Arc<dyn Reporter>> {
        Ok(match self {
            Self::Log => Arc::new(TracingReporter),
            Self::File(path) => Arc::new(FileReporter::new(path, LineFormat::Text)?),
            Self::Json(path) => Arc::new(FileReporter::new(path, LineFormat::Json)?),
        })
    }
}

/// Reporter that writes each report as a structured log event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, report: &Report) {
        match report {
            Report::FileCreated { path } => {
                tracing::debug!(path = %path.display(), "File created");
            }
            Report::FileDeleted { path } => {
                tracing::debug!(path = %path.display(), "File deleted");
            }
            Report::FileModified { path } => {
                tracing::debug!(path = %path.display(), "File modified");
            }
            Report::HashUpdated { path, digest } => {
                tracing::debug!(path = %path.display(), %digest, "Hash updated");
            }
            Report::DuplicatesDetected { digest, paths } => {
                let files: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
                tracing::info!(%digest, count = paths.len(), ?files, "Duplicate files detected");
            }
            Report::Error {
                path: Some(path),
                message,
            } => {
                tracing::warn!(path = %path.display(), error = %message, "Processing failed");
            }
            Report::Error {
                path: None,
                message,
            } => {
                tracing::warn!(error = %message, "Processing failed");
            }
        }
    }
}

/// Line layout used by [`FileReporter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineFormat {
    /// `YYYY-MM-DD HH:MM:SS - message`, local time.
    Text,
    /// `{"timestamp": ..., "event": ..., ...}`, UTC.
    Json,
}

#[derive(Serialize)]
struct JsonLine<'a> {
    timestamp: chrono::DateTime<Utc>,
    #[serde(flatten)]
    report: &'a Report,
}

enum WriterCommand {
    Line(String),
    Flush(oneshot::Sender<()>),
}

/// Reporter that appends one line per report to a file.
///
/// Lines are queued to a single writer task that keeps the file open, so
/// callers never wait on disk I/O and lines never interleave.
#[derive(Debug)]
pub struct FileReporter {
    path: PathBuf,
    format: LineFormat,
    tx: mpsc::UnboundedSender<WriterCommand>,
}

impl FileReporter {
    /// Create a reporter appending to `path` and spawn its writer task.
    ///
    /// The file and its parent directory are created on the first write.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Report`] if called outside a tokio runtime.
    pub fn new(path: impl AsRef<Path>, format: LineFormat) -> Result<Self> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Report(format!("file reporter needs a tokio runtime: {e}")))?;

        let path = path.as_ref().to_path_buf();
        let (tx, rx) = mpsc::unbounded_channel();
        handle.spawn(write_lines(path.clone(), rx));

        Ok(Self { path, format, tx })
    }

    /// Render one report as a line, without the trailing newline.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn format_line(&self, report: &Report) -> Result<String> {
        match self.format {
            LineFormat::Text => Ok(format!(
                "{} - {report}",
                Local::now().format("%Y-%m-%d %H:%M:%S")
            )),
            LineFormat::Json => serde_json::to_string(&JsonLine {
                timestamp: Utc::now(),
                report,
            })
            .map_err(|e| Error::Report(e.to_string())),
        }
    }
}

impl Reporter for FileReporter {
    fn report(&self, report: &Report) {
        let line = match self.format_line(report) {
            Ok(line) => line,
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "Error formatting report");
                return;
            }
        };

        if self.tx.send(WriterCommand::Line(line)).is_err() {
            tracing::error!(path = %self.path.display(), "Report writer has stopped");
        }
    }

    fn flush(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let (ack, done) = oneshot::channel();
            if self.tx.send(WriterCommand::Flush(ack)).is_ok() {
                let _ = done.await;
            }
        })
    }
}

/// Append queued lines until every sender is gone.
async fn write_lines(path: PathBuf, mut rx: mpsc::UnboundedReceiver<WriterCommand>) {
    let mut file: Option<File> = None;

    while let Some(command) = rx.recv().await {
        match command {
            WriterCommand::Line(line) => {
                if let Err(e) = append_line(&path, &mut file, &line).await {
                    tracing::error!(path = %path.display(), error = %e, "Error writing report");
                    // Reopen on the next line
                    file = None;
                }
            }
            WriterCommand::Flush(ack) => {
                if let Some(f) = file.as_mut() {
                    if let Err(e) = f.flush().await {
                        tracing::error!(path = %path.display(), error = %e, "Error flushing report");
                    }
                }
                let _ = ack.send(());
            }
        }
    }

    tracing::debug!(path = %path.display(), "Report writer finished");
}

async fn append_line(path: &Path, file: &mut Option<File>, line: &str) -> std::io::Result<()> {
    if file.is_none() {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let opened = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        *file = Some(opened);
    }

    if let Some(f) = file.as_mut() {
        f.write_all(format!("{line}\n").as_bytes()).await?;
    }
    Ok(())
}
