//! Engine lifecycle: owns the index, the event dispatch loop and the
//! periodic duplicate check.
//!
//! ```text
//! Stopped -> Starting -> Running -> Stopping -> Stopped
//! ```
//!
//! While running, every incoming event is handled on its own task and the
//! caller never waits for it. A failure in one task is contained there.

mod handler;

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

pub use handler::{EngineStats, EngineStatsSnapshot, EventHandler};

use crate::config::Config;
use crate::detector::DuplicateGroup;
use crate::hasher::ContentHasher;
use crate::index::Index;
use crate::reporter::Reporter;
use crate::watcher::{
    scan_directory_async, EventSource, FileEvent, NotifySource, PathFilter, Subscription,
};
use crate::{Error, Result};

/// Lifecycle state of an [`Engine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Everything that exists only while the engine runs.
struct Running {
    root: PathBuf,
    handler: Arc<EventHandler>,
    cancel: CancellationToken,
    tracker: TaskTracker,
    dispatch: JoinHandle<()>,
    detection: JoinHandle<()>,
}

/// Duplicate monitoring engine.
pub struct Engine {
    config: Config,
    source: Arc<dyn EventSource>,
    reporter: Arc<dyn Reporter>,
    stats: Arc<EngineStats>,
    state: EngineState,
    running: Option<Running>,
}

impl Engine {
    /// Create an engine that watches with OS notifications.
    #[must_use]
    pub fn new(config: Config, reporter: Arc<dyn Reporter>) -> Self {
        Self::with_source(config, reporter, Arc::new(NotifySource))
    }

    /// Create an engine fed by a custom event source.
    #[must_use]
    pub fn with_source(
        config: Config,
        reporter: Arc<dyn Reporter>,
        source: Arc<dyn EventSource>,
    ) -> Self {
        Self {
            config,
            source,
            reporter,
            stats: EngineStats::new(),
            state: EngineState::Stopped,
            running: None,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> EngineState {
        self.state
    }

    /// Engine configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Canonical watch root, while running.
    #[must_use]
    pub fn root(&self) -> Option<&Path> {
        self.running.as_ref().map(|r| r.root.as_path())
    }

    /// The live index, while running.
    #[must_use]
    pub fn index(&self) -> Option<Arc<Index>> {
        self.running.as_ref().map(|r| Arc::clone(r.handler.index()))
    }

    /// Activity counters, accumulated across restarts.
    #[must_use]
    pub fn stats(&self) -> EngineStatsSnapshot {
        self.stats.snapshot()
    }

    /// Start watching.
    ///
    /// Creates the watch root if it does not exist, subscribes to the event
    /// source and arms the detection timer. The first detection cycle runs
    /// immediately.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the watch root cannot be created or is
    /// not a directory, or a watcher error if subscribing fails. The engine
    /// is left stopped.
    pub async fn start(&mut self) -> Result<()> {
        if self.state != EngineState::Stopped {
            return Err(Error::internal(format!(
                "cannot start engine while {}",
                self.state
            )));
        }

        self.state = EngineState::Starting;
        tracing::info!(path = %self.config.watch_directory.display(), "Engine starting");

        match self.launch() {
            Ok(running) => {
                tracing::info!(
                    root = %running.root.display(),
                    interval_secs = self.config.check_interval_seconds,
                    "Engine running"
                );
                self.running = Some(running);
                self.state = EngineState::Running;
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Engine failed to start");
                self.state = EngineState::Stopped;
                Err(e)
            }
        }
    }

    fn launch(&self) -> Result<Running> {
        self.config.validate()?;

        let root = prepare_root(&self.config.watch_directory)?;
        let mut filter = PathFilter::with_patterns(&root, &self.config.ignore_patterns)?;
        if !self.config.recursive {
            filter = filter.flat();
        }
        let filter = Arc::new(filter);

        let subscription = self.source.subscribe(&root, self.config.recursive)?;

        let handler = Arc::new(EventHandler::new(
            Arc::new(Index::new()),
            ContentHasher::new(self.config.hash_chunk_bytes),
            Arc::clone(&filter),
            Arc::clone(&self.reporter),
            Arc::clone(&self.stats),
        ));

        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();

        if self.config.initial_scan {
            tracker.spawn(initial_scan(
                root.clone(),
                self.config.recursive,
                filter,
                Arc::clone(&handler),
                cancel.clone(),
            ));
        }

        let dispatch = tokio::spawn(dispatch_loop(
            subscription,
            Arc::clone(&handler),
            tracker.clone(),
            cancel.clone(),
        ));

        let detection = tokio::spawn(detection_loop(
            Arc::clone(&handler),
            self.config.check_interval(),
            cancel.clone(),
        ));

        Ok(Running {
            root,
            handler,
            cancel,
            tracker,
            dispatch,
            detection,
        })
    }

    /// Stop watching.
    ///
    /// Stops accepting events, unsubscribes, cancels the timer and gives
    /// in-flight handlers up to the configured grace period. Handlers still
    /// running after that are abandoned. Pending reports are flushed and the
    /// index is discarded.
    ///
    /// Stopping an engine that is not running is a no-op.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        self.state = EngineState::Stopping;
        tracing::info!("Engine stopping");

        running.cancel.cancel();

        for (name, task) in [
            ("dispatch", running.dispatch),
            ("detection", running.detection),
        ] {
            if let Err(e) = task.await {
                tracing::error!(task = name, error = %e, "Engine task failed");
            }
        }

        running.tracker.close();
        let grace = self.config.shutdown_grace();
        if tokio::time::timeout(grace, running.tracker.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                abandoned = running.tracker.len(),
                grace_secs = grace.as_secs(),
                "In-flight handlers abandoned at shutdown"
            );
        }

        self.reporter.flush().await;

        self.state = EngineState::Stopped;
        tracing::info!("Engine stopped");
    }

    /// Start, run until `signal` resolves, then stop.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails to start.
    pub async fn run_until<F>(&mut self, signal: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;
        signal.await;
        self.stop().await;
        Ok(())
    }

    /// Handle one event inline, with the same containment as dispatched events.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine is not running.
    pub async fn handle_event(&self, event: FileEvent) -> Result<()> {
        let handler = self.running_handler()?;
        handler.dispatch(event).await;
        Ok(())
    }

    /// Run one detection cycle inline and return the groups it reported.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine is not running or the cycle failed.
    pub fn run_detection_cycle(&self) -> Result<Vec<DuplicateGroup>> {
        self.running_handler()?.run_cycle_contained()
    }

    fn running_handler(&self) -> Result<Arc<EventHandler>> {
        self.running
            .as_ref()
            .map(|r| Arc::clone(&r.handler))
            .ok_or_else(|| Error::internal(format!("engine is {}", self.state)))
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("state", &self.state)
            .field("root", &self.root())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            running.cancel.cancel();
        }
    }
}

/// Make sure the watch root exists and return its canonical form.
fn prepare_root(dir: &Path) -> Result<PathBuf> {
    if !dir.exists() {
        std::fs::create_dir_all(dir).map_err(|e| {
            Error::config(format!(
                "cannot create watch directory '{}': {e}",
                dir.display()
            ))
        })?;
        tracing::info!(path = %dir.display(), "Created watch directory");
    }

    if !dir.is_dir() {
        return Err(Error::config(format!(
            "watch directory '{}' is not a directory",
            dir.display()
        )));
    }

    dir.canonicalize().map_err(|e| {
        Error::config(format!(
            "cannot resolve watch directory '{}': {e}",
            dir.display()
        ))
    })
}

/// Receive events and hand each one to its own task.
async fn dispatch_loop(
    mut subscription: Subscription,
    handler: Arc<EventHandler>,
    tracker: TaskTracker,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = subscription.recv() => {
                let Some(event) = event else {
                    tracing::warn!("Event source closed");
                    break;
                };
                let handler = Arc::clone(&handler);
                tracker.spawn(async move { handler.dispatch(event).await });
            }
        }
    }

    drop(subscription);
    tracing::debug!("Unsubscribed from event source");
}

/// Run a detection cycle on every tick until cancelled.
async fn detection_loop(handler: Arc<EventHandler>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                // Failures are reported inside; the next tick still runs
                let _ = handler.run_cycle_contained();
            }
        }
    }

    tracing::debug!("Detection timer cancelled");
}

/// Hash every file already present under the root.
async fn initial_scan(
    root: PathBuf,
    recursive: bool,
    filter: Arc<PathFilter>,
    handler: Arc<EventHandler>,
    cancel: CancellationToken,
) {
    let outcome = match scan_directory_async(&root, recursive, filter).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(error = %e, "Initial scan failed");
            return;
        }
    };

    for path in outcome.files {
        if cancel.is_cancelled() {
            tracing::info!("Initial scan interrupted by shutdown");
            return;
        }
        if let Err(e) = handler.refresh(&path).await {
            tracing::warn!(path = %path.display(), error = %e, "Failed to hash file during scan");
        }
    }
}
