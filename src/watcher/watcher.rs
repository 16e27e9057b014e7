//! Event sources: OS notifications via notify-rs, or a manually fed channel.

#![allow(clippy::module_inception)]

use std::any::Any;
use std::path::Path;

use notify::{RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::events::FileEvent;
use crate::error::WatcherError;
use crate::Result;

/// Capacity of the event channel between the OS watcher and the engine.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Something that can deliver file events for a directory tree.
pub trait EventSource: Send + Sync {
    /// Start delivering events for paths under `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be watched.
    fn subscribe(&self, root: &Path, recursive: bool) -> Result<Subscription>;
}

/// A live stream of file events.
///
/// Dropping the subscription unsubscribes from the source.
pub struct Subscription {
    events: mpsc::Receiver<FileEvent>,
    _guard: Option<Box<dyn Any + Send>>,
}

impl Subscription {
    /// Wrap a receiver, keeping `guard` alive for as long as the subscription.
    pub fn new(events: mpsc::Receiver<FileEvent>, guard: Option<Box<dyn Any + Send>>) -> Self {
        Self {
            events,
            _guard: guard,
        }
    }

    /// Receive the next event.
    ///
    /// Returns `None` once the source has shut down.
    pub async fn recv(&mut self) -> Option<FileEvent> {
        self.events.recv().await
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("has_guard", &self._guard.is_some())
            .finish_non_exhaustive()
    }
}

/// Event source backed by the platform's recommended `notify` watcher.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotifySource;

impl EventSource for NotifySource {
    fn subscribe(&self, root: &Path, recursive: bool) -> Result<Subscription> {
        if !root.exists() {
            return Err(WatcherError::WatchFailed {
                path: root.display().to_string(),
                reason: "directory does not exist".to_string(),
            }
            .into());
        }

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let mut watcher = notify::recommended_watcher(
            move |result: std::result::Result<notify::Event, notify::Error>| match result {
                Ok(event) => {
                    for file_event in FileEvent::from_notify(event) {
                        // Receiver gone means the subscription was dropped
                        if event_tx.blocking_send(file_event).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    tracing::error!("Watch error: {:?}", e);
                }
            },
        )
        .map_err(|e| WatcherError::WatchFailed {
            path: root.display().to_string(),
            reason: e.to_string(),
        })?;

        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };

        watcher
            .watch(root, mode)
            .map_err(|e| WatcherError::WatchFailed {
                path: root.display().to_string(),
                reason: e.to_string(),
            })?;

        tracing::info!(path = %root.display(), recursive, "Watching directory");

        let guard: Box<dyn Any + Send> = Box::new(watcher);
        Ok(Subscription::new(event_rx, Some(guard)))
    }
}

/// Event source fed by hand through an [`mpsc::Sender`].
///
/// Useful for embedding the engine behind another notification mechanism
/// and for driving it deterministically. Supports a single subscription.
#[derive(Debug)]
pub struct ChannelSource {
    receiver: Mutex<Option<mpsc::Receiver<FileEvent>>>,
}

impl ChannelSource {
    /// Create a source and the sender that feeds it.
    #[must_use]
    pub fn new() -> (Self, mpsc::Sender<FileEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        (
            Self {
                receiver: Mutex::new(Some(rx)),
            },
            tx,
        )
    }
}

impl EventSource for ChannelSource {
    fn subscribe(&self, root: &Path, _recursive: bool) -> Result<Subscription> {
        let receiver = self
            .receiver
            .lock()
            .take()
            .ok_or_else(|| WatcherError::WatchFailed {
                path: root.display().to_string(),
                reason: "channel source already subscribed".to_string(),
            })?;

        tracing::debug!(path = %root.display(), "Subscribed to channel source");
        Ok(Subscription::new(receiver, None))
    }
}
