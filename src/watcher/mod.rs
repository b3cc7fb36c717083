//! Directory watching with automatic archive extraction
//!
//! [`ArchiveWatcher`] subscribes to one directory (non-recursive), tracks every
//! archive that appears in it until its size settles, and hands each settled archive
//! to the [`Extractor`] on its own task. Notifications, the settle tick and worker
//! completions are all handled by a single `select!` loop, so per-path state has one
//! writer and needs no locking.
//!
//! # Example
//!
//! ```no_run
//! use cs3560cli::{ArchiveWatcher, WatchConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut watcher = ArchiveWatcher::new(WatchConfig::new("/home/me/Downloads"))?;
//! watcher.start()?;
//!
//! let mut events = watcher.subscribe();
//! tokio::spawn(async move {
//!     while let Ok(event) = events.recv().await {
//!         println!("{event:?}");
//!     }
//! });
//!
//! // Runs until the shutdown token is cancelled
//! watcher.run().await;
//! # Ok(())
//! # }
//! ```

mod tracker;

pub use tracker::{ArchiveTracker, PathState, PendingArchive, Transition};

use crate::config::WatchConfig;
use crate::error::{Error, Result};
use crate::extraction::Extractor;
use crate::filter::{ArchiveFilter, is_staging_dir};
use crate::types::{Event, ExtractionResult, FsEvent, FsEventKind};
use notify::event::{AccessKind, AccessMode, ModifyKind, RenameMode};
use notify::{Config as NotifyConfig, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinError, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// A worker's archive path with its extraction result, or the panic that ended it
type WorkerOutput = (PathBuf, std::result::Result<ExtractionResult, JoinError>);

/// Watches a directory and extracts archives once they finish downloading
pub struct ArchiveWatcher {
    /// Validated configuration
    config: WatchConfig,

    /// OS subscription; `None` once released
    watcher: Option<RecommendedWatcher>,

    /// Raw notifications forwarded by the notify callback
    rx: mpsc::UnboundedReceiver<notify::Result<notify::Event>>,

    /// Lifecycle event bus (multiple subscribers supported)
    event_tx: broadcast::Sender<Event>,

    /// Per-path lifecycle state
    tracker: ArchiveTracker,

    /// Shared with every extraction task
    extractor: Extractor,

    /// Stops the loop and every running extraction
    shutdown: CancellationToken,
}

impl ArchiveWatcher {
    /// Create a watcher for `config.path`
    ///
    /// # Errors
    /// Returns [`Error::Config`] for an invalid configuration and
    /// [`Error::WatchSubscriptionFailed`] if the OS watcher cannot be created.
    pub fn new(config: WatchConfig) -> Result<Self> {
        config.validate()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let watcher = RecommendedWatcher::new(
            move |res| {
                // Receiver gone means the loop has stopped; nothing left to notify
                tx.send(res).ok();
            },
            NotifyConfig::default(),
        )
        .map_err(|e| Error::WatchSubscriptionFailed {
            path: config.path.clone(),
            reason: e.to_string(),
        })?;

        let (event_tx, _rx) = broadcast::channel(1000);
        let shutdown = CancellationToken::new();
        let tracker = ArchiveTracker::new(
            config.path.clone(),
            ArchiveFilter::from_config(&config),
            config.settle_interval,
        );
        let extractor = Extractor::from_config(&config, shutdown.clone());

        Ok(Self {
            config,
            watcher: Some(watcher),
            rx,
            event_tx,
            tracker,
            extractor,
            shutdown,
        })
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Token that stops [`run`](Self::run) when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// The configuration this watcher runs with
    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    /// Register the directory with the OS watcher
    ///
    /// Stale staging directories left by an interrupted run are removed first.
    ///
    /// # Errors
    /// Returns [`Error::WatchSubscriptionFailed`] if the directory does not exist, is
    /// not a directory, or cannot be observed.
    pub fn start(&mut self) -> Result<()> {
        let path = self.config.path.clone();
        let subscription_failed = |reason: String| Error::WatchSubscriptionFailed {
            path: path.clone(),
            reason,
        };

        let meta = std::fs::metadata(&path).map_err(|e| subscription_failed(e.to_string()))?;
        if !meta.is_dir() {
            return Err(subscription_failed("not a directory".to_string()));
        }

        // Notifications carry resolved paths; track against the same form
        let root = std::fs::canonicalize(&path).map_err(|e| subscription_failed(e.to_string()))?;
        self.tracker = ArchiveTracker::new(
            root.clone(),
            ArchiveFilter::from_config(&self.config),
            self.config.settle_interval,
        );

        sweep_staging_dirs(&root);

        let watcher = self
            .watcher
            .as_mut()
            .ok_or_else(|| subscription_failed("watcher already stopped".to_string()))?;
        watcher
            .watch(&root, RecursiveMode::NonRecursive)
            .map_err(|e| subscription_failed(e.to_string()))?;

        info!(
            path = %root.display(),
            settle_ms = self.config.settle_interval.as_millis() as u64,
            policy = %self.config.destination_policy,
            "watching directory for archives"
        );
        Ok(())
    }

    /// Run the event loop until the shutdown token is cancelled
    ///
    /// On shutdown the OS subscription is released first, then running extractions
    /// are awaited (they stop before their next archive member and clean up), and
    /// finally [`Event::WatcherStopped`] is published.
    pub async fn run(mut self) {
        let shutdown = self.shutdown.clone();
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut workers: JoinSet<WorkerOutput> = JoinSet::new();

        debug!("archive watcher loop started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(res) = self.rx.recv() => self.handle_notification(res),
                Some(joined) = workers.join_next(), if !workers.is_empty() => {
                    self.handle_completion(joined)
                }
                _ = ticker.tick() => self.handle_tick(&mut workers),
            }
        }

        // Releases the OS subscription
        drop(self.watcher.take());
        info!(in_flight = workers.len(), "stopping archive watcher");

        while let Some(joined) = workers.join_next().await {
            self.handle_completion(joined);
        }

        self.emit_event(Event::WatcherStopped);
        info!("archive watcher stopped");
    }

    fn handle_notification(&mut self, res: notify::Result<notify::Event>) {
        let event = match res {
            Ok(event) => event,
            Err(e) => {
                error!(error = %e, "filesystem watcher error");
                return;
            }
        };

        let now = Instant::now();
        for fs_event in translate_event(event) {
            for transition in self.tracker.apply(&fs_event, now, probe_size) {
                match transition {
                    Transition::Detected(path) => {
                        debug!(?path, "archive detected, waiting for it to settle");
                        self.emit_event(Event::ArchiveDetected { path });
                    }
                    Transition::Discarded(path) => {
                        debug!(?path, "archive removed before it settled");
                        self.emit_event(Event::ArchiveDiscarded { path });
                    }
                    Transition::Deferred(path) => {
                        debug!(?path, "archive changed during extraction, will re-check afterwards");
                    }
                    Transition::Refreshed(_) | Transition::Ignored => {}
                }
            }
        }
    }

    fn handle_tick(&mut self, workers: &mut JoinSet<WorkerOutput>) {
        let (promoted, discarded) = self.tracker.tick(Instant::now(), probe_size);

        for path in discarded {
            debug!(?path, "pending archive disappeared");
            self.emit_event(Event::ArchiveDiscarded { path });
        }

        for ready in promoted {
            info!(archive = ?ready.path, destination = ?ready.destination, "archive ready");
            self.emit_event(Event::ArchiveReady {
                path: ready.path,
                kind: ready.kind,
                destination: ready.destination,
            });
        }

        for ready in self.tracker.take_ready() {
            self.emit_event(Event::ExtractionStarted {
                path: ready.path.clone(),
            });
            let extractor = self.extractor.clone();
            let archive = ready.path.clone();
            // The inner task isolates a panicking codec, so the path always comes back
            workers.spawn(async move {
                let extracted = tokio::spawn(async move { extractor.extract(ready).await }).await;
                (archive, extracted)
            });
        }
    }

    fn handle_completion(&mut self, joined: std::result::Result<WorkerOutput, JoinError>) {
        let (archive, extracted) = match joined {
            Ok(output) => output,
            Err(e) => {
                error!(error = %e, "extraction worker failed to complete");
                return;
            }
        };

        if self.tracker.finish(&archive, Instant::now()) {
            debug!(?archive, "archive was rewritten during extraction, tracking again");
        }

        match extracted {
            Ok(result) => self.emit_event(Event::from_result(&result)),
            Err(e) => {
                error!(?archive, error = %e, "extraction task panicked");
                self.emit_event(Event::ExtractionFailed {
                    path: archive,
                    code: "extraction_failed".to_string(),
                    error: format!("extraction task panicked: {e}"),
                });
            }
        }
    }

    /// Send to every subscriber; dropped silently when there are none
    fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}

/// Current size of a regular file, `None` if it is gone or not a file
fn probe_size(path: &Path) -> Option<u64> {
    std::fs::metadata(path)
        .ok()
        .filter(|meta| meta.is_file())
        .map(|meta| meta.len())
}

/// Remove staging directories an interrupted run left behind
fn sweep_staging_dirs(root: &Path) {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, "could not scan for stale staging directories");
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !is_staging_dir(&path) || !entry.file_type().is_ok_and(|t| t.is_dir()) {
            continue;
        }
        match std::fs::remove_dir_all(&path) {
            Ok(()) => info!(?path, "removed stale staging directory"),
            Err(e) => warn!(?path, error = %e, "failed to remove stale staging directory"),
        }
    }
}

/// Translate one OS notification into zero or more [`FsEvent`]s
///
/// Metadata-only changes and plain reads are dropped so that touching a file never
/// restarts its settle timer. A close after writing counts as a modification because
/// some browsers create the final file empty and only close it once it is complete.
pub fn translate_event(event: notify::Event) -> Vec<FsEvent> {
    let per_path = |kind: FsEventKind, paths: Vec<std::path::PathBuf>| {
        paths
            .into_iter()
            .map(|path| FsEvent::new(kind.clone(), path))
            .collect::<Vec<_>>()
    };

    match event.kind {
        EventKind::Create(_) => per_path(FsEventKind::Created, event.paths),
        EventKind::Remove(_) => per_path(FsEventKind::Deleted, event.paths),
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut paths = event.paths.into_iter();
            match (paths.next(), paths.next()) {
                (Some(from), Some(to)) => vec![FsEvent::new(FsEventKind::Moved { from }, to)],
                (Some(only), None) => vec![FsEvent::new(FsEventKind::Modified, only)],
                _ => Vec::new(),
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            per_path(FsEventKind::Deleted, event.paths)
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            per_path(FsEventKind::Created, event.paths)
        }
        EventKind::Modify(_) => per_path(FsEventKind::Modified, event.paths),
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => {
            per_path(FsEventKind::Modified, event.paths)
        }
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}
