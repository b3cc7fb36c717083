//! Per-path archive lifecycle
//!
//! Every tracked path moves through `pending → ready → extracting → done`. All
//! transitions go through four functions:
//! - [`ArchiveTracker::apply`] for filesystem events
//! - [`ArchiveTracker::tick`] for the settle timer
//! - [`ArchiveTracker::take_ready`] when extraction is dispatched
//! - [`ArchiveTracker::finish`] when extraction ends
//!
//! The tracker does no I/O itself; file sizes come from a probe closure and time from
//! the caller, so transitions are deterministic under test.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::filter::ArchiveFilter;
use crate::types::{FsEvent, FsEventKind, ReadyArchive};

/// An archive believed to still be downloading
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingArchive {
    /// Archive path
    pub path: PathBuf,
    /// Size seen at the last probe (`None` if it could not be read yet)
    pub last_size: Option<u64>,
    /// Time of the last event or size change
    pub last_activity: Instant,
    /// Consecutive probes that saw an unchanged size
    pub stable_checks: u32,
}

/// Lifecycle state of one tracked path
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathState {
    /// Still being written
    Pending(PendingArchive),
    /// Settled, waiting to be handed to the extractor
    Ready(ReadyArchive),
    /// Extraction running; `rearm` is set when the file was written again meanwhile
    Extracting {
        /// Start a fresh pending record when the extraction finishes
        rearm: bool,
    },
}

/// What an event or timer did to a path
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transition {
    /// Not an archive we track, or nothing to do
    Ignored,
    /// A new pending record was created
    Detected(PathBuf),
    /// An existing pending record saw more activity
    Refreshed(PathBuf),
    /// A pending or ready record was dropped
    Discarded(PathBuf),
    /// Activity while extracting; the path will be re-checked afterwards
    Deferred(PathBuf),
}

/// Owns the lifecycle state of every archive in the watch target
#[derive(Debug)]
pub struct ArchiveTracker {
    root: PathBuf,
    filter: ArchiveFilter,
    settle_interval: Duration,
    states: HashMap<PathBuf, PathState>,
}

impl ArchiveTracker {
    /// Create a tracker for archives directly inside `root`
    pub fn new(root: impl Into<PathBuf>, filter: ArchiveFilter, settle_interval: Duration) -> Self {
        Self {
            root: root.into(),
            filter,
            settle_interval,
            states: HashMap::new(),
        }
    }

    /// Current state of a path
    pub fn state(&self, path: &Path) -> Option<&PathState> {
        self.states.get(path)
    }

    /// Number of tracked paths
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// True when nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Apply one filesystem event
    ///
    /// A move is a delete of the old name followed by a create of the new one; the
    /// returned transitions are in that order.
    pub fn apply<P>(&mut self, event: &FsEvent, now: Instant, probe: P) -> Vec<Transition>
    where
        P: Fn(&Path) -> Option<u64>,
    {
        match &event.kind {
            FsEventKind::Created | FsEventKind::Modified => {
                vec![self.observe_write(&event.path, now, &probe)]
            }
            FsEventKind::Deleted => vec![self.observe_removal(&event.path)],
            FsEventKind::Moved { from } => vec![
                self.observe_removal(from),
                self.observe_write(&event.path, now, &probe),
            ],
        }
    }

    /// Re-check every pending archive and promote the ones that settled
    ///
    /// A pending archive is ready when its size was unchanged across two consecutive
    /// probes, is non-zero, and no activity happened for a full settle interval.
    /// Pending paths that disappeared are discarded.
    pub fn tick<P>(&mut self, now: Instant, probe: P) -> (Vec<ReadyArchive>, Vec<PathBuf>)
    where
        P: Fn(&Path) -> Option<u64>,
    {
        let mut promoted = Vec::new();
        let mut discarded = Vec::new();

        for (path, state) in self.states.iter_mut() {
            let PathState::Pending(pending) = state else {
                continue;
            };

            let Some(size) = probe(path) else {
                discarded.push(path.clone());
                continue;
            };

            if pending.last_size != Some(size) {
                pending.last_size = Some(size);
                pending.last_activity = now;
                pending.stable_checks = 0;
                continue;
            }

            pending.stable_checks += 1;
            let quiet_for = now.saturating_duration_since(pending.last_activity);
            if size > 0 && pending.stable_checks >= 1 && quiet_for >= self.settle_interval {
                let ready = ReadyArchive {
                    path: path.clone(),
                    kind: self.filter.kind_of(path),
                    destination: match self.filter.destination_for(path) {
                        Some(destination) => destination,
                        None => {
                            discarded.push(path.clone());
                            continue;
                        }
                    },
                };
                *state = PathState::Ready(ready.clone());
                promoted.push(ready);
            }
        }

        for path in &discarded {
            self.states.remove(path);
        }

        (promoted, discarded)
    }

    /// Hand every ready archive to the caller, marking it as extracting
    pub fn take_ready(&mut self) -> Vec<ReadyArchive> {
        let mut ready = Vec::new();
        for state in self.states.values_mut() {
            if let PathState::Ready(archive) = state {
                ready.push(archive.clone());
                *state = PathState::Extracting { rearm: false };
            }
        }
        ready
    }

    /// Record that extraction of `path` ended
    ///
    /// Returns true if the path was written again during extraction and is now pending
    /// afresh; otherwise the record is gone.
    pub fn finish(&mut self, path: &Path, now: Instant) -> bool {
        match self.states.remove(path) {
            Some(PathState::Extracting { rearm: true }) => {
                self.states
                    .insert(path.to_path_buf(), PathState::Pending(Self::fresh(path, now, None)));
                true
            }
            Some(other @ (PathState::Pending(_) | PathState::Ready(_))) => {
                // Not ours to finish; leave it alone
                self.states.insert(path.to_path_buf(), other);
                false
            }
            _ => false,
        }
    }

    fn observe_write<P>(&mut self, path: &Path, now: Instant, probe: &P) -> Transition
    where
        P: Fn(&Path) -> Option<u64>,
    {
        if !self.in_scope(path) {
            return Transition::Ignored;
        }

        match self.states.get_mut(path) {
            Some(PathState::Pending(pending)) => {
                let size = probe(path);
                if size != pending.last_size {
                    pending.stable_checks = 0;
                }
                pending.last_size = size;
                pending.last_activity = now;
                Transition::Refreshed(path.to_path_buf())
            }
            Some(PathState::Ready(_)) => {
                // Written again before extraction started: back to pending
                self.states.insert(
                    path.to_path_buf(),
                    PathState::Pending(Self::fresh(path, now, probe(path))),
                );
                Transition::Refreshed(path.to_path_buf())
            }
            Some(PathState::Extracting { rearm }) => {
                *rearm = true;
                Transition::Deferred(path.to_path_buf())
            }
            None => {
                self.states.insert(
                    path.to_path_buf(),
                    PathState::Pending(Self::fresh(path, now, probe(path))),
                );
                Transition::Detected(path.to_path_buf())
            }
        }
    }

    fn observe_removal(&mut self, path: &Path) -> Transition {
        match self.states.get_mut(path) {
            Some(PathState::Pending(_) | PathState::Ready(_)) => {
                self.states.remove(path);
                Transition::Discarded(path.to_path_buf())
            }
            Some(PathState::Extracting { rearm }) => {
                // The running extraction is left to finish
                *rearm = false;
                Transition::Ignored
            }
            None => Transition::Ignored,
        }
    }

    /// Only recognized archives directly inside the root are tracked
    fn in_scope(&self, path: &Path) -> bool {
        path.parent() == Some(self.root.as_path()) && self.filter.is_archive(path)
    }

    fn fresh(path: &Path, now: Instant, size: Option<u64>) -> PendingArchive {
        PendingArchive {
            path: path.to_path_buf(),
            last_size: size,
            last_activity: now,
            stable_checks: 0,
        }
    }
}
