use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Set of archive paths currently being extracted
///
/// `try_acquire` checks and inserts under a single lock acquisition, so two callers
/// can never both claim the same path. Clones share the same set.
#[derive(Clone, Debug, Default)]
pub struct ExtractionLocks {
    active: Arc<Mutex<HashSet<PathBuf>>>,
}

impl ExtractionLocks {
    /// Claim `path`; `None` if it is already claimed
    pub fn try_acquire(&self, path: &Path) -> Option<ExtractionLockGuard> {
        if self.lock().insert(path.to_path_buf()) {
            Some(ExtractionLockGuard {
                locks: self.clone(),
                path: path.to_path_buf(),
            })
        } else {
            None
        }
    }

    /// True while `path` is being extracted
    pub fn is_locked(&self, path: &Path) -> bool {
        self.lock().contains(path)
    }

    /// Number of extractions in progress
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True when no extraction is in progress
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        // A panic while holding the lock cannot leave the set half-updated
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Releases its path from the lock set when dropped
#[derive(Debug)]
pub struct ExtractionLockGuard {
    locks: ExtractionLocks,
    path: PathBuf,
}

impl ExtractionLockGuard {
    /// The claimed archive path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ExtractionLockGuard {
    fn drop(&mut self) {
        self.locks.lock().remove(&self.path);
    }
}
