//! Archive extraction
//!
//! [`Extractor`] turns a [`ReadyArchive`] into files on disk:
//! 1. Claims the archive in the extraction lock set (a second claim is a `Duplicate`)
//! 2. Picks a codec from the magic bytes, falling back to the file name
//! 3. Applies the destination policy (`skip` or `merge`)
//! 4. Extracts into a hidden staging directory next to the destination
//! 5. Moves the staged entries into a freshly created destination, or merges them
//!
//! Any failure drops the staging directory, so the destination never holds a partial
//! extraction and a retry starts clean. The lock is released on every exit path.

mod codec;
mod locks;
mod rar;
mod sevenz;
mod shared;
mod tar;
mod zip;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

// Re-exports
pub use self::codec::{ArchiveCodec, CodecResult, codec_for};
pub use self::locks::{ExtractionLockGuard, ExtractionLocks};
pub use self::rar::RarCodec;
pub use self::sevenz::SevenZipCodec;
pub use self::shared::{kind_from_header, sanitize_entry_path, sniff_archive_kind};
pub use self::tar::TarCodec;
pub use self::zip::ZipCodec;

use crate::config::{DestinationPolicy, WatchConfig};
use crate::error::ExtractError;
use crate::filter::{ArchiveFilter, STAGING_PREFIX};
use crate::types::{ArchiveKind, ExtractionOutcome, ExtractionResult, ReadyArchive};
use std::path::{Path, PathBuf};
use tokio::task::spawn_blocking;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Extracts ready archives, at most one extraction per archive path at a time
///
/// Clones share one lock set, so every worker sees the same in-flight archives.
#[derive(Clone, Debug)]
pub struct Extractor {
    filter: ArchiveFilter,
    policy: DestinationPolicy,
    locks: ExtractionLocks,
    cancel: CancellationToken,
}

impl Extractor {
    /// Create an extractor; `cancel` stops extractions between archive members
    pub fn new(filter: ArchiveFilter, policy: DestinationPolicy, cancel: CancellationToken) -> Self {
        Self {
            filter,
            policy,
            locks: ExtractionLocks::default(),
            cancel,
        }
    }

    /// Create an extractor from a watch configuration
    pub fn from_config(config: &WatchConfig, cancel: CancellationToken) -> Self {
        Self::new(
            ArchiveFilter::from_config(config),
            config.destination_policy,
            cancel,
        )
    }

    /// The shared lock set
    pub fn locks(&self) -> &ExtractionLocks {
        &self.locks
    }

    /// Build the ready record for an archive path, as the watcher would
    pub fn ready_archive(&self, path: &Path) -> Option<ReadyArchive> {
        Some(ReadyArchive {
            path: path.to_path_buf(),
            kind: self.filter.kind_of(path),
            destination: self.filter.destination_for(path)?,
        })
    }

    /// Extract an archive into its destination
    ///
    /// Never returns an error: per-archive failures are reported in the outcome and
    /// logged, and leave no output behind.
    pub async fn extract(&self, ready: ReadyArchive) -> ExtractionResult {
        let archive = ready.path.clone();
        let destination = ready.destination.clone();

        let Some(guard) = self.locks.try_acquire(&archive) else {
            debug!(?archive, "extraction already in progress, ignoring duplicate trigger");
            return ExtractionResult {
                archive,
                destination,
                outcome: ExtractionOutcome::Duplicate,
            };
        };

        info!(?archive, ?destination, "extracting archive");
        debug!(locked = ?guard.path(), in_flight = self.locks.len(), "extraction lock held");

        let outcome = match self.run(ready).await {
            Ok(outcome) => outcome,
            Err(e) => {
                match &e {
                    ExtractError::DestinationExists { .. } => {
                        warn!(?archive, ?destination, "target folder already exists, skipping the extraction")
                    }
                    ExtractError::Cancelled { .. } => {
                        info!(?archive, "extraction cancelled, partial output removed")
                    }
                    _ => warn!(?archive, error = %e, "failed to extract archive"),
                }
                ExtractionOutcome::Failed(e)
            }
        };

        ExtractionResult {
            archive,
            destination,
            outcome,
        }
    }

    /// Entry names stored in an archive
    pub async fn list_entries(&self, archive: &Path) -> Result<Vec<PathBuf>, ExtractError> {
        let kind = self.resolve_kind(archive).await?;
        let archive_owned = archive.to_path_buf();

        spawn_blocking(move || codec_for(kind).list_entries(&archive_owned))
            .await
            .map_err(|e| ExtractError::failed(archive, format!("listing task panicked: {e}")))?
    }

    async fn run(&self, ready: ReadyArchive) -> Result<ExtractionOutcome, ExtractError> {
        let kind = self.resolve_kind(&ready.path).await?;
        let ReadyArchive {
            path: archive,
            destination,
            ..
        } = ready;

        let merge_into_existing = match tokio::fs::symlink_metadata(&destination).await {
            Ok(meta) if meta.is_dir() && self.policy == DestinationPolicy::Merge => true,
            Ok(_) => return Err(ExtractError::DestinationExists { destination }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                return Err(ExtractError::failed(
                    &archive,
                    format!("failed to inspect destination {}: {e}", destination.display()),
                ));
            }
        };

        let cancel = self.cancel.clone();
        let task_archive = archive.clone();
        spawn_blocking(move || {
            extract_blocking(kind, &task_archive, &destination, merge_into_existing, &cancel)
        })
        .await
        .map_err(|e| ExtractError::failed(&archive, format!("extraction task panicked: {e}")))?
    }

    /// Pick the codec: magic bytes first, then the configured suffix
    async fn resolve_kind(&self, archive: &Path) -> Result<ArchiveKind, ExtractError> {
        let unsupported = |reason: String| ExtractError::UnsupportedFormat {
            archive: archive.to_path_buf(),
            reason,
        };

        let Some(suffix) = self.filter.matched_suffix(archive) else {
            return Err(unsupported("file name has no recognized archive suffix".into()));
        };
        let by_name = ArchiveKind::from_suffix(suffix);

        let sniff_path = archive.to_path_buf();
        let by_magic = spawn_blocking(move || sniff_archive_kind(&sniff_path))
            .await
            .map_err(|e| ExtractError::failed(archive, format!("sniff task panicked: {e}")))?
            .map_err(|e| ExtractError::failed(archive, format!("failed to read archive: {e}")))?;

        let kind = by_magic
            .or(by_name)
            .ok_or_else(|| unsupported(format!("no codec for '{suffix}' archives")))?;

        if !self.filter.allows(kind) {
            return Err(unsupported(format!("{kind} archives are not enabled")));
        }

        if by_name.is_some_and(|named| named != kind) {
            debug!(?archive, %kind, "archive content does not match its name, using content");
        }
        Ok(kind)
    }
}

/// Extract into staging, then move the staging content to the destination
fn extract_blocking(
    kind: ArchiveKind,
    archive: &Path,
    destination: &Path,
    merge_into_existing: bool,
    cancel: &CancellationToken,
) -> Result<ExtractionOutcome, ExtractError> {
    let parent = destination
        .parent()
        .ok_or_else(|| ExtractError::failed(archive, "destination has no parent directory"))?;

    // Same parent as the destination so every final rename stays on one filesystem.
    // Dropping the TempDir removes whatever was staged, which is the cleanup on every
    // error path.
    let staging = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(parent)
        .map_err(|e| ExtractError::failed(archive, format!("failed to create staging directory: {e}")))?;

    let codec = codec_for(kind);
    debug!(?archive, kind = %codec.kind(), staging = ?staging.path(), "extracting into staging");
    let staged = codec.extract_all(archive, staging.path(), cancel)?;

    // Last chance to abandon cleanly before anything becomes visible
    codec::check_cancelled(cancel, archive)?;

    if merge_into_existing {
        return merge_staging(archive, staging.path(), destination);
    }

    // `create_dir` fails on anything already there, including an empty directory
    // that appeared after the policy check
    let placement = Placement {
        dirs: vec![destination.to_path_buf()],
        files: top_level_entries(archive, staging.path(), destination)?,
    };
    placement.apply(archive)?;

    let files = relocate(staged, staging.path(), destination);
    info!(
        ?archive,
        ?destination,
        extracted_count = files.len(),
        "extraction complete"
    );
    Ok(ExtractionOutcome::Extracted { files })
}

/// Move staged entries that do not exist yet into an existing destination
///
/// Every conflict is found before anything moves, and a failure while moving puts the
/// moved entries back, so a failed merge leaves the destination as it was.
fn merge_staging(
    archive: &Path,
    staging: &Path,
    destination: &Path,
) -> Result<ExtractionOutcome, ExtractError> {
    let mut placement = Placement::default();
    let mut kept = 0;

    for entry in WalkDir::new(staging).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            ExtractError::failed(archive, format!("failed to read staging directory: {e}"))
        })?;
        let Ok(relative) = entry.path().strip_prefix(staging) else {
            continue;
        };
        let target = destination.join(relative);
        let existing = match target.symlink_metadata() {
            Ok(meta) => Some(meta),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                return Err(ExtractError::failed(
                    archive,
                    format!("failed to inspect {}: {e}", target.display()),
                ));
            }
        };

        match (entry.file_type().is_dir(), existing) {
            (true, Some(meta)) if meta.is_dir() => {}
            (true, Some(_)) => {
                return Err(ExtractError::failed(
                    archive,
                    format!("{} exists and is not a directory", target.display()),
                ));
            }
            (true, None) => placement.dirs.push(target),
            (false, Some(_)) => {
                debug!(?target, "file already present, keeping existing copy");
                kept += 1;
            }
            (false, None) => placement.files.push((entry.into_path(), target)),
        }
    }

    placement.apply(archive)?;

    if kept > 0 {
        warn!(
            ?archive,
            ?destination,
            kept,
            "existing files were not overwritten during merge"
        );
    }
    let added: Vec<PathBuf> = placement.files.into_iter().map(|(_, target)| target).collect();
    info!(
        ?archive,
        ?destination,
        added = added.len(),
        created_dirs = placement.dirs.len(),
        "merge complete"
    );

    Ok(ExtractionOutcome::Merged { added, kept })
}

/// Staging children paired with their place under `destination`
fn top_level_entries(
    archive: &Path,
    staging: &Path,
    destination: &Path,
) -> Result<Vec<(PathBuf, PathBuf)>, ExtractError> {
    let read_failed =
        |e: std::io::Error| ExtractError::failed(archive, format!("failed to read staging directory: {e}"));

    let mut entries = Vec::new();
    for entry in std::fs::read_dir(staging).map_err(read_failed)? {
        let entry = entry.map_err(read_failed)?;
        entries.push((entry.path(), destination.join(entry.file_name())));
    }
    Ok(entries)
}

/// Directories to create and staged entries to move, applied all or nothing
#[derive(Debug, Default)]
struct Placement {
    /// Created in order, so parents come before children
    dirs: Vec<PathBuf>,
    /// `(staged, target)` pairs
    files: Vec<(PathBuf, PathBuf)>,
}

impl Placement {
    fn apply(&self, archive: &Path) -> Result<(), ExtractError> {
        let mut created = 0;
        let mut moved = 0;

        let result = self.place(archive, &mut created, &mut moved);
        if result.is_err() {
            self.undo(created, moved);
        }
        result
    }

    fn place(&self, archive: &Path, created: &mut usize, moved: &mut usize) -> Result<(), ExtractError> {
        for dir in &self.dirs {
            std::fs::create_dir(dir).map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    ExtractError::DestinationExists {
                        destination: dir.clone(),
                    }
                } else {
                    ExtractError::failed(archive, format!("failed to create {}: {e}", dir.display()))
                }
            })?;
            *created += 1;
        }

        for (staged, target) in &self.files {
            std::fs::rename(staged, target).map_err(|e| {
                ExtractError::failed(
                    archive,
                    format!("failed to move {} into place: {e}", target.display()),
                )
            })?;
            *moved += 1;
        }
        Ok(())
    }

    /// Put the first `moved` entries back into staging and remove the first `created`
    /// directories
    fn undo(&self, created: usize, moved: usize) {
        for (staged, target) in self.files[..moved].iter().rev() {
            if let Err(e) = std::fs::rename(target, staged) {
                warn!(?target, error = %e, "failed to roll back moved entry");
            }
        }
        for dir in self.dirs[..created].iter().rev() {
            if let Err(e) = std::fs::remove_dir(dir) {
                warn!(?dir, error = %e, "failed to remove directory created for extraction");
            }
        }
    }
}

/// Rewrite staged paths to their final location
fn relocate(staged: Vec<PathBuf>, staging: &Path, destination: &Path) -> Vec<PathBuf> {
    staged
        .into_iter()
        .filter_map(|file| {
            file.strip_prefix(staging)
                .ok()
                .map(|relative| destination.join(relative))
        })
        .collect()
}
