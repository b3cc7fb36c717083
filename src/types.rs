//! Core types for cs3560cli

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ExtractError;

/// Archive format, detected by extension or magic bytes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveKind {
    /// ZIP archive (.zip)
    Zip,
    /// Uncompressed tarball (.tar)
    Tar,
    /// Gzip-compressed tarball (.tar.gz, .tgz)
    TarGz,
    /// 7-Zip archive (.7z)
    SevenZip,
    /// RAR archive (.rar)
    Rar,
}

impl ArchiveKind {
    /// Map a lowercase suffix (with leading dot) to the format it names
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            ".zip" => Some(Self::Zip),
            ".tar" => Some(Self::Tar),
            ".tar.gz" | ".tgz" => Some(Self::TarGz),
            ".7z" => Some(Self::SevenZip),
            ".rar" => Some(Self::Rar),
            _ => None,
        }
    }

    /// Suffixes that name this format
    pub fn suffixes(self) -> &'static [&'static str] {
        match self {
            Self::Zip => &[".zip"],
            Self::Tar => &[".tar"],
            Self::TarGz => &[".tar.gz", ".tgz"],
            Self::SevenZip => &[".7z"],
            Self::Rar => &[".rar"],
        }
    }
}

impl std::fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Zip => "zip",
            Self::Tar => "tar",
            Self::TarGz => "tar.gz",
            Self::SevenZip => "7z",
            Self::Rar => "rar",
        };
        f.write_str(name)
    }
}

/// Kind of filesystem change, after translation from the OS notification
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FsEventKind {
    /// A file appeared
    Created,
    /// File content was written
    Modified,
    /// A file was renamed into `path`
    Moved {
        /// Previous location of the file
        from: PathBuf,
    },
    /// A file was removed (or renamed away)
    Deleted,
}

/// One filesystem change for one path
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FsEvent {
    /// What happened
    pub kind: FsEventKind,
    /// The path it happened to (the destination, for moves)
    pub path: PathBuf,
}

impl FsEvent {
    /// Create an event
    pub fn new(kind: FsEventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

/// An archive whose size has settled and which is queued for extraction
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyArchive {
    /// The archive file
    pub path: PathBuf,
    /// Format implied by the file name, if a codec exists for it
    pub kind: Option<ArchiveKind>,
    /// Directory the archive extracts into (`<parent>/<base name>`)
    pub destination: PathBuf,
}

/// What happened to one extraction request
#[derive(Debug)]
pub enum ExtractionOutcome {
    /// Archive extracted into a fresh destination directory
    Extracted {
        /// Files written (paths under the destination)
        files: Vec<PathBuf>,
    },
    /// Archive merged into an existing destination directory
    Merged {
        /// Files newly added to the destination
        added: Vec<PathBuf>,
        /// Entries left alone because the destination already had them
        kept: usize,
    },
    /// Another extraction of the same archive was already running
    Duplicate,
    /// The archive was not extracted
    Failed(ExtractError),
}

/// Result of [`Extractor::extract`](crate::extraction::Extractor::extract)
#[derive(Debug)]
pub struct ExtractionResult {
    /// The archive that was processed
    pub archive: PathBuf,
    /// Where it was (or would have been) extracted
    pub destination: PathBuf,
    /// How the request ended
    pub outcome: ExtractionOutcome,
}

impl ExtractionResult {
    /// True when the archive content is now present at the destination
    pub fn success(&self) -> bool {
        matches!(
            self.outcome,
            ExtractionOutcome::Extracted { .. } | ExtractionOutcome::Merged { .. }
        )
    }

    /// The error, if extraction did not happen because of one
    pub fn error(&self) -> Option<&ExtractError> {
        match &self.outcome {
            ExtractionOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Lifecycle event published by the watcher
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A recognized archive appeared and is being observed
    ArchiveDetected {
        /// Archive path
        path: PathBuf,
    },
    /// A pending archive went away before it settled
    ArchiveDiscarded {
        /// Archive path
        path: PathBuf,
    },
    /// Archive size settled; extraction is about to start
    ArchiveReady {
        /// Archive path
        path: PathBuf,
        /// Format implied by the name
        kind: Option<ArchiveKind>,
        /// Extraction destination
        destination: PathBuf,
    },
    /// Extraction worker picked the archive up
    ExtractionStarted {
        /// Archive path
        path: PathBuf,
    },
    /// Extraction finished successfully
    ExtractionCompleted {
        /// Archive path
        path: PathBuf,
        /// Extraction destination
        destination: PathBuf,
        /// Number of files written
        files: usize,
    },
    /// Extraction did not run (duplicate trigger or existing destination)
    ExtractionSkipped {
        /// Archive path
        path: PathBuf,
        /// Why it was skipped
        reason: String,
    },
    /// Extraction failed; partial output was removed
    ExtractionFailed {
        /// Archive path
        path: PathBuf,
        /// Machine-readable error code
        code: String,
        /// Human-readable error
        error: String,
    },
    /// The watcher stopped and released its subscriptions
    WatcherStopped,
}

impl Event {
    /// Describe a finished extraction as an event
    pub fn from_result(result: &ExtractionResult) -> Self {
        let path = result.archive.clone();
        match &result.outcome {
            ExtractionOutcome::Extracted { files } => Self::ExtractionCompleted {
                path,
                destination: result.destination.clone(),
                files: files.len(),
            },
            ExtractionOutcome::Merged { added, .. } => Self::ExtractionCompleted {
                path,
                destination: result.destination.clone(),
                files: added.len(),
            },
            ExtractionOutcome::Duplicate => Self::ExtractionSkipped {
                path,
                reason: "extraction already in progress".to_string(),
            },
            ExtractionOutcome::Failed(e @ ExtractError::DestinationExists { .. }) => {
                Self::ExtractionSkipped {
                    path,
                    reason: e.to_string(),
                }
            }
            ExtractionOutcome::Failed(e) => Self::ExtractionFailed {
                path,
                code: e.code().to_string(),
                error: e.to_string(),
            },
        }
    }
}
