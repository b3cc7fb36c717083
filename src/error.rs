//! Error types for cs3560cli
//!
//! Errors fall in two groups:
//! - Startup errors ([`Error::Config`], [`Error::WatchSubscriptionFailed`]) are fatal and
//!   surfaced to the caller, which exits non-zero.
//! - Per-archive errors ([`ExtractError`]) are recovered inside the extractor: logged,
//!   staging output removed, reported as an event. They never stop the watcher.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for cs3560cli operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for cs3560cli
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "settle_interval")
        key: Option<String>,
    },

    /// The target directory cannot be observed
    #[error("cannot watch {path}: {reason}")]
    WatchSubscriptionFailed {
        /// Directory that was to be watched
        path: PathBuf,
        /// Why the subscription failed (missing, not a directory, permission denied)
        reason: String,
    },

    /// Archive extraction error
    #[error("extraction error: {0}")]
    Extract(#[from] ExtractError),
}

impl Error {
    /// Shorthand for a configuration error tied to a key
    pub(crate) fn config(key: &str, message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}

/// Per-archive extraction errors
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Extension or magic bytes not recognized; nothing was written
    #[error("unsupported archive format for {archive}: {reason}")]
    UnsupportedFormat {
        /// The archive that was rejected
        archive: PathBuf,
        /// What made the format unsupported
        reason: String,
    },

    /// Something already exists at the extraction destination
    #[error("destination {destination} already exists")]
    DestinationExists {
        /// The derived destination path
        destination: PathBuf,
    },

    /// Corrupt or truncated archive, or I/O failure while decompressing
    #[error("extraction failed for {archive}: {reason}")]
    ExtractionFailed {
        /// The archive file that failed to extract
        archive: PathBuf,
        /// The reason extraction failed
        reason: String,
    },

    /// Shutdown was requested before the archive was fully extracted
    #[error("extraction of {archive} cancelled")]
    Cancelled {
        /// The archive whose extraction was abandoned
        archive: PathBuf,
    },
}

impl ExtractError {
    pub(crate) fn failed(archive: &std::path::Path, reason: impl Into<String>) -> Self {
        Self::ExtractionFailed {
            archive: archive.to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Machine-readable error code, used in lifecycle events
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedFormat { .. } => "unsupported_format",
            Self::DestinationExists { .. } => "destination_exists",
            Self::ExtractionFailed { .. } => "extraction_failed",
            Self::Cancelled { .. } => "cancelled",
        }
    }
}
