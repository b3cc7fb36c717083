//! Archive name recognition
//!
//! Decides whether a path names a recognized archive, whether it is a hidden or
//! in-progress download, and where it extracts to. Matching is case-insensitive and
//! uses the longest configured suffix, so `hw1.tar.gz` matches `.tar.gz` before `.gz`.

use std::path::{Path, PathBuf};

use crate::config::WatchConfig;
use crate::types::ArchiveKind;

/// Prefix of the hidden staging directories the extractor creates
pub const STAGING_PREFIX: &str = ".watch-zip-";

/// Recognizes archive file names
#[derive(Clone, Debug)]
pub struct ArchiveFilter {
    /// Lowercase suffixes, longest first
    extensions: Vec<String>,
    /// Lowercase suffixes of partial downloads
    ignored_suffixes: Vec<String>,
}

impl ArchiveFilter {
    /// Build a filter from suffix lists
    pub fn new<S: AsRef<str>>(extensions: &[S], ignored_suffixes: &[S]) -> Self {
        let mut extensions: Vec<String> = extensions
            .iter()
            .map(|s| s.as_ref().to_lowercase())
            .collect();
        extensions.sort();
        extensions.dedup();
        extensions.sort_by_key(|s| std::cmp::Reverse(s.len()));

        Self {
            extensions,
            ignored_suffixes: ignored_suffixes
                .iter()
                .map(|s| s.as_ref().to_lowercase())
                .collect(),
        }
    }

    /// Build a filter from a watch configuration
    pub fn from_config(config: &WatchConfig) -> Self {
        Self::new(&config.extensions, &config.ignored_suffixes)
    }

    /// The configured suffix this path ends with, if any
    ///
    /// Hidden files and partial downloads never match.
    pub fn matched_suffix(&self, path: &Path) -> Option<&str> {
        let name = path.file_name()?.to_str()?.to_lowercase();
        if self.is_transient_name(&name) {
            return None;
        }

        self.extensions
            .iter()
            .find(|ext| name.len() > ext.len() && name.ends_with(ext.as_str()))
            .map(String::as_str)
    }

    /// True if the path names a recognized archive
    pub fn is_archive(&self, path: &Path) -> bool {
        self.matched_suffix(path).is_some()
    }

    /// Format implied by the file name
    pub fn kind_of(&self, path: &Path) -> Option<ArchiveKind> {
        self.matched_suffix(path).and_then(ArchiveKind::from_suffix)
    }

    /// True if `kind` is enabled by at least one configured suffix
    pub fn allows(&self, kind: ArchiveKind) -> bool {
        kind.suffixes()
            .iter()
            .any(|suffix| self.extensions.iter().any(|ext| ext == suffix))
    }

    /// Extraction destination: the archive's directory joined with its base name
    ///
    /// `/w/hw1.tar.gz` extracts into `/w/hw1`.
    pub fn destination_for(&self, path: &Path) -> Option<PathBuf> {
        let suffix_len = self.matched_suffix(path)?.len();
        let name = path.file_name()?.to_str()?;
        // Suffixes are ASCII, so the lowercase length is also the byte length in `name`
        let base = name.get(..name.len() - suffix_len)?;
        if base.is_empty() {
            return None;
        }
        Some(path.with_file_name(base))
    }

    fn is_transient_name(&self, lowercase_name: &str) -> bool {
        lowercase_name.starts_with('.')
            || self
                .ignored_suffixes
                .iter()
                .any(|suffix| lowercase_name.ends_with(suffix.as_str()))
    }
}

/// True for the extractor's own staging directories
pub fn is_staging_dir(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(STAGING_PREFIX))
}
