//! Configuration types for cs3560cli

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// What to do when the extraction destination already exists
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationPolicy {
    /// Leave the existing destination untouched and report `DestinationExists` (default)
    #[default]
    Skip,
    /// Add entries that do not exist yet; existing files are never overwritten
    Merge,
}

impl std::str::FromStr for DestinationPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "merge" => Ok(Self::Merge),
            other => Err(Error::config(
                "destination_policy",
                format!("unknown policy '{other}' (expected 'skip' or 'merge')"),
            )),
        }
    }
}

impl std::fmt::Display for DestinationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Skip => "skip",
            Self::Merge => "merge",
        })
    }
}

/// Watch-and-extract configuration
///
/// One `WatchConfig` describes one watch target. Only the top level of `path` is
/// observed; subdirectories (including extraction destinations) are ignored.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Directory to watch for archives
    pub path: PathBuf,

    /// How long an archive's size must stay unchanged before it is extracted (default: 1s)
    #[serde(default = "default_settle_interval", with = "duration_ms_serde")]
    pub settle_interval: Duration,

    /// How often pending archives are re-checked (default: 250ms)
    #[serde(default = "default_poll_interval", with = "duration_ms_serde")]
    pub poll_interval: Duration,

    /// Recognized archive suffixes, with leading dot (e.g. ".zip", ".tar.gz")
    #[serde(default = "default_archive_extensions")]
    pub extensions: Vec<String>,

    /// Suffixes marking in-progress downloads; such files are never tracked
    #[serde(default = "default_ignored_suffixes")]
    pub ignored_suffixes: Vec<String>,

    /// Behaviour when the destination directory already exists
    #[serde(default)]
    pub destination_policy: DestinationPolicy,
}

impl WatchConfig {
    /// Default configuration for the given directory
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            settle_interval: default_settle_interval(),
            poll_interval: default_poll_interval(),
            extensions: default_archive_extensions(),
            ignored_suffixes: default_ignored_suffixes(),
            destination_policy: DestinationPolicy::default(),
        }
    }

    /// Check the tunables for values that would make the watcher misbehave
    ///
    /// The watch path itself is checked when the watcher subscribes, so a missing
    /// directory is reported as `WatchSubscriptionFailed` rather than here.
    pub fn validate(&self) -> Result<()> {
        if self.settle_interval.is_zero() {
            return Err(Error::config("settle_interval", "must be greater than zero"));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::config("poll_interval", "must be greater than zero"));
        }
        if self.extensions.is_empty() {
            return Err(Error::config("extensions", "at least one archive suffix is required"));
        }
        for suffix in &self.extensions {
            if suffix.len() < 2 || !suffix.starts_with('.') {
                return Err(Error::config(
                    "extensions",
                    format!("suffix '{suffix}' must start with '.'"),
                ));
            }
        }
        // Ignored suffixes need no dot: editor backups end in a bare '~'
        if self.ignored_suffixes.iter().any(String::is_empty) {
            return Err(Error::config("ignored_suffixes", "suffixes must not be empty"));
        }
        Ok(())
    }
}

fn default_settle_interval() -> Duration {
    Duration::from_millis(1000)
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(250)
}

fn default_archive_extensions() -> Vec<String> {
    vec![
        ".zip".into(),
        ".tar".into(),
        ".tar.gz".into(),
        ".tgz".into(),
        ".7z".into(),
        ".rar".into(),
    ]
}

fn default_ignored_suffixes() -> Vec<String> {
    vec![
        ".crdownload".into(),
        ".part".into(),
        ".partial".into(),
        ".download".into(),
        ".tmp".into(),
        "~".into(),
    ]
}

// Durations are stored as integer milliseconds
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
