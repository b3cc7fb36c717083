//! Command-line interface

use clap::{Args, Parser, Subcommand};
use cs3560cli::{DestinationPolicy, WatchConfig};
use std::path::PathBuf;
use std::time::Duration;

/// Helper tools for CS 3560
#[derive(Parser, Debug)]
#[command(name = "cs3560cli", version, about = "Helper tools for CS 3560")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Watch a directory and extract archives once they finish downloading
    ///
    /// Example: cs3560cli watch-zip ~/Downloads --policy merge
    WatchZip(WatchZipArgs),

    /// Print the entries stored in an archive without extracting it
    ListArchive {
        /// Archive to inspect
        archive: PathBuf,
    },
}

#[derive(Args, Debug)]
pub struct WatchZipArgs {
    /// Directory to watch (defaults to the current directory)
    pub directory: Option<PathBuf>,

    /// How long an archive must stay unchanged before it is extracted, in milliseconds
    #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
    pub settle_ms: u64,

    /// How often pending archives are re-checked, in milliseconds
    #[arg(long, default_value_t = 250, value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_ms: u64,

    /// Archive suffix to recognize, e.g. `.zip` (repeatable; replaces the defaults)
    #[arg(long = "ext", value_name = "SUFFIX")]
    pub extensions: Vec<String>,

    /// What to do when the destination directory already exists: skip or merge
    #[arg(long, default_value = "skip")]
    pub policy: DestinationPolicy,

    /// Print lifecycle events as JSON lines on stdout
    #[arg(long)]
    pub json: bool,
}

impl WatchZipArgs {
    /// Build the watch configuration, resolving the default directory
    pub fn to_config(&self) -> std::io::Result<WatchConfig> {
        let path = match &self.directory {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };

        let mut config = WatchConfig::new(path);
        config.settle_interval = Duration::from_millis(self.settle_ms);
        config.poll_interval = Duration::from_millis(self.poll_ms);
        config.destination_policy = self.policy;
        if !self.extensions.is_empty() {
            config.extensions = self.extensions.iter().map(|ext| normalize_suffix(ext)).collect();
        }
        Ok(config)
    }
}

/// `zip` and `.ZIP` both mean `.zip`
fn normalize_suffix(ext: &str) -> String {
    let ext = ext.trim().to_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{ext}")
    }
}
