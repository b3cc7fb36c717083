//! # cs3560cli
//!
//! Course tooling for CS 3560. The library half provides `watch-zip`: watch a
//! directory (usually the browser's download folder) and extract every archive that
//! lands there once it has finished downloading.
//!
//! ## Design Philosophy
//!
//! - **Never extract a half-written file** - an archive must stop growing for a full
//!   settle interval before it is touched
//! - **Never leave a mess** - extraction goes through a hidden staging directory, so a
//!   failed or interrupted extraction leaves nothing behind
//! - **Never clobber work** - an existing destination is skipped by default
//! - **Event-driven** - consumers subscribe to lifecycle events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use cs3560cli::{ArchiveWatcher, WatchConfig, run_until_signal};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut watcher = ArchiveWatcher::new(WatchConfig::new("."))?;
//!     watcher.start()?;
//!
//!     // Subscribe to events
//!     let mut events = watcher.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     // Blocks until Ctrl+C / SIGTERM
//!     run_until_signal(watcher).await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Archive extraction
pub mod extraction;
/// Archive name recognition
pub mod filter;
/// Core types
pub mod types;
/// Directory watching
pub mod watcher;

// Re-export commonly used types
pub use config::{DestinationPolicy, WatchConfig};
pub use error::{Error, ExtractError, Result};
pub use extraction::{ArchiveCodec, Extractor};
pub use filter::ArchiveFilter;
pub use types::{
    ArchiveKind, Event, ExtractionOutcome, ExtractionResult, FsEvent, FsEventKind, ReadyArchive,
};
pub use watcher::{ArchiveTracker, ArchiveWatcher};

/// Run a started watcher until a termination signal arrives.
///
/// On the signal the watcher's shutdown token is cancelled and this waits for the
/// watcher to release its subscription and finish (or abandon) running extractions.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use cs3560cli::{ArchiveWatcher, WatchConfig, run_until_signal};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut watcher = ArchiveWatcher::new(WatchConfig::new("/tmp/downloads"))?;
///     watcher.start()?;
///
///     // Run with automatic signal handling
///     run_until_signal(watcher).await;
///
///     Ok(())
/// }
/// ```
pub async fn run_until_signal(watcher: ArchiveWatcher) {
    let shutdown = watcher.shutdown_token();
    let run = watcher.run();
    tokio::pin!(run);

    tokio::select! {
        _ = &mut run => {}
        _ = wait_for_signal() => {
            shutdown.cancel();
            run.await;
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
