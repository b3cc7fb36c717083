mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, WatchZipArgs};
use cs3560cli::{ArchiveWatcher, Event, Extractor, WatchConfig, run_until_signal};
use std::path::Path;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    init_logging();

    let cli = Cli::parse();
    let exit_code = match run(cli).await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {e:#}");
            1
        }
    };

    std::process::exit(exit_code);
}

/// Logs go to stderr so `--json` output on stdout stays machine-readable
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::WatchZip(args) => watch_zip(args).await,
        Commands::ListArchive { archive } => list_archive(&archive).await,
    }
}

async fn watch_zip(args: WatchZipArgs) -> Result<()> {
    let config = args
        .to_config()
        .context("failed to resolve the current directory")?;
    let path = config.path.clone();

    let mut watcher = ArchiveWatcher::new(config).context("failed to set up watcher")?;
    watcher
        .start()
        .with_context(|| format!("failed to watch {}", path.display()))?;

    let printer = args.json.then(|| tokio::spawn(print_events(watcher.subscribe())));

    run_until_signal(watcher).await;

    // The event channel closes once the watcher is gone, which ends the printer
    if let Some(printer) = printer {
        printer.await.ok();
    }
    Ok(())
}

async fn print_events(mut events: broadcast::Receiver<Event>) {
    loop {
        match events.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(error = %e, "failed to serialize event"),
            },
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event printer fell behind, some events were dropped");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

async fn list_archive(archive: &Path) -> Result<()> {
    let parent = archive.parent().unwrap_or_else(|| Path::new("."));
    let extractor = Extractor::from_config(&WatchConfig::new(parent), CancellationToken::new());

    let entries = extractor
        .list_entries(archive)
        .await
        .with_context(|| format!("failed to list {}", archive.display()))?;

    for entry in entries {
        println!("{}", entry.display());
    }
    Ok(())
}
