//! icloud-s3-sync: resumable one-way copy of an iCloud Photos library into
//! an S3 bucket.
//!
//! Items are fetched one at a time, hashed, compared against the bucket and
//! uploaded only when missing or different. A JSON checkpoint records what is
//! done so interrupted runs pick up where they stopped.

#![warn(clippy::all)]

mod cli;
mod config;
mod dest;
mod fingerprint;
mod retry;
mod shutdown;
mod source;
mod state;
mod sync;
mod types;

use std::io::{IsTerminal, Write};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use cli::Command;
use dest::S3Destination;
use source::ICloudSource;
use state::{CheckpointStore, JsonFileStore};
use sync::{SyncEngine, SyncError};

/// Item count offered for an interactive test run.
const DEFAULT_TEST_ITEMS: usize = 10;

/// Ask for a line on stdout/stdin. `None` on EOF.
fn prompt_line(prompt: &str) -> anyhow::Result<Option<String>> {
    print!("{}", prompt);
    std::io::stdout().flush()?;
    let mut input = String::new();
    if std::io::stdin().read_line(&mut input)? == 0 {
        return Ok(None);
    }
    Ok(Some(input.trim().to_string()))
}

/// Fill a missing required value from the terminal, when there is one.
fn prompt_if_missing(
    value: &mut Option<String>,
    prompt: &str,
    interactive: bool,
) -> anyhow::Result<()> {
    let missing = !matches!(value.as_deref(), Some(v) if !v.trim().is_empty());
    if missing && interactive {
        *value = prompt_line(prompt)?;
    }
    Ok(())
}

/// Offer a capped test run. `Some(n)` limits the run, `None` syncs everything.
fn ask_test_run() -> anyhow::Result<Option<usize>> {
    let answer = prompt_line("Do you want to do a test run with limited items? (y/n): ")?;
    if !answer.is_some_and(|a| a.eq_ignore_ascii_case("y")) {
        return Ok(None);
    }
    let count = prompt_line(&format!(
        "How many items for the test run? (default {}): ",
        DEFAULT_TEST_ITEMS
    ))?;
    Ok(Some(parse_test_count(count.as_deref())))
}

fn parse_test_count(input: Option<&str>) -> usize {
    input
        .map(str::trim)
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_TEST_ITEMS)
}

async fn run_status(args: cli::StateArgs) -> anyhow::Result<ExitCode> {
    let store = JsonFileStore::new(config::expand_tilde(&args.state_file));
    let Some(state) = store.read().await? else {
        println!("No sync state found at {}", store.path().display());
        println!("Run a sync first to create it.");
        return Ok(ExitCode::SUCCESS);
    };

    println!("Sync state: {}", store.path().display());
    println!("  Synced items: {}", state.len());
    match (state.last_sync_at(), state.last_sync.as_deref()) {
        (Some(at), _) => println!("  Last sync:    {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
        (None, Some(raw)) => println!("  Last sync:    {}", raw),
        (None, None) => println!("  Last sync:    never"),
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_reset_state(args: cli::ResetStateArgs) -> anyhow::Result<ExitCode> {
    let path = config::expand_tilde(&args.state.state_file);
    if !path.exists() {
        println!("No sync state found at {}", path.display());
        return Ok(ExitCode::SUCCESS);
    }

    if !args.yes {
        println!("This will delete the sync state at:");
        println!("  {}", path.display());
        println!("The next sync will re-check every item against the bucket.");
        let answer = prompt_line("Are you sure? [y/N] ")?;
        if !answer.is_some_and(|a| a.eq_ignore_ascii_case("y")) {
            println!("Cancelled.");
            return Ok(ExitCode::SUCCESS);
        }
    }

    tokio::fs::remove_file(&path).await?;
    println!("Sync state deleted.");
    Ok(ExitCode::SUCCESS)
}

async fn run_sync(mut args: cli::SyncArgs) -> anyhow::Result<ExitCode> {
    let interactive = std::io::stdin().is_terminal();
    prompt_if_missing(&mut args.username, "Enter iCloud username/email: ", interactive)?;
    prompt_if_missing(&mut args.bucket, "Enter S3 bucket name: ", interactive)?;

    let config = match config::Config::from_cli(args) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("{}", e);
            return Ok(ExitCode::FAILURE);
        }
    };
    tracing::debug!(?config, "Resolved configuration");

    match config.storage_class.as_deref() {
        Some(class) => tracing::info!("Using S3 storage class: {}", class),
        None => tracing::info!("Using the bucket's default storage class"),
    }
    if config.storage_class.as_deref() == Some("DEEP_ARCHIVE") {
        tracing::info!("Note: objects in DEEP_ARCHIVE take 12+ hours to retrieve");
    }

    // Signals are attached after the last prompt; until then Ctrl+C ends
    // the process directly.
    let cancel = CancellationToken::new();

    let source = match ICloudSource::connect(
        &config.cookie_directory,
        &config.username,
        config.domain,
        config.retry,
        cancel.clone(),
    )
    .await
    {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to set up iCloud connection: {}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    let destination = match S3Destination::connect(config.s3_settings()).await {
        Ok(d) => d,
        Err(e) => {
            tracing::error!("Failed to set up S3 connection: {}", e);
            return Ok(ExitCode::FAILURE);
        }
    };
    tracing::debug!(bucket = destination.bucket(), "Destination ready");

    let max_items = match config.max_items {
        Some(n) => Some(n),
        None if interactive && !config.skip_test => ask_test_run()?,
        None => None,
    };
    if let Some(n) = max_items {
        tracing::info!("Limiting this run to {} items", n);
    }
    shutdown::listen_for_signals(cancel.clone())?;

    let engine = SyncEngine::new(
        Box::new(JsonFileStore::new(&config.state_file)),
        config.sync_options(),
    )
    .with_source(Arc::new(source))
    .with_destination(Arc::new(destination));

    let started = Instant::now();
    match engine.run(max_items, &cancel).await {
        Ok(stats) => {
            sync::log_summary(&stats, started);
            println!("Sync completed: {}", stats);
            Ok(ExitCode::SUCCESS)
        }
        Err(SyncError::Interrupted(stats)) => {
            sync::log_summary(&stats, started);
            tracing::warn!("Sync interrupted; progress so far is saved");
            Ok(ExitCode::FAILURE)
        }
        Err(e) => {
            tracing::error!("Sync failed: {}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_filter())),
        )
        .init();

    let result = match cli.effective_command() {
        Command::Sync(args) => run_sync(args).await,
        Command::Status(args) => run_status(args).await,
        Command::ResetState(args) => run_reset_state(args).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_test_count() {
        assert_eq!(parse_test_count(Some("25")), 25);
        assert_eq!(parse_test_count(Some(" 3 ")), 3);
        assert_eq!(parse_test_count(Some("")), DEFAULT_TEST_ITEMS);
        assert_eq!(parse_test_count(Some("zero")), DEFAULT_TEST_ITEMS);
        assert_eq!(parse_test_count(Some("0")), DEFAULT_TEST_ITEMS);
        assert_eq!(parse_test_count(None), DEFAULT_TEST_ITEMS);
    }

    #[test]
    fn test_prompt_skipped_when_present_or_headless() {
        let mut present = Some("me@example.com".to_string());
        prompt_if_missing(&mut present, "unused", true).unwrap();
        assert_eq!(present.as_deref(), Some("me@example.com"));

        let mut missing = None;
        prompt_if_missing(&mut missing, "unused", false).unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_status_and_reset_on_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let state_file = dir.path().join("none.json").display().to_string();
        run_status(cli::StateArgs {
            state_file: state_file.clone(),
        })
        .await
        .unwrap();

        run_reset_state(cli::ResetStateArgs {
            state: cli::StateArgs { state_file },
            yes: true,
        })
        .await
        .unwrap();
        assert!(!dir.path().join("none.json").exists());
    }

    #[tokio::test]
    async fn test_reset_state_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync_state.json");
        std::fs::write(&path, r#"{"processed_files": ["a_b.jpg"], "last_sync": null}"#).unwrap();

        run_reset_state(cli::ResetStateArgs {
            state: cli::StateArgs {
                state_file: path.display().to_string(),
            },
            yes: true,
        })
        .await
        .unwrap();
        assert!(!path.exists());
    }
}
