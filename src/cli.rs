use clap::{Args, Parser, Subcommand};

use crate::types::{Domain, LogLevel, ProbeFailurePolicy};

const DEFAULT_STATE_FILE: &str = "sync_state.json";

#[derive(Parser, Debug)]
#[command(
    name = "icloud-s3-sync",
    version,
    about = "Copy an iCloud Photos library into an S3 bucket",
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Options for the default `sync` command
    #[command(flatten)]
    pub sync: SyncArgs,

    /// Log level (RUST_LOG takes precedence)
    #[arg(long, value_enum, default_value = "info", global = true)]
    pub log_level: LogLevel,
}

impl Cli {
    /// The subcommand to run; a bare invocation syncs.
    pub fn effective_command(self) -> Command {
        self.command.unwrap_or(Command::Sync(self.sync))
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sync the photo library to the bucket (default)
    Sync(SyncArgs),

    /// Show what the checkpoint file records
    Status(StateArgs),

    /// Delete the checkpoint file so the next run starts over
    ResetState(ResetStateArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SyncArgs {
    /// Apple ID email address (prompted for when missing)
    #[arg(short = 'u', long, env = "ICLOUD_USERNAME")]
    pub username: Option<String>,

    /// iCloud domain (com or cn)
    #[arg(long, value_enum, default_value = "com")]
    pub domain: Domain,

    /// Directory holding the signed-in iCloud session files
    #[arg(long, env = "ICLOUD_COOKIE_DIRECTORY", default_value = "~/.icloud-s3-sync")]
    pub cookie_directory: String,

    /// Destination bucket (prompted for when missing)
    #[arg(short = 'b', long, env = "S3_BUCKET_NAME")]
    pub bucket: Option<String>,

    /// AWS region of the bucket
    #[arg(long, env = "AWS_REGION", default_value = "us-east-1")]
    pub region: String,

    /// Custom endpoint for S3-compatible stores
    #[arg(long, env = "S3_ENDPOINT_URL")]
    pub endpoint_url: Option<String>,

    /// Storage class for uploads; empty for the bucket default
    #[arg(long, env = "S3_STORAGE_CLASS", default_value = "DEEP_ARCHIVE")]
    pub storage_class: String,

    /// Stop after this many items from the library listing
    #[arg(long, env = "MAX_ITEMS", value_parser = clap::value_parser!(u64).range(1..))]
    pub max_items: Option<u64>,

    /// Never offer the interactive test run. SKIP_TEST set to any
    /// non-empty value (even "0") counts.
    #[arg(
        long,
        env = "SKIP_TEST",
        num_args = 0..=1,
        default_missing_value = "1",
        value_name = "ANY"
    )]
    pub skip_test: Option<String>,

    /// Checkpoint file recording which items are synced
    #[arg(long, env = "SYNC_STATE_FILE", default_value = DEFAULT_STATE_FILE)]
    pub state_file: String,

    /// Parent directory for scratch files (default: system temp dir)
    #[arg(long)]
    pub scratch_dir: Option<String>,

    /// What to do when the bucket can't say whether an object exists
    #[arg(long, value_enum, default_value = "assume-absent")]
    pub probe_failure_policy: ProbeFailurePolicy,

    /// Retries for transient download failures
    #[arg(long, default_value_t = 2)]
    pub max_retries: u32,

    /// Base delay in seconds between download retries
    #[arg(long, default_value_t = 5)]
    pub retry_delay: u64,

    /// Disable the progress bar
    #[arg(long)]
    pub no_progress_bar: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StateArgs {
    /// Checkpoint file recording which items are synced
    #[arg(long, env = "SYNC_STATE_FILE", default_value = DEFAULT_STATE_FILE)]
    pub state_file: String,
}

#[derive(Args, Debug, Clone)]
pub struct ResetStateArgs {
    #[command(flatten)]
    pub state: StateArgs,

    /// Skip the confirmation prompt
    #[arg(long)]
    pub yes: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_bare_invocation_is_sync() {
        let cli = parse(&["icloud-s3-sync", "-u", "me@example.com", "-b", "photos"]);
        match cli.effective_command() {
            Command::Sync(args) => {
                assert_eq!(args.username.as_deref(), Some("me@example.com"));
                assert_eq!(args.bucket.as_deref(), Some("photos"));
                assert_eq!(args.probe_failure_policy, ProbeFailurePolicy::AssumeAbsent);
                assert_eq!(args.max_retries, 2);
                assert_eq!(args.retry_delay, 5);
            }
            other => panic!("expected sync, got {:?}", other),
        }
    }

    #[test]
    fn test_sync_subcommand_flags() {
        let cli = parse(&[
            "icloud-s3-sync",
            "sync",
            "--max-items",
            "5",
            "--probe-failure-policy",
            "fail-item",
            "--storage-class",
            "",
            "--domain",
            "cn",
        ]);
        match cli.effective_command() {
            Command::Sync(args) => {
                assert_eq!(args.max_items, Some(5));
                assert_eq!(args.probe_failure_policy, ProbeFailurePolicy::FailItem);
                assert_eq!(args.storage_class, "");
                assert_eq!(args.domain, Domain::Cn);
            }
            other => panic!("expected sync, got {:?}", other),
        }
    }

    #[test]
    fn test_skip_test_flag_takes_no_value() {
        let cli = parse(&["icloud-s3-sync", "--skip-test", "-b", "photos"]);
        match cli.effective_command() {
            Command::Sync(args) => {
                assert_eq!(args.skip_test.as_deref(), Some("1"));
                assert_eq!(args.bucket.as_deref(), Some("photos"));
            }
            other => panic!("expected sync, got {:?}", other),
        }
    }

    #[test]
    fn test_max_items_rejects_zero() {
        assert!(Cli::try_parse_from(["icloud-s3-sync", "--max-items", "0"]).is_err());
    }

    #[test]
    fn test_reset_state_args() {
        let cli = parse(&[
            "icloud-s3-sync",
            "reset-state",
            "--state-file",
            "/tmp/state.json",
            "--yes",
        ]);
        match cli.effective_command() {
            Command::ResetState(args) => {
                assert!(args.yes);
                assert_eq!(args.state.state_file, "/tmp/state.json");
            }
            other => panic!("expected reset-state, got {:?}", other),
        }
    }

    #[test]
    fn test_global_log_level_after_subcommand() {
        let cli = parse(&["icloud-s3-sync", "status", "--log-level", "warn"]);
        assert_eq!(cli.log_level, LogLevel::Warn);
        assert!(matches!(cli.effective_command(), Command::Status(_)));
    }

    #[test]
    fn test_command_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
