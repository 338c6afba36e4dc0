use std::path::PathBuf;

use anyhow::bail;

use crate::cli::SyncArgs;
use crate::dest::s3::S3Settings;
use crate::retry::RetryConfig;
use crate::sync::SyncOptions;
use crate::types::{Domain, ProbeFailurePolicy};

/// Settings for one sync run, resolved from flags and environment.
pub struct Config {
    pub username: String,
    pub cookie_directory: PathBuf,
    pub bucket: String,
    pub region: String,
    pub endpoint_url: Option<String>,
    pub storage_class: Option<String>,
    pub state_file: PathBuf,
    pub scratch_dir: Option<PathBuf>,

    pub max_items: Option<usize>,
    pub retry: RetryConfig,

    pub domain: Domain,
    pub probe_policy: ProbeFailurePolicy,

    pub skip_test: bool,
    pub no_progress_bar: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("username", &"<redacted>")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("storage_class", &self.storage_class)
            .field("state_file", &self.state_file)
            .field("max_items", &self.max_items)
            .field("domain", &self.domain)
            .field("cookie_directory", &self.cookie_directory)
            .finish_non_exhaustive()
    }
}

pub(crate) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    /// Build from parsed arguments. Username and bucket must be filled in by
    /// now (from flags, environment or a prompt).
    pub fn from_cli(args: SyncArgs) -> anyhow::Result<Self> {
        let Some(username) = non_empty(args.username) else {
            bail!("iCloud username is required (--username or ICLOUD_USERNAME)");
        };
        let Some(bucket) = non_empty(args.bucket) else {
            bail!("S3 bucket name is required (--bucket or S3_BUCKET_NAME)");
        };
        let max_items = args
            .max_items
            .map(usize::try_from)
            .transpose()?;

        Ok(Self {
            username,
            cookie_directory: expand_tilde(&args.cookie_directory),
            bucket,
            region: args.region,
            endpoint_url: non_empty(args.endpoint_url),
            storage_class: non_empty(Some(args.storage_class)),
            state_file: expand_tilde(&args.state_file),
            scratch_dir: args.scratch_dir.as_deref().map(expand_tilde),
            max_items,
            retry: RetryConfig {
                max_retries: args.max_retries,
                base_delay_secs: args.retry_delay,
                ..RetryConfig::default()
            },
            domain: args.domain,
            probe_policy: args.probe_failure_policy,
            skip_test: args.skip_test.is_some_and(|v| !v.is_empty()),
            no_progress_bar: args.no_progress_bar,
        })
    }

    pub fn s3_settings(&self) -> S3Settings {
        S3Settings {
            bucket: self.bucket.clone(),
            region: self.region.clone(),
            endpoint: self.endpoint_url.clone(),
        }
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            storage_class: self.storage_class.clone(),
            probe_policy: self.probe_policy,
            scratch_base: self.scratch_dir.clone(),
            no_progress_bar: self.no_progress_bar,
        }
    }
}
