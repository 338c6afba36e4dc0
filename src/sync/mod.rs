//! The sync run: enumerate once, transfer each item in order, checkpoint as
//! it goes.

pub mod error;
pub mod keys;
pub mod transfer;

#[cfg(test)]
pub(crate) mod fakes;

use std::fmt;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

use crate::dest::{Destination, DestinationProber};
use crate::source::PhotoSource;
use crate::state::{Checkpoint, CheckpointStore};
use crate::types::ProbeFailurePolicy;

pub use error::SyncError;
use transfer::{TransferEngine, TransferOutcome};

/// Items between periodic checkpoint flushes.
const FLUSH_INTERVAL: usize = 10;

/// Counters for one run. Not persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStatistics {
    pub total: usize,
    pub processed: usize,
    pub uploaded: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl RunStatistics {
    fn record(&mut self, outcome: &TransferOutcome) {
        match outcome {
            TransferOutcome::Uploaded => {
                self.processed += 1;
                self.uploaded += 1;
            }
            TransferOutcome::Skipped | TransferOutcome::AlreadySynced => {
                self.processed += 1;
                self.skipped += 1;
            }
            TransferOutcome::Failed(_) => self.errors += 1,
        }
    }
}

impl fmt::Display for RunStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} total, {} processed, {} uploaded, {} skipped, {} errors",
            self.total, self.processed, self.uploaded, self.skipped, self.errors
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Passed through to every upload.
    pub storage_class: Option<String>,
    pub probe_policy: ProbeFailurePolicy,
    /// Parent of the per-run scratch directory; the system temp dir if unset.
    pub scratch_base: Option<PathBuf>,
    pub no_progress_bar: bool,
}

/// Drives a run. Source and destination are attached after construction;
/// running without either is an error.
pub struct SyncEngine {
    source: Option<Arc<dyn PhotoSource>>,
    destination: Option<Arc<dyn Destination>>,
    store: Box<dyn CheckpointStore>,
    options: SyncOptions,
}

impl SyncEngine {
    pub fn new(store: Box<dyn CheckpointStore>, options: SyncOptions) -> Self {
        Self {
            source: None,
            destination: None,
            store,
            options,
        }
    }

    pub fn with_source(mut self, source: Arc<dyn PhotoSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_destination(mut self, destination: Arc<dyn Destination>) -> Self {
        self.destination = Some(destination);
        self
    }

    /// Sync every item, or the first `max_items`.
    ///
    /// Per-item failures are counted, not returned. The checkpoint is
    /// flushed every ten items and once more at the end, including after an
    /// early stop or an interrupt; an interrupt surfaces as
    /// [`SyncError::Interrupted`] carrying the statistics so far.
    pub async fn run(
        self,
        max_items: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<RunStatistics, SyncError> {
        let source = self.source.ok_or(SyncError::NotInitialized("source"))?;
        let destination = self
            .destination
            .ok_or(SyncError::NotInitialized("destination"))?;

        let mut checkpoint = Checkpoint::load(self.store).await;

        tracing::info!("Fetching item list from source...");
        let items = source.list_items().await?;
        let mut stats = RunStatistics {
            total: items.len(),
            ..RunStatistics::default()
        };

        if items.is_empty() {
            tracing::warn!("No items found in the source library");
            checkpoint.flush().await;
            return Ok(stats);
        }

        let scratch = match &self.options.scratch_base {
            Some(base) => tempfile::Builder::new()
                .prefix("icloud-s3-sync-")
                .tempdir_in(base),
            None => tempfile::Builder::new().prefix("icloud-s3-sync-").tempdir(),
        }
        .map_err(SyncError::Scratch)?;

        let prober = DestinationProber::new(destination.as_ref(), self.options.probe_policy);
        let engine = TransferEngine::new(
            source.as_ref(),
            destination.as_ref(),
            prober,
            self.options.storage_class.as_deref(),
        );

        let planned = max_items.map_or(items.len(), |m| m.min(items.len()));
        let pb = create_progress_bar(self.options.no_progress_bar, planned as u64);
        let mut interrupted = false;

        for (i, item) in items.iter().enumerate() {
            if max_items.is_some_and(|max| i >= max) {
                pb.suspend(|| tracing::info!("Reached max items: {}", i));
                break;
            }
            if cancel.is_cancelled() {
                pb.suspend(|| tracing::info!("Shutdown requested, stopping before next item"));
                interrupted = true;
                break;
            }

            let position = i + 1;
            pb.suspend(|| tracing::debug!("Processing item {}/{}", position, stats.total));
            let outcome = engine.transfer_one(item, scratch.path(), &mut checkpoint).await;
            stats.record(&outcome);
            pb.inc(1);

            if position % FLUSH_INTERVAL == 0 {
                checkpoint.flush().await;
            }
        }
        pb.finish_and_clear();

        checkpoint.flush().await;
        tracing::debug!(
            "{} items recorded as synced after {} checkpoint flushes",
            checkpoint.state().len(),
            checkpoint.flush_count()
        );
        if let Err(e) = scratch.close() {
            tracing::warn!("Could not remove scratch directory: {}", e);
        }

        if interrupted {
            return Err(SyncError::Interrupted(stats));
        }
        tracing::info!("Sync completed: {}", stats);
        Ok(stats)
    }
}

/// Hidden when disabled or when stdout is not a TTY.
fn create_progress_bar(no_progress_bar: bool, total: u64) -> ProgressBar {
    if no_progress_bar || !std::io::stdout().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )
        .expect("valid template")
        .progress_chars("=> "),
    );
    pb
}

pub fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {:02}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Log the end-of-run summary.
pub fn log_summary(stats: &RunStatistics, started: Instant) {
    tracing::info!("── Summary ──");
    tracing::info!("  total:     {}", stats.total);
    tracing::info!("  processed: {}", stats.processed);
    tracing::info!("  uploaded:  {}", stats.uploaded);
    tracing::info!("  skipped:   {}", stats.skipped);
    tracing::info!("  errors:    {}", stats.errors);
    tracing::info!("  elapsed:   {}", format_duration(started.elapsed()));
}
