use thiserror::Error;

use crate::dest::DestinationError;
use crate::source::{FetchError, SourceError};

/// Why a single item failed. Never aborts the run.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("hashing failed: {0}")]
    Hash(#[source] std::io::Error),

    #[error("destination probe failed: {0}")]
    Probe(#[source] DestinationError),

    #[error("upload failed: {0}")]
    Upload(#[source] DestinationError),
}

/// Run-level failures.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Sync engine is missing its {0} handle")]
    NotInitialized(&'static str),

    #[error("Failed to enumerate source items: {0}")]
    Enumerate(#[from] SourceError),

    #[error("Cannot create scratch directory: {0}")]
    Scratch(#[source] std::io::Error),

    #[error("Sync interrupted after {} of {} items", .0.processed + .0.errors, .0.total)]
    Interrupted(super::RunStatistics),
}
