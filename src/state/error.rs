//! Error types for checkpoint persistence.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while reading or writing the checkpoint file.
#[derive(Error, Debug)]
pub enum StateError {
    /// The checkpoint file could not be read.
    #[error("Failed to read checkpoint at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The checkpoint file exists but is not valid checkpoint JSON.
    #[error("Checkpoint at {path} is malformed: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// The checkpoint could not be serialized.
    #[error("Failed to serialize checkpoint: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Writing or replacing the checkpoint file failed.
    #[error("Failed to write checkpoint at {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to spawn a blocking task.
    #[error("Failed to spawn blocking task: {0}")]
    Spawn(#[from] tokio::task::JoinError),
}
