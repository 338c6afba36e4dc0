//! Checkpoint storage trait and JSON file implementation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::error::StateError;
use super::types::CheckpointState;

/// Durable storage for the checkpoint document.
///
/// Object-safe so the sync engine can hold `Box<dyn CheckpointStore>`;
/// tests swap in an in-memory store.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Read the stored checkpoint. `Ok(None)` when nothing has been stored yet.
    async fn read(&self) -> Result<Option<CheckpointState>, StateError>;

    /// Replace the stored checkpoint with `state` as a whole.
    async fn write(&self, state: &CheckpointState) -> Result<(), StateError>;

    /// Human-readable location for log messages.
    fn location(&self) -> String;
}

/// Checkpoint persisted as a single JSON file.
///
/// Writes go to a sibling temp file that is renamed over the target, so a
/// crash mid-write leaves the previous snapshot in place.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("checkpoint.json");
        self.path
            .with_file_name(format!(".{}.tmp.{}", name, std::process::id()))
    }
}

#[async_trait]
impl CheckpointStore for JsonFileStore {
    async fn read(&self) -> Result<Option<CheckpointState>, StateError> {
        let contents = match tokio::fs::read(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StateError::Read {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };
        let state = serde_json::from_slice(&contents).map_err(|e| StateError::Parse {
            path: self.path.clone(),
            source: e,
        })?;
        Ok(Some(state))
    }

    async fn write(&self, state: &CheckpointState) -> Result<(), StateError> {
        let body = serde_json::to_vec_pretty(state)?;
        let tmp = self.temp_path();
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| StateError::Write {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
            std::fs::write(&tmp, &body).map_err(|e| StateError::Write {
                path: tmp.clone(),
                source: e,
            })?;
            std::fs::rename(&tmp, &path).map_err(|e| {
                let _ = std::fs::remove_file(&tmp);
                StateError::Write {
                    path: path.clone(),
                    source: e,
                }
            })
        })
        .await?
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}
