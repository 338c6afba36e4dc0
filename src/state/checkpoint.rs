//! In-memory checkpoint bound to its durable store.

use chrono::Utc;

use super::store::CheckpointStore;
use super::types::CheckpointState;

/// Set of item keys confirmed synced, plus the store it is flushed to.
///
/// Loading and flushing never fail the caller: a read error degrades to an
/// empty state, a write error leaves the previous on-disk snapshot as the
/// last-known-good copy. Both are logged.
pub struct Checkpoint {
    state: CheckpointState,
    store: Box<dyn CheckpointStore>,
    flushes: u64,
}

impl std::fmt::Debug for Checkpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Checkpoint")
            .field("location", &self.store.location())
            .field("synced", &self.state.len())
            .finish_non_exhaustive()
    }
}

impl Checkpoint {
    pub async fn load(store: Box<dyn CheckpointStore>) -> Self {
        let state = match store.read().await {
            Ok(Some(state)) => {
                tracing::info!(
                    "Loaded sync state: {} processed files",
                    state.len()
                );
                state
            }
            Ok(None) => {
                tracing::debug!("No sync state at {}, starting fresh", store.location());
                CheckpointState::default()
            }
            Err(e) => {
                tracing::warn!("Could not load sync state: {}. Starting fresh.", e);
                CheckpointState::default()
            }
        };
        Self {
            state,
            store,
            flushes: 0,
        }
    }

    pub fn is_synced(&self, key: &str) -> bool {
        self.state.contains(key)
    }

    /// Mark a key as synced in memory. Adding a present key is a no-op.
    pub fn mark_synced(&mut self, key: &str) {
        if !self.state.insert(key) {
            tracing::debug!(key, "Already marked synced");
        }
    }

    /// Persist the full key set with a fresh `last_sync`. Returns whether the
    /// write succeeded.
    pub async fn flush(&mut self) -> bool {
        self.flushes += 1;
        let snapshot = self.state.stamped(Utc::now());
        match self.store.write(&snapshot).await {
            Ok(()) => {
                self.state.last_sync = snapshot.last_sync;
                tracing::debug!("Sync state saved ({} items)", self.state.len());
                true
            }
            Err(e) => {
                tracing::warn!("Could not save sync state: {}", e);
                false
            }
        }
    }

    pub fn state(&self) -> &CheckpointState {
        &self.state
    }

    /// Number of flushes attempted since load.
    pub fn flush_count(&self) -> u64 {
        self.flushes
    }
}
