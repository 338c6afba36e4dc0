//! Checkpoint tracking for resumable syncs.
//!
//! Records which items are confirmed present at the destination so a rerun
//! skips them without any network I/O. Persisted as a whole-file JSON
//! document:
//! - loaded once at the start of a run (empty if absent or unreadable)
//! - flushed every few items and once more at the end

pub mod checkpoint;
pub mod error;
pub mod store;
pub mod types;

pub use checkpoint::Checkpoint;
pub use error::StateError;
pub use store::{CheckpointStore, JsonFileStore};
pub use types::CheckpointState;
