//! Source side of the sync: the remote photo inventory and per-item fetch.
//!
//! The sync engine only sees [`PhotoSource`]; how the source authenticated
//! is settled before a handle exists.

pub mod error;
pub mod icloud;

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use error::{FetchError, SourceError};
pub use icloud::ICloudSource;

/// Read-only view of one remote item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceItem {
    /// Opaque remote identifier.
    pub id: String,
    /// Original filename, when the source reports one.
    pub filename: Option<String>,
    /// Creation timestamp, when known.
    pub created: Option<DateTime<Utc>>,
    /// Size in bytes as reported by the source.
    pub size: Option<u64>,
    /// Source-specific handle `fetch` uses to retrieve the content
    /// (a download URL for iCloud).
    pub locator: Option<String>,
}

impl SourceItem {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            filename: None,
            created: None,
            size: None,
            locator: None,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_created(mut self, created: DateTime<Utc>) -> Self {
        self.created = Some(created);
        self
    }

    pub fn with_locator(mut self, locator: impl Into<String>) -> Self {
        self.locator = Some(locator.into());
        self
    }
}

/// An authenticated remote inventory.
#[async_trait]
pub trait PhotoSource: Send + Sync {
    /// Enumerate every item, in the order the source reports them.
    async fn list_items(&self) -> Result<Vec<SourceItem>, SourceError>;

    /// Write the item's content to `dest`, returning the bytes written.
    async fn fetch(&self, item: &SourceItem, dest: &Path) -> Result<u64, FetchError>;
}
