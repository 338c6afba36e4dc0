//! Destination side of the sync: a bucket that can be probed and written.

pub mod prober;
pub mod s3;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

pub use prober::DestinationProber;
pub use s3::S3Destination;

#[derive(Debug, Error)]
pub enum DestinationError {
    #[error("Bucket '{0}' does not exist")]
    BucketNotFound(String),

    #[error("Access denied to bucket '{0}'; check the credentials and bucket policy")]
    AccessDenied(String),

    #[error("{op} failed for '{target}' (HTTP {status}): {message}")]
    Status {
        op: &'static str,
        target: String,
        status: u16,
        message: String,
    },

    #[error("{op} failed for '{target}': {message}")]
    Transport {
        op: &'static str,
        target: String,
        message: String,
    },

    #[error("Cannot read upload body {path}: {message}")]
    Body { path: String, message: String },
}

/// What a metadata-only lookup reports for an existing object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHead {
    /// Content fingerprint as reported by the store, quotes stripped.
    pub integrity_tag: String,
}

/// One single-request upload.
#[derive(Debug, Clone)]
pub struct PutRequest {
    pub key: String,
    pub body: PathBuf,
    pub content_type: &'static str,
    pub storage_class: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

/// A handle bound to one bucket.
#[async_trait]
pub trait Destination: Send + Sync {
    /// `Ok(None)` when the object does not exist.
    async fn head_object(&self, key: &str) -> Result<Option<ObjectHead>, DestinationError>;

    async fn put_object(&self, request: &PutRequest) -> Result<(), DestinationError>;
}

/// MIME type from the file extension, case-insensitive.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("tiff") => "image/tiff",
        Some("webp") => "image/webp",
        Some("heic") => "image/heic",
        Some("heif") => "image/heif",
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("avi") => "video/x-msvideo",
        _ => "application/octet-stream",
    }
}
