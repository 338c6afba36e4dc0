//! Content fingerprints for change detection.
//!
//! The digest is MD5 so it can be compared directly against the ETag S3
//! reports for objects uploaded in a single request.

use std::fmt;
use std::io::Read;
use std::path::Path;

use md5::{Digest, Md5};

/// Read size used while folding a stream into the digest.
const CHUNK_SIZE: usize = 4096;

/// Lowercase hex MD5 digest (32 characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compare against an integrity tag reported by the destination.
    /// Tags are compared case-insensitively since some S3-compatible stores
    /// report uppercase hex.
    pub fn matches_tag(&self, tag: &str) -> bool {
        self.0.eq_ignore_ascii_case(tag)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hash a byte stream in fixed-size chunks so memory use stays flat
/// regardless of the item's size.
pub fn hash_reader<R: Read>(mut reader: R) -> std::io::Result<ContentHash> {
    let mut hasher = Md5::new();
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    Ok(ContentHash(hex::encode(hasher.finalize())))
}

/// Hash a file on a blocking thread.
pub async fn hash_file(path: &Path) -> std::io::Result<ContentHash> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let file = std::fs::File::open(&path)?;
        hash_reader(file)
    })
    .await
    .map_err(std::io::Error::other)?
}
