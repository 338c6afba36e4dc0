//! Identity of an item in the checkpoint and its place in the bucket.

use chrono::{DateTime, Datelike, Utc};
use md5::{Digest, Md5};

use crate::source::SourceItem;

/// The item's filename, or `photo_<id>.jpg` when the source has none.
pub fn resolved_filename(item: &SourceItem) -> String {
    match item.filename.as_deref() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => format!("photo_{}.jpg", item.id),
    }
}

/// Checkpoint key: `<id>_<filename>`.
pub fn item_key(id: &str, filename: &str) -> String {
    format!("{}_{}", id, filename)
}

/// `photos/<year>/<MM>/<filename>`, or `photos/unknown_date/<filename>`
/// without a creation time. Year and month are read in UTC.
pub fn destination_key(created: Option<DateTime<Utc>>, filename: &str) -> String {
    match created {
        Some(ts) => format!("photos/{}/{:02}/{}", ts.year(), ts.month(), filename),
        None => format!("photos/unknown_date/{}", filename),
    }
}

/// Strip characters that are invalid in filenames on common filesystems.
pub fn clean_filename(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect()
}

/// Longest scratch file name, in bytes. Well under the 255-byte NAME_MAX
/// of common filesystems.
const MAX_SCRATCH_NAME: usize = 200;

/// Scratch file name for `item_key`: the cleaned key, or when that is too
/// long, a prefix of it followed by the key's MD5 so names stay unique.
pub fn scratch_name(item_key: &str) -> String {
    let cleaned = clean_filename(item_key);
    if cleaned.len() <= MAX_SCRATCH_NAME {
        return cleaned;
    }
    let digest = hex::encode(Md5::digest(item_key.as_bytes()));
    let mut cut = MAX_SCRATCH_NAME - digest.len() - 1;
    while !cleaned.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}_{}", &cleaned[..cut], digest)
}

/// Everything derived from a [`SourceItem`] before any I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemKeys {
    pub filename: String,
    pub item_key: String,
    pub destination_key: String,
    pub scratch_name: String,
}

impl ItemKeys {
    pub fn for_item(item: &SourceItem) -> Self {
        let filename = resolved_filename(item);
        let item_key = item_key(&item.id, &filename);
        Self {
            destination_key: destination_key(item.created, &filename),
            scratch_name: scratch_name(&item_key),
            item_key,
            filename,
        }
    }
}
