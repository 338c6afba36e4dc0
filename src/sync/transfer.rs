//! One item through fetch, hash, probe and upload.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{SecondsFormat, Utc};

use super::error::TransferError;
use super::keys::ItemKeys;
use crate::dest::{content_type_for, Destination, DestinationProber, PutRequest};
use crate::fingerprint::{self, ContentHash};
use crate::source::{PhotoSource, SourceItem};
use crate::state::Checkpoint;

/// How one item ended.
#[derive(Debug)]
pub enum TransferOutcome {
    /// Identical content was already at the destination.
    Skipped,
    Uploaded,
    /// The checkpoint already had the item; no I/O was done.
    AlreadySynced,
    Failed(TransferError),
}

/// Borrowed handles needed to move items.
pub struct TransferEngine<'a> {
    source: &'a dyn PhotoSource,
    destination: &'a dyn Destination,
    prober: DestinationProber<'a>,
    storage_class: Option<&'a str>,
}

impl<'a> TransferEngine<'a> {
    pub fn new(
        source: &'a dyn PhotoSource,
        destination: &'a dyn Destination,
        prober: DestinationProber<'a>,
        storage_class: Option<&'a str>,
    ) -> Self {
        Self {
            source,
            destination,
            prober,
            storage_class,
        }
    }

    /// Transfer one item. The scratch file is gone when this returns, and the
    /// checkpoint only gains the item once its content is confirmed at the
    /// destination.
    pub async fn transfer_one(
        &self,
        item: &SourceItem,
        scratch_dir: &Path,
        checkpoint: &mut Checkpoint,
    ) -> TransferOutcome {
        let keys = ItemKeys::for_item(item);
        if checkpoint.is_synced(&keys.item_key) {
            tracing::debug!("Skipping already synced: {}", keys.filename);
            return TransferOutcome::AlreadySynced;
        }

        tracing::info!("Processing: {}", keys.filename);
        let scratch = scratch_dir.join(&keys.scratch_name);
        let result = self.fetch_probe_upload(item, &keys, &scratch).await;
        remove_scratch(&scratch).await;

        match result {
            Ok(outcome) => {
                checkpoint.mark_synced(&keys.item_key);
                outcome
            }
            Err(e) => {
                tracing::error!("Error processing {}: {}", keys.filename, e);
                TransferOutcome::Failed(e)
            }
        }
    }

    async fn fetch_probe_upload(
        &self,
        item: &SourceItem,
        keys: &ItemKeys,
        scratch: &Path,
    ) -> Result<TransferOutcome, TransferError> {
        let size = self.source.fetch(item, scratch).await?;
        let hash = fingerprint::hash_file(scratch)
            .await
            .map_err(TransferError::Hash)?;

        if self
            .prober
            .exists(&keys.destination_key, &hash)
            .await
            .map_err(TransferError::Probe)?
        {
            tracing::info!("Already in bucket: {}", keys.destination_key);
            return Ok(TransferOutcome::Skipped);
        }

        let request = PutRequest {
            key: keys.destination_key.clone(),
            body: scratch.to_path_buf(),
            content_type: content_type_for(Path::new(&keys.filename)),
            storage_class: self.storage_class.map(str::to_string),
            metadata: upload_metadata(item, &keys.filename, &hash),
        };
        self.destination
            .put_object(&request)
            .await
            .map_err(TransferError::Upload)?;

        tracing::info!(
            key = %keys.destination_key,
            size_bytes = size,
            "Synced {}",
            keys.filename
        );
        Ok(TransferOutcome::Uploaded)
    }
}

fn upload_metadata(item: &SourceItem, filename: &str, hash: &ContentHash) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();
    metadata.insert("original-filename".to_string(), filename.to_string());
    metadata.insert("icloud-id".to_string(), item.id.clone());
    metadata.insert("file-hash".to_string(), hash.to_string());
    metadata.insert(
        "upload-date".to_string(),
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    );
    if let Some(created) = item.created {
        metadata.insert(
            "created-date".to_string(),
            created.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
    }
    metadata
}

async fn remove_scratch(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Could not remove scratch file {}: {}", path.display(), e);
        }
    }
}
