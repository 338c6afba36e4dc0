//! Streaming download of an original resource to a local file.

use std::path::Path;

use futures_util::StreamExt;
use reqwest::Client;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::retry::{self, RetryAction, RetryConfig};
use crate::source::error::FetchError;

/// Download `url` into `dest`, retrying transient failures. Every attempt
/// starts from an empty file.
pub(crate) async fn download_to(
    client: &Client,
    url: &str,
    dest: &Path,
    name: &str,
    retry_config: &RetryConfig,
    cancel: &CancellationToken,
) -> Result<u64, FetchError> {
    retry::retry_with_backoff(
        retry_config,
        cancel,
        |e: &FetchError| {
            if e.is_retryable() {
                RetryAction::Retry
            } else {
                RetryAction::Abort
            }
        },
        || async {
            let result = attempt_download(client, url, dest, name).await;
            if result.is_err() {
                let _ = fs::remove_file(dest).await;
            }
            result
        },
    )
    .await
}

async fn attempt_download(
    client: &Client,
    url: &str,
    dest: &Path,
    name: &str,
) -> Result<u64, FetchError> {
    let response = client.get(url).send().await.map_err(|e| FetchError::Http {
        source: e,
        name: name.to_string(),
        bytes_written: 0,
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::HttpStatus {
            status: status.as_u16(),
            name: name.to_string(),
        });
    }
    let content_length = response.content_length();

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(dest)
        .await?;

    let mut bytes_written: u64 = 0;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            tracing::warn!(
                "Body error for {} (content_length={:?}, bytes_so_far={}): {}",
                name,
                content_length,
                bytes_written,
                e
            );
            FetchError::Http {
                source: e,
                name: name.to_string(),
                bytes_written,
            }
        })?;
        file.write_all(&chunk).await?;
        bytes_written += chunk.len() as u64;
    }
    file.flush().await?;

    tracing::debug!("Downloaded {} ({} bytes)", name, bytes_written);
    Ok(bytes_written)
}
