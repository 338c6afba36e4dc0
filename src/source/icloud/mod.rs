//! iCloud Photos as a [`PhotoSource`], backed by a previously established
//! web session.

mod download;
mod endpoints;
mod records;
mod session;

use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use self::endpoints::Endpoints;
use self::records::QueryResponse;
use super::{FetchError, PhotoSource, SourceError, SourceItem};
use crate::retry::RetryConfig;
use crate::types::Domain;

const PAGE_SIZE: u64 = 100;

/// The account's primary photo library.
pub struct ICloudSource {
    client: reqwest::Client,
    service_endpoint: String,
    params: BTreeMap<String, String>,
    zone_id: Value,
    retry: RetryConfig,
    cancel: CancellationToken,
}

impl std::fmt::Debug for ICloudSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ICloudSource")
            .field("service_endpoint", &self.service_endpoint)
            .finish_non_exhaustive()
    }
}

impl ICloudSource {
    /// Load the persisted session for `username`, confirm Apple still
    /// accepts it and that the library has finished indexing.
    pub async fn connect(
        cookie_dir: &Path,
        username: &str,
        domain: Domain,
        retry: RetryConfig,
        cancel: CancellationToken,
    ) -> Result<Self, SourceError> {
        let endpoints = Endpoints::for_domain(domain);
        tracing::debug!(domain = domain.as_str(), "Loading iCloud session");
        let stored = session::load(cookie_dir, username, &endpoints).await?;
        let account = session::validate(&stored, &endpoints).await?;

        let ckdatabasews = account.ckdatabasews_url()?;
        let service_endpoint = format!(
            "{}/database/1/com.apple.photos.cloud/production/private",
            ckdatabasews
        );

        let mut params = BTreeMap::new();
        params.insert("clientBuildNumber".to_string(), "2522Project44".to_string());
        params.insert("clientMasteringNumber".to_string(), "2522B2".to_string());
        params.insert(
            "clientId".to_string(),
            stored.client_id().unwrap_or_default().to_string(),
        );
        if let Some(dsid) = account.dsid() {
            params.insert("dsid".to_string(), dsid);
        }
        params.insert("remapEnums".to_string(), "true".to_string());
        params.insert("getCurrentSyncToken".to_string(), "true".to_string());

        let source = Self {
            client: stored.client,
            service_endpoint,
            params,
            zone_id: records::primary_zone(),
            retry,
            cancel,
        };
        source.check_indexing().await?;
        tracing::info!("Connected to iCloud Photos");
        Ok(source)
    }

    fn records_url(&self, operation: &str) -> String {
        format!(
            "{}/records/{}?{}",
            self.service_endpoint,
            operation,
            records::encode_params(&self.params)
        )
    }

    async fn post_records(
        &self,
        operation: &str,
        body: &Value,
    ) -> Result<QueryResponse, SourceError> {
        let response = self
            .client
            .post(self.records_url(operation))
            .header("Content-type", "text/plain")
            .body(body.to_string())
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(SourceError::SessionExpired(format!("HTTP {}", status.as_u16())));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SourceError::ApiResponse(format!(
                "records/{} returned {}: {}",
                operation, status, text
            )));
        }
        Ok(response.json().await?)
    }

    async fn query(&self, body: &Value) -> Result<QueryResponse, SourceError> {
        self.post_records("query", body).await
    }

    /// Look the master record up again for a current download URL.
    async fn fresh_locator(&self, record_name: &str) -> Result<Option<String>, SourceError> {
        let response = self
            .post_records("lookup", &records::lookup_query(record_name, &self.zone_id))
            .await?;
        Ok(records::original_download_url(&response, record_name))
    }

    async fn check_indexing(&self) -> Result<(), SourceError> {
        let response = self
            .query(&records::indexing_state_query(&self.zone_id))
            .await?;
        if records::indexing_state(&response) != "FINISHED" {
            return Err(SourceError::IndexingNotFinished);
        }
        Ok(())
    }
}

/// Download from `url`. Listing URLs expire long before a big library is
/// through, so when the CDN refuses one, ask `refresh` for a current URL
/// and try exactly once more.
async fn download_refreshing<D, DFut, R, RFut>(
    url: &str,
    name: &str,
    download: D,
    refresh: R,
) -> Result<u64, FetchError>
where
    D: Fn(String) -> DFut,
    DFut: Future<Output = Result<u64, FetchError>>,
    R: FnOnce() -> RFut,
    RFut: Future<Output = Result<Option<String>, SourceError>>,
{
    match download(url.to_string()).await {
        Err(e) if e.is_expired_locator() => {
            tracing::info!("Download URL for {} expired ({}), requesting a fresh one", name, e);
            let fresh = refresh().await.map_err(|source| FetchError::Refresh {
                name: name.to_string(),
                source,
            })?;
            match fresh {
                Some(fresh) => download(fresh).await,
                None => {
                    tracing::warn!("{} has no download URL any more", name);
                    Err(e)
                }
            }
        }
        result => result,
    }
}

#[async_trait]
impl PhotoSource for ICloudSource {
    async fn list_items(&self) -> Result<Vec<SourceItem>, SourceError> {
        let mut items = Vec::new();
        let mut offset: u64 = 0;

        loop {
            let body = records::list_query(offset, PAGE_SIZE, &self.zone_id);
            let page = self.query(&body).await?;
            let (page_items, seen) = records::pair_records(page.records);
            if seen == 0 {
                break;
            }
            tracing::debug!("Listed {} items at offset {}", page_items.len(), offset);
            items.extend(page_items);
            offset += seen;
        }

        tracing::info!("Found {} items in iCloud Photos", items.len());
        Ok(items)
    }

    async fn fetch(&self, item: &SourceItem, dest: &Path) -> Result<u64, FetchError> {
        let url = item
            .locator
            .as_deref()
            .ok_or_else(|| FetchError::MissingLocator(item.id.clone()))?;
        let name = item.filename.as_deref().unwrap_or(&item.id);
        download_refreshing(
            url,
            name,
            |url| async move {
                download::download_to(&self.client, &url, dest, name, &self.retry, &self.cancel)
                    .await
            },
            || self.fresh_locator(&item.id),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    const STALE: &str = "https://cvws.example/stale";
    const FRESH: &str = "https://cvws.example/fresh";

    /// CDN stand-in: the stale URL answers 410, everything else serves
    /// five bytes unless listed in `gone`.
    struct FakeCdn {
        gone: Vec<&'static str>,
        requests: Mutex<Vec<String>>,
    }

    impl FakeCdn {
        fn new(gone: &[&'static str]) -> Self {
            Self {
                gone: gone.to_vec(),
                requests: Mutex::new(Vec::new()),
            }
        }

        async fn get(&self, url: String) -> Result<u64, FetchError> {
            self.requests.lock().unwrap().push(url.clone());
            if self.gone.contains(&url.as_str()) {
                return Err(FetchError::HttpStatus {
                    status: 410,
                    name: "IMG_0001.JPG".into(),
                });
            }
            Ok(5)
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[tokio::test]
    async fn test_expired_url_is_refreshed_once() {
        let cdn = FakeCdn::new(&[STALE]);
        let lookups = Mutex::new(0);
        let bytes = download_refreshing(
            STALE,
            "IMG_0001.JPG",
            |url| cdn.get(url),
            || async {
                *lookups.lock().unwrap() += 1;
                Ok::<_, SourceError>(Some(FRESH.to_string()))
            },
        )
        .await
        .unwrap();

        assert_eq!(bytes, 5);
        assert_eq!(*lookups.lock().unwrap(), 1);
        assert_eq!(cdn.requests(), vec![STALE.to_string(), FRESH.to_string()]);
    }

    #[tokio::test]
    async fn test_fresh_url_also_refused_fails_item() {
        let cdn = FakeCdn::new(&[STALE, FRESH]);
        let err = download_refreshing(
            STALE,
            "IMG_0001.JPG",
            |url| cdn.get(url),
            || async { Ok::<_, SourceError>(Some(FRESH.to_string())) },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, FetchError::HttpStatus { status: 410, .. }));
        assert_eq!(cdn.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_other_failures_skip_lookup() {
        let lookups = Mutex::new(0);
        let err = download_refreshing(
            STALE,
            "IMG_0001.JPG",
            |_| async {
                Err::<u64, _>(FetchError::HttpStatus {
                    status: 404,
                    name: "IMG_0001.JPG".into(),
                })
            },
            || async {
                *lookups.lock().unwrap() += 1;
                Ok::<_, SourceError>(Some(FRESH.to_string()))
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, FetchError::HttpStatus { status: 404, .. }));
        assert_eq!(*lookups.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_record_gone_keeps_original_error() {
        let cdn = FakeCdn::new(&[STALE]);
        let err = download_refreshing(
            STALE,
            "IMG_0001.JPG",
            |url| cdn.get(url),
            || async { Ok::<_, SourceError>(None) },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, FetchError::HttpStatus { status: 410, .. }));
        assert_eq!(cdn.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_lookup_failure_reported() {
        let cdn = FakeCdn::new(&[STALE]);
        let err = download_refreshing(
            STALE,
            "IMG_0001.JPG",
            |url| cdn.get(url),
            || async {
                Err::<Option<String>, _>(SourceError::SessionExpired("HTTP 401".into()))
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, FetchError::Refresh { .. }));
        assert!(!err.is_retryable());
    }
}
