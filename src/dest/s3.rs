//! Amazon S3 (or an S3-compatible store) as a [`Destination`].

use std::collections::HashMap;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::StorageClass;
use aws_sdk_s3::Client;

use super::{Destination, DestinationError, ObjectHead, PutRequest};

/// Where to connect.
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub bucket: String,
    pub region: String,
    /// Endpoint override for S3-compatible stores (MinIO, LocalStack).
    pub endpoint: Option<String>,
}

/// Client bound to one bucket.
#[derive(Clone)]
pub struct S3Destination {
    client: Client,
    bucket: String,
}

impl std::fmt::Debug for S3Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Destination")
            .field("bucket", &self.bucket)
            .finish()
    }
}

impl S3Destination {
    /// Build a client from the default credential chain and confirm the
    /// bucket is reachable with `HeadBucket`.
    pub async fn connect(settings: S3Settings) -> Result<Self, DestinationError> {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &settings.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        let client = Client::from_conf(builder.build());

        let destination = Self {
            client,
            bucket: settings.bucket,
        };
        destination.check_bucket().await?;
        tracing::info!(
            "Connected to S3 bucket {} in {}",
            destination.bucket,
            settings.region
        );
        Ok(destination)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn check_bucket(&self) -> Result<(), DestinationError> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(()),
            Err(e) => Err(match http_status(&e) {
                Some(404) => DestinationError::BucketNotFound(self.bucket.clone()),
                Some(403) => DestinationError::AccessDenied(self.bucket.clone()),
                _ => map_sdk_error("HeadBucket", &self.bucket, e),
            }),
        }
    }
}

#[async_trait]
impl Destination for S3Destination {
    async fn head_object(&self, key: &str) -> Result<Option<ObjectHead>, DestinationError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => Ok(Some(ObjectHead {
                integrity_tag: output.e_tag().map(normalize_etag).unwrap_or_default(),
            })),
            Err(e) if http_status(&e) == Some(404) => Ok(None),
            Err(e) => Err(map_sdk_error("HeadObject", key, e)),
        }
    }

    async fn put_object(&self, request: &PutRequest) -> Result<(), DestinationError> {
        let body = ByteStream::from_path(&request.body)
            .await
            .map_err(|e| DestinationError::Body {
                path: request.body.display().to_string(),
                message: e.to_string(),
            })?;

        let metadata: HashMap<String, String> = request
            .metadata
            .iter()
            .map(|(k, v)| (k.clone(), metadata_value(v)))
            .collect();

        let mut put = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&request.key)
            .body(body)
            .content_type(request.content_type)
            .set_metadata(Some(metadata));
        if let Some(class) = &request.storage_class {
            put = put.storage_class(StorageClass::from(class.as_str()));
        }

        put.send()
            .await
            .map_err(|e| map_sdk_error("PutObject", &request.key, e))?;
        Ok(())
    }
}

/// Strip the quotes S3 puts around ETags.
pub fn normalize_etag(etag: &str) -> String {
    etag.trim_matches('"').to_string()
}

/// S3 user metadata travels as HTTP headers, which only carry ASCII.
fn metadata_value(value: &str) -> String {
    if value.is_ascii() {
        value.to_string()
    } else {
        urlencoding::encode(value).into_owned()
    }
}

/// HTTP status of a service error; `None` for timeouts and dispatch failures.
fn http_status<E>(err: &SdkError<E>) -> Option<u16> {
    match err {
        SdkError::ServiceError(service_err) => Some(service_err.raw().status().as_u16()),
        _ => None,
    }
}

fn map_sdk_error<E>(op: &'static str, target: &str, err: SdkError<E>) -> DestinationError
where
    E: std::error::Error + 'static,
{
    let message = DisplayErrorContext(&err).to_string();
    match http_status(&err) {
        Some(status) => DestinationError::Status {
            op,
            target: target.to_string(),
            status,
            message,
        },
        None => DestinationError::Transport {
            op,
            target: target.to_string(),
            message,
        },
    }
}
