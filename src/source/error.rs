use thiserror::Error;

/// Failures establishing or enumerating the source. Any of these is fatal
/// to the run.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("No usable iCloud session in {dir}: {reason}")]
    NoSession { dir: String, reason: String },

    #[error("iCloud session is no longer valid ({0}); sign in again to refresh the session files")]
    SessionExpired(String),

    #[error("Service not available for this account: {0}")]
    ServiceNotActivated(String),

    #[error("Apple insists on using {0} for this account; rerun with --domain cn")]
    WrongDomain(String),

    #[error("Photo library not finished indexing")]
    IndexingNotFinished,

    #[error("API response error: {0}")]
    ApiResponse(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Typed per-item fetch errors enabling retry classification.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error {status} downloading {name}")]
    HttpStatus { status: u16, name: String },

    #[error("HTTP error downloading {name} (bytes_so_far={bytes_written}): {source}")]
    Http {
        source: reqwest::Error,
        name: String,
        bytes_written: u64,
    },

    #[error("Disk error: {0}")]
    Disk(#[from] std::io::Error),

    #[error("No download location for item {0}")]
    MissingLocator(String),

    #[error("Could not refresh the download URL for {name}: {source}")]
    Refresh { name: String, source: SourceError },
}

impl FetchError {
    /// Whether this error is transient and worth retrying: rate limits,
    /// server errors and dropped connections.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            FetchError::Http { .. } => true,
            FetchError::Disk(_) => false,
            FetchError::MissingLocator(_) => false,
            FetchError::Refresh { .. } => false,
        }
    }

    /// Whether the CDN refused the download URL as expired. iCloud URLs
    /// are short-lived; a fresh one may still work.
    pub fn is_expired_locator(&self) -> bool {
        matches!(self, FetchError::HttpStatus { status: 403 | 410, .. })
    }
}
