//! Reuse of a previously established iCloud web session.
//!
//! Sign-in happens out of band. What lives on disk is a cookie file named
//! after the sanitized username (a JSON list of `{url, cookie}` entries) and
//! a `<name>.session` file carrying string session data such as `client_id`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ORIGIN, REFERER, USER_AGENT};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;

use super::endpoints::Endpoints;
use crate::source::error::SourceError;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Keep only word characters (alphanumeric and underscore).
pub fn sanitize_username(username: &str) -> String {
    username
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect()
}

/// Whether a Set-Cookie value carries an `Expires` in the past.
pub(crate) fn is_cookie_expired(cookie_str: &str, now: &DateTime<Utc>) -> bool {
    if let Ok(parsed) = cookie::Cookie::parse(cookie_str) {
        if let Some(expires) = parsed.expires_datetime() {
            let expires_utc = DateTime::<Utc>::from(std::time::SystemTime::from(expires));
            return expires_utc < *now;
        }
    }
    false
}

/// One persisted cookie (URL plus Set-Cookie header value).
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct CookieEntry {
    pub url: String,
    pub cookie: String,
}

/// Account data returned by `/validate`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AccountInfo {
    #[serde(default)]
    pub ds_info: Option<DsInfo>,
    #[serde(default)]
    pub webservices: Option<Webservices>,
    #[serde(default)]
    pub domain_to_use: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DsInfo {
    #[serde(default)]
    pub dsid: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Webservices {
    #[serde(default)]
    pub ckdatabasews: Option<WebserviceEndpoint>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WebserviceEndpoint {
    pub url: String,
    #[serde(default)]
    pub status: Option<String>,
}

impl AccountInfo {
    /// The CloudKit database URL, provided the photos service is usable.
    pub fn ckdatabasews_url(&self) -> Result<&str, SourceError> {
        let ep = self
            .webservices
            .as_ref()
            .and_then(|ws| ws.ckdatabasews.as_ref())
            .ok_or_else(|| SourceError::ServiceNotActivated("ckdatabasews".into()))?;
        match ep.status.as_deref() {
            None | Some("active") => Ok(ep.url.as_str()),
            Some(other) => Err(SourceError::ServiceNotActivated(format!(
                "ckdatabasews ({})",
                other
            ))),
        }
    }

    /// Account identifier as a string; Apple sends it as either type.
    pub fn dsid(&self) -> Option<String> {
        match self.ds_info.as_ref()?.dsid.as_ref()? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// A cookie-carrying HTTP client plus the persisted session data.
pub(crate) struct StoredSession {
    pub client: Client,
    pub session_data: HashMap<String, String>,
}

impl StoredSession {
    pub fn client_id(&self) -> Option<&str> {
        self.session_data.get("client_id").map(String::as_str)
    }
}

fn cookie_path(cookie_dir: &Path, sanitized: &str) -> PathBuf {
    cookie_dir.join(sanitized)
}

fn session_path(cookie_dir: &Path, sanitized: &str) -> PathBuf {
    cookie_dir.join(format!("{}.session", sanitized))
}

/// Parse the cookie file into a jar, dropping expired entries.
/// Returns the number of cookies loaded.
fn load_cookies(contents: &str, jar: &reqwest::cookie::Jar, now: &DateTime<Utc>) -> usize {
    let entries: Vec<CookieEntry> = match serde_json::from_str(contents) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("Cookie file is not valid JSON, ignoring it: {}", e);
            return 0;
        }
    };
    let mut loaded = 0;
    for entry in entries {
        if is_cookie_expired(&entry.cookie, now) {
            tracing::debug!("Pruning expired cookie from {}", entry.url);
            continue;
        }
        if let Ok(url) = entry.url.parse::<url::Url>() {
            jar.add_cookie_str(&entry.cookie, &url);
            loaded += 1;
        }
    }
    loaded
}

fn session_data_from(contents: &str) -> HashMap<String, String> {
    match serde_json::from_str::<HashMap<String, Value>>(contents) {
        Ok(map) => map
            .into_iter()
            .map(|(k, v)| match v {
                Value::String(s) => (k, s),
                other => (k, other.to_string()),
            })
            .collect(),
        Err(_) => {
            tracing::info!("Session file corrupt, ignoring it");
            HashMap::new()
        }
    }
}

/// Load the persisted session for `username` from `cookie_dir`.
///
/// Fails when no unexpired cookies are available; there is no way to sign in
/// from here.
pub(crate) async fn load(
    cookie_dir: &Path,
    username: &str,
    endpoints: &Endpoints,
) -> Result<StoredSession, SourceError> {
    let sanitized = sanitize_username(username);
    let no_session = |reason: String| SourceError::NoSession {
        dir: cookie_dir.display().to_string(),
        reason,
    };

    let cookies_file = cookie_path(cookie_dir, &sanitized);
    let contents = fs::read_to_string(&cookies_file)
        .await
        .map_err(|e| no_session(format!("{}: {}", cookies_file.display(), e)))?;

    let jar = Arc::new(reqwest::cookie::Jar::default());
    let loaded = load_cookies(&contents, &jar, &Utc::now());
    if loaded == 0 {
        return Err(no_session("no unexpired cookies".into()));
    }
    tracing::debug!("Loaded {} cookies from {}", loaded, cookies_file.display());

    let session_file = session_path(cookie_dir, &sanitized);
    let session_data = match fs::read_to_string(&session_file).await {
        Ok(contents) => session_data_from(&contents),
        Err(_) => {
            tracing::debug!("No session data at {}", session_file.display());
            HashMap::new()
        }
    };

    // Apple's CORS checks reject requests without these
    let mut default_headers = HeaderMap::new();
    default_headers.insert(
        ORIGIN,
        HeaderValue::from_str(endpoints.home).map_err(|e| no_session(e.to_string()))?,
    );
    default_headers.insert(
        REFERER,
        HeaderValue::from_str(&format!("{}/", endpoints.home))
            .map_err(|e| no_session(e.to_string()))?,
    );
    default_headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));

    let client = Client::builder()
        .cookie_provider(jar)
        .default_headers(default_headers)
        .timeout(REQUEST_TIMEOUT)
        .build()?;

    Ok(StoredSession {
        client,
        session_data,
    })
}

/// POST `/validate` to confirm the session is still accepted and fetch the
/// account's service endpoints.
pub(crate) async fn validate(
    session: &StoredSession,
    endpoints: &Endpoints,
) -> Result<AccountInfo, SourceError> {
    tracing::debug!("Checking session validity");
    let response = session
        .client
        .post(endpoints.validate_url())
        .body("null")
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        tracing::debug!("Validate rejected with {}: {}", status, text);
        return Err(SourceError::SessionExpired(format!("HTTP {}", status.as_u16())));
    }

    let info: AccountInfo = response.json().await?;
    if let Some(domain) = info.domain_to_use.as_deref() {
        return Err(SourceError::WrongDomain(domain.to_string()));
    }
    Ok(info)
}
