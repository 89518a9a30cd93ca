//! HTTP client for the object-storage API.
//!
//! Objects live at `{base}/storage/v1/object/{bucket}/{key}`, with every key
//! segment percent-encoded. Requests authenticate with an `apikey` header
//! plus a bearer token carrying the same key.
use std::time::Duration;

use engine_logging::{engine_debug, engine_warn};
use reqwest::header::{HeaderMap, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Method, StatusCode};
use thiserror::Error;
use url::Url;

/// Metadata header carrying the SHA-256 of the stored bytes.
pub const CONTENT_HASH_HEADER: &str = "x-meta-sha256";
const UPSERT_HEADER: &str = "x-upsert";

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub base_url: String,
    pub bucket: String,
    pub api_key: String,
    pub probe_timeout: Duration,
    pub upload_timeout: Duration,
    pub json_timeout: Duration,
    /// Attempts for transient failures (network, 5xx). 429s do not count.
    pub max_attempts: u32,
    pub backoff_base: Duration,
    /// Used when a 429 carries no usable `Retry-After`.
    pub default_retry_after: Duration,
    /// Ceiling on 429 waits per request.
    pub max_rate_limit_waits: u32,
    /// Pause after each successful artifact write.
    pub politeness_delay: Duration,
}

impl StorageSettings {
    pub fn new(
        base_url: impl Into<String>,
        bucket: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            bucket: bucket.into(),
            api_key: api_key.into(),
            probe_timeout: Duration::from_secs(15),
            upload_timeout: Duration::from_secs(60),
            json_timeout: Duration::from_secs(30),
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
            default_retry_after: Duration::from_secs(5),
            max_rate_limit_waits: 10,
            politeness_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage credentials missing: {0}")]
    MissingCredentials(&'static str),
    #[error("invalid storage url: {0}")]
    InvalidUrl(String),
    #[error("storage returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("rate limited {waits} times in a row")]
    RateLimited { waits: u32 },
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
    #[error("http client error: {0}")]
    Client(String),
}

/// Shared storage client. Construct once and hand out by `Arc`.
#[derive(Debug)]
pub struct StorageClient {
    settings: StorageSettings,
    base: Url,
    client: reqwest::Client,
}

impl StorageClient {
    pub fn new(settings: StorageSettings) -> Result<Self, StorageError> {
        if settings.base_url.trim().is_empty() {
            return Err(StorageError::MissingCredentials("base url"));
        }
        if settings.api_key.trim().is_empty() {
            return Err(StorageError::MissingCredentials("api key"));
        }
        let base = Url::parse(settings.base_url.trim_end_matches('/'))
            .map_err(|err| StorageError::InvalidUrl(err.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(StorageError::InvalidUrl(settings.base_url.clone()));
        }
        let client = reqwest::Client::builder()
            .build()
            .map_err(|err| StorageError::Client(err.to_string()))?;
        Ok(Self {
            settings,
            base,
            client,
        })
    }

    pub fn settings(&self) -> &StorageSettings {
        &self.settings
    }

    /// `{base}/storage/v1/object/{bucket}/{key}` with encoded key segments.
    pub fn object_url(&self, key: &str) -> Url {
        self.build_url(&["storage", "v1", "object"], key)
    }

    /// Public (unauthenticated) URL of an object.
    pub fn public_url(&self, key: &str) -> String {
        self.build_url(&["storage", "v1", "object", "public"], key)
            .to_string()
    }

    fn build_url(&self, prefix: &[&str], key: &str) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(prefix)
                .push(&self.settings.bucket)
                .extend(key.split('/'));
        }
        url
    }

    /// Stored content hash of `key`, `None` when the object is absent or the
    /// probe could not get an answer.
    pub async fn probe_hash(&self, key: &str) -> Option<String> {
        let url = self.object_url(key);
        let result = self
            .send_with_retry(|| {
                self.authorized(Method::HEAD, url.clone())
                    .timeout(self.settings.probe_timeout)
            })
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                header_str(response.headers(), CONTENT_HASH_HEADER)
            }
            Ok(response) => {
                engine_debug!(
                    "Probe returned {} for {} (object likely not present)",
                    response.status(),
                    key
                );
                None
            }
            Err(err) => {
                engine_debug!("Probe exhausted for {}: {}", key, err);
                None
            }
        }
    }

    /// Reads an object back, `None` on 404.
    pub async fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let url = self.object_url(key);
        let response = self
            .send_with_retry(|| {
                self.authorized(Method::GET, url.clone())
                    .timeout(self.settings.upload_timeout)
            })
            .await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::BAD_REQUEST {
            return Ok(None);
        }
        let response = ensure_success(response).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|err| StorageError::Client(err.to_string()))?;
        Ok(Some(bytes.to_vec()))
    }

    /// Upserts `bytes` at `key`, attaching `content_hash` as metadata.
    pub async fn upsert(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
        content_hash: Option<&str>,
        timeout: Duration,
    ) -> Result<(), StorageError> {
        let url = self.object_url(key);
        let response = self
            .send_with_retry(|| {
                let mut request = self
                    .authorized(Method::POST, url.clone())
                    .timeout(timeout)
                    .header(CONTENT_TYPE, content_type)
                    .header(UPSERT_HEADER, "true")
                    .body(bytes.to_vec());
                if let Some(hash) = content_hash {
                    request = request.header(CONTENT_HASH_HEADER, hash);
                }
                request
            })
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    fn authorized(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.settings.api_key)
            .bearer_auth(&self.settings.api_key)
    }

    /// Sends the request built by `build`, retrying transient failures with
    /// exponential backoff. A 429 sleeps for `Retry-After` and retries without
    /// spending an attempt. Any other response is handed back to the caller.
    pub(crate) async fn send_with_retry<F>(
        &self,
        build: F,
    ) -> Result<reqwest::Response, StorageError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let max_attempts = self.settings.max_attempts.max(1);
        let mut attempt = 0u32;
        let mut rate_limited = 0u32;

        loop {
            let last = match build().send().await {
                Ok(response) if response.status() == StatusCode::TOO_MANY_REQUESTS => {
                    rate_limited += 1;
                    if rate_limited > self.settings.max_rate_limit_waits {
                        return Err(StorageError::RateLimited {
                            waits: rate_limited - 1,
                        });
                    }
                    let wait = retry_after(response.headers())
                        .unwrap_or(self.settings.default_retry_after);
                    engine_debug!("Storage 429, sleeping {:?}", wait);
                    tokio::time::sleep(wait).await;
                    continue;
                }
                Ok(response) if response.status().is_server_error() => {
                    format!("status {}", response.status())
                }
                Ok(response) => return Ok(response),
                Err(err) => err.to_string(),
            };

            attempt += 1;
            if attempt >= max_attempts {
                return Err(StorageError::Exhausted {
                    attempts: attempt,
                    last,
                });
            }
            let wait = self.settings.backoff_base * 2u32.saturating_pow(attempt);
            engine_warn!(
                "Storage attempt {} failed ({}), retrying in {:?}",
                attempt,
                last,
                wait
            );
            tokio::time::sleep(wait).await;
        }
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, StorageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StorageError::Status {
        status: status.as_u16(),
        body,
    })
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// `Retry-After` in delta-seconds form.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
