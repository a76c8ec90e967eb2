//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for sitemap retrieval, including:
//! - Per-proxy HTTP client caching
//! - User agent selection (override, rotation pool, built-in identifier)
//! - Politeness delay before every attempt
//! - Retry with exponential backoff for transient failures
//! - gzip payload detection and decompression

use crate::config::{HttpConfig, BUILTIN_USER_AGENT};
use crate::crawler::retry::RetryPolicy;
use flate2::read::MultiGzDecoder;
use rand::seq::SliceRandom;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, Method};
use std::collections::HashMap;
use std::io::Read;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Errors from fetching a single URL
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("Could not connect to {url}: {message}")]
    Connect { url: String, message: String },

    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to decompress gzip payload from {url}: {source}")]
    Decompress {
        url: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid proxy '{proxy}': {message}")]
    Proxy { proxy: String, message: String },

    #[error("Giving up on {url} after {attempts} attempts: {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        last: Box<FetchError>,
    },
}

impl FetchError {
    /// Returns true if the failure may succeed on a later attempt
    ///
    /// Connection failures (including connections dropped or reset after
    /// they were accepted), timeouts, HTTP 5xx and HTTP 429 are transient.
    /// Other 4xx responses, decompression failures and proxy errors are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Connect { .. } => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Request { source, .. } => source.is_request() || source.is_body(),
            Self::Decompress { .. } | Self::Proxy { .. } | Self::Exhausted { .. } => false,
        }
    }
}

/// Per-request options
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Explicit user agent; when unset one is drawn from the rotation pool
    pub user_agent: Option<String>,
    /// Proxy URL applied to the request
    pub proxy: Option<String>,
    /// Overrides the configured request timeout
    pub timeout: Option<Duration>,
}

/// Rate-limited, retrying HTTP fetcher
pub struct Fetcher {
    config: HttpConfig,
    policy: RetryPolicy,
    clients: Mutex<HashMap<Option<String>, Client>>,
}

impl Fetcher {
    /// Creates a fetcher using the retry policy described by `config`
    pub fn new(config: &HttpConfig) -> Self {
        Self {
            config: config.clone(),
            policy: RetryPolicy::from_config(config),
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Fetches a URL with GET and returns the (decompressed) body
    ///
    /// # Arguments
    ///
    /// * `url` - The URL to fetch
    /// * `opts` - User agent, proxy and timeout for this request
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<u8>)` - Response body, gunzipped when flagged as gzip
    /// * `Err(FetchError)` - Terminal failure, or `Exhausted` after the retry
    ///   ceiling
    pub async fn fetch(&self, url: &str, opts: &FetchOptions) -> Result<Vec<u8>, FetchError> {
        self.request(Method::GET, url, opts).await
    }

    /// Sends a request with the given method
    ///
    /// Only GET and HEAD are retried. Every attempt is preceded by the
    /// politeness delay, and retries additionally wait for the backoff delay.
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        opts: &FetchOptions,
    ) -> Result<Vec<u8>, FetchError> {
        let client = self.client_for(opts.proxy.as_deref())?;
        let user_agent = self.choose_user_agent(opts.user_agent.as_deref());
        let idempotent = method == Method::GET || method == Method::HEAD;
        let politeness = self.config.politeness_delay();

        let mut attempt = 0;
        loop {
            attempt += 1;

            if !politeness.is_zero() {
                tokio::time::sleep(politeness).await;
            }

            let started = Instant::now();
            let result = self
                .attempt(&client, method.clone(), url, &user_agent, opts.timeout)
                .await;
            let latency_ms = started.elapsed().as_millis() as u64;

            let err = match result {
                Ok((status, body)) => {
                    tracing::debug!(
                        method = %method,
                        url,
                        attempt,
                        status,
                        latency_ms,
                        bytes = body.len(),
                        "Fetched"
                    );
                    return Ok(body);
                }
                Err(err) => err,
            };

            let status = match &err {
                FetchError::Status { status, .. } => Some(*status),
                _ => None,
            };
            tracing::warn!(
                method = %method,
                url,
                attempt,
                status,
                latency_ms,
                error = %err,
                "Fetch attempt failed"
            );

            if !idempotent || !err.is_transient() {
                return Err(err);
            }

            if !self.policy.should_retry(attempt) {
                return Err(FetchError::Exhausted {
                    url: url.to_string(),
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            tokio::time::sleep(self.policy.delay_for(attempt)).await;
        }
    }

    async fn attempt(
        &self,
        client: &Client,
        method: Method,
        url: &str,
        user_agent: &str,
        timeout: Option<Duration>,
    ) -> Result<(u16, Vec<u8>), FetchError> {
        let mut request = client.request(method, url).header(USER_AGENT, user_agent);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(|e| classify_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let body = response.bytes().await.map_err(|e| classify_error(url, e))?;
        let body = decode_body(url, content_type.as_deref(), body.to_vec())?;

        Ok((status.as_u16(), body))
    }

    /// Returns the user agent for a request
    ///
    /// An explicit non-blank override wins, then a random pick from the
    /// rotation pool, then the built-in identifier.
    pub fn choose_user_agent(&self, explicit: Option<&str>) -> String {
        if let Some(agent) = explicit.map(str::trim).filter(|a| !a.is_empty()) {
            return agent.to_string();
        }

        self.config
            .user_agents
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_else(|| BUILTIN_USER_AGENT.to_string())
    }

    /// Returns the cached client for `proxy`, building it on first use
    fn client_for(&self, proxy: Option<&str>) -> Result<Client, FetchError> {
        let key = proxy.map(|p| p.to_string());
        let mut clients = match self.clients.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        let client = build_http_client(&self.config, proxy)?;
        clients.insert(key, client.clone());
        Ok(client)
    }
}

/// Builds an HTTP client with the configured timeout and optional proxy
pub fn build_http_client(config: &HttpConfig, proxy: Option<&str>) -> Result<Client, FetchError> {
    let mut builder = Client::builder()
        .timeout(config.timeout())
        .connect_timeout(Duration::from_secs(10).min(config.timeout()))
        .gzip(true);

    if let Some(proxy_url) = proxy {
        let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| FetchError::Proxy {
            proxy: proxy_url.to_string(),
            message: e.to_string(),
        })?;
        builder = builder.proxy(proxy);
    }

    builder.build().map_err(|e| FetchError::Proxy {
        proxy: proxy.unwrap_or("none").to_string(),
        message: e.to_string(),
    })
}

fn classify_error(url: &str, err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else if err.is_connect() {
        FetchError::Connect {
            url: url.to_string(),
            message: err.to_string(),
        }
    } else {
        FetchError::Request {
            url: url.to_string(),
            source: err,
        }
    }
}

/// Returns true if the payload should be treated as gzip
///
/// A payload is flagged when its content type is `application/x-gzip` or
/// `application/gzip`, or when the URL path ends in `.gz`.
pub fn is_gzip_flagged(url: &str, content_type: Option<&str>) -> bool {
    let by_type = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .map_or(false, |ct| ct == "application/x-gzip" || ct == "application/gzip");

    let by_path = match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_ascii_lowercase().ends_with(".gz"),
        Err(_) => url.to_ascii_lowercase().ends_with(".gz"),
    };

    by_type || by_path
}

/// Decompresses a flagged payload
///
/// Payloads that are flagged but already look like XML were decoded at the
/// transport level and pass through unchanged.
fn decode_body(url: &str, content_type: Option<&str>, body: Vec<u8>) -> Result<Vec<u8>, FetchError> {
    if !is_gzip_flagged(url, content_type) {
        return Ok(body);
    }

    if body.starts_with(&GZIP_MAGIC) {
        let mut decoded = Vec::new();
        MultiGzDecoder::new(body.as_slice())
            .read_to_end(&mut decoded)
            .map_err(|source| FetchError::Decompress {
                url: url.to_string(),
                source,
            })?;
        return Ok(decoded);
    }

    if looks_like_xml(&body) {
        tracing::debug!(url, "gzip-flagged payload is already plain XML");
        return Ok(body);
    }

    Err(FetchError::Decompress {
        url: url.to_string(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, "missing gzip header"),
    })
}

fn looks_like_xml(body: &[u8]) -> bool {
    let body = body.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(body);
    body.iter()
        .find(|b| !b.is_ascii_whitespace())
        .map_or(false, |b| *b == b'<')
}
