//! Async HTTP transport for harvest fetches.
//!
//! A thin wrapper over `reqwest` that turns `{uri, headers}` requests into
//! `{status, body}` results. It supports many concurrently outstanding
//! requests (the client is a cheap handle over a shared pool) and leaves
//! retry/backoff to the transport layer's caller. Timeouts resolve as
//! ordinary failures so a hung request never blocks the rest of its batch.

use std::time::Duration;

use reqwest::Client;
use tracing::debug;
use url::Url;

use gatherer_shared::{HarvestError, HttpConfig, Result};

/// User-Agent string for harvest requests.
const USER_AGENT: &str = concat!("Gatherer/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Request / result
// ---------------------------------------------------------------------------

/// One fetch to issue: target URI plus provider headers.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Fully resolved request URI.
    pub uri: Url,
    /// Headers to send (auth tokens and the like).
    pub headers: Vec<(String, String)>,
}

impl FetchRequest {
    pub fn new(uri: Url) -> Self {
        Self {
            uri,
            headers: Vec::new(),
        }
    }

    pub fn with_headers(uri: Url, headers: &[(String, String)]) -> Self {
        Self {
            uri,
            headers: headers.to_vec(),
        }
    }
}

/// A resolved fetch: HTTP status and raw body. Immutable once resolved;
/// exactly one per [`FetchRequest`].
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub status: u16,
    pub body: String,
}

impl FetchResult {
    /// Whether the response carries a usable body (2xx).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Shared HTTP client for all harvest fetches. Clone freely; clones share
/// the underlying connection pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Build a client from transport settings.
    pub fn new(http: &HttpConfig) -> Result<Self> {
        let redirects = if http.follow_redirects {
            reqwest::redirect::Policy::limited(5)
        } else {
            reqwest::redirect::Policy::none()
        };

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(redirects)
            .timeout(Duration::from_secs(http.timeout_secs))
            .build()
            .map_err(|e| HarvestError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// Issue one request and resolve it to `{status, body}`.
    ///
    /// Transport errors (connect failure, timeout) come back as
    /// [`HarvestError::Fetch`]; a non-2xx status is returned as a normal
    /// [`FetchResult`] so the caller decides whether that stage was required.
    pub async fn fetch(&self, request: &FetchRequest) -> Result<FetchResult> {
        debug!(uri = %request.uri, "fetching");

        let mut req = self.client.get(request.uri.as_str());
        for (name, value) in &request.headers {
            req = req.header(name, value);
        }

        let response = req
            .send()
            .await
            .map_err(|e| HarvestError::fetch(request.uri.as_str(), e.to_string()))?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            HarvestError::fetch(request.uri.as_str(), format!("body read failed: {e}"))
        })?;

        Ok(FetchResult { status, body })
    }

    /// Like [`fetch`](Self::fetch), but treats any non-2xx status as an
    /// error too. Used where a stage needs a body or nothing.
    pub async fn fetch_ok(&self, request: &FetchRequest) -> Result<FetchResult> {
        let result = self.fetch(request).await?;
        if !result.is_success() {
            return Err(HarvestError::fetch(
                request.uri.as_str(),
                format!("HTTP {}", result.status),
            ));
        }
        Ok(result)
    }
}
