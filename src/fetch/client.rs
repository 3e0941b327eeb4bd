use async_trait::async_trait;
use futures::StreamExt;
use reqwest::redirect::Policy;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::error::FetchError;
use super::response::decode_page;
use crate::search::{DateRange, Page};

const MAX_RESPONSE_SIZE: usize = 5 * 1024 * 1024; // 5MB

/// Upstream page size ceiling.
pub const MAX_RESULTS_LIMIT: u32 = 50;

/// Outcome of a single page fetch, decoded at the fetcher boundary.
pub type PageResult = Result<Page, FetchError>;

/// Everything needed to request one page.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest<'a> {
    /// The effective (possibly date-augmented) query string
    pub query: &'a str,
    /// Continuation token from the previous page, `None` for page 1
    pub cursor: Option<&'a str>,
    /// Caller-supplied API key; `None` routes through the proxy
    pub credential: Option<&'a SecretString>,
    pub date_range: &'a DateRange,
}

/// Issues one page request against the search backend.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch_page(&self, request: &PageRequest<'_>) -> PageResult;
}

#[async_trait]
impl<T: Fetcher + ?Sized> Fetcher for Arc<T> {
    async fn fetch_page(&self, request: &PageRequest<'_>) -> PageResult {
        (**self).fetch_page(request).await
    }
}

/// Where page requests go.
#[derive(Debug, Clone)]
pub struct Endpoints {
    /// Local proxy that injects a server-held credential
    pub proxy_url: String,
    /// Upstream search API, used directly when a credential is supplied
    pub upstream_url: String,
    /// Page size requested from the upstream API (clamped to 1..=50)
    pub max_results: u32,
}

/// HTTP client for page fetches: pooled connections, bounded redirects and a
/// per-request timeout.
pub fn build_client() -> Result<reqwest::Client, FetchError> {
    let client = reqwest::Client::builder()
        .redirect(redirect_policy())
        .pool_max_idle_per_host(2)
        .pool_idle_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(60))
        .timeout(Duration::from_secs(30))
        .user_agent(concat!("tubescan/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

fn redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= 3 {
            return attempt.error("Too many redirects (max 3)");
        }

        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev.as_str() == url.as_str()) {
            return attempt.error("Redirect loop detected");
        }

        tracing::debug!(
            to = %url.host_str().unwrap_or("unknown"),
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );
        attempt.follow()
    })
}

/// [`Fetcher`] backed by `reqwest`.
pub struct HttpFetcher {
    client: reqwest::Client,
    proxy_url: Url,
    upstream_url: Url,
    max_results: u32,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client, endpoints: &Endpoints) -> Result<Self, FetchError> {
        let proxy_url = Url::parse(&endpoints.proxy_url)
            .map_err(|e| FetchError::InvalidEndpoint(format!("{}: {}", endpoints.proxy_url, e)))?;
        let upstream_url = Url::parse(&endpoints.upstream_url).map_err(|e| {
            FetchError::InvalidEndpoint(format!("{}: {}", endpoints.upstream_url, e))
        })?;

        Ok(Self {
            client,
            proxy_url,
            upstream_url,
            max_results: endpoints.max_results.clamp(1, MAX_RESULTS_LIMIT),
        })
    }

    /// Builds the request URL for either the direct or the proxied route.
    fn request_url(&self, request: &PageRequest<'_>) -> Result<Url, FetchError> {
        let mut url = match request.credential {
            Some(key) => {
                // Only send the key over HTTPS (localhost allowed for testing)
                if !is_secure_or_local(&self.upstream_url) {
                    tracing::error!(upstream = %self.upstream_url, "Refusing to send credential over plain HTTP");
                    return Err(FetchError::InsecureUpstream);
                }
                let mut url = self.upstream_url.clone();
                url.query_pairs_mut()
                    .append_pair("part", "snippet")
                    .append_pair("type", "video")
                    .append_pair("maxResults", &self.max_results.to_string())
                    .append_pair("key", key.expose_secret());
                url
            }
            None => self.proxy_url.clone(),
        };

        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("q", request.query);
            if let Some(cursor) = request.cursor {
                pairs.append_pair("pageToken", cursor);
            }
            if let Some(after) = request.date_range.published_after_param() {
                pairs.append_pair("publishedAfter", &after);
            }
            if let Some(before) = request.date_range.published_before_param() {
                pairs.append_pair("publishedBefore", &before);
            }
        }

        Ok(url)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_page(&self, request: &PageRequest<'_>) -> PageResult {
        let url = self.request_url(request)?;
        let direct = request.credential.is_some();

        tracing::debug!(
            direct = direct,
            has_cursor = request.cursor.is_some(),
            "Requesting search page"
        );

        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
            // The direct URL carries the key; keep it out of error text
            .map_err(|e| FetchError::Transport(e.without_url()))?;

        let status = response.status();
        let body = read_limited_bytes(response, MAX_RESPONSE_SIZE).await?;

        let result = decode_page(status.as_u16(), &body);
        if let Err(e) = &result {
            tracing::warn!(direct = direct, status = status.as_u16(), error = %e, "Search page fetch failed");
        }
        result
    }
}

fn is_secure_or_local(url: &Url) -> bool {
    if url.scheme() == "https" {
        return true;
    }
    matches!(url.host_str(), Some("localhost") | Some("127.0.0.1") | Some("[::1]"))
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| FetchError::Transport(e.without_url()))?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
