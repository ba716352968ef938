//! Feed fetching for feedrelay.
//!
//! The `Fetcher` trait is the seam to whatever transport delivers feed
//! bodies: the bundled `HttpFetcher` talks HTTP directly, while brokered
//! fetchers may serve from their own cache and answer "pending" (no body)
//! for requests still in flight.

pub mod html;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::FetchConfig;
use crate::{RelayError, Result};

/// Maximum feed size in bytes (5MB).
pub const MAX_FEED_SIZE: u64 = 5 * 1024 * 1024;

/// Out-of-band keying info a fetcher may use instead of the raw URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestLookupDetails {
    /// Opaque lookup key (e.g. a hashed credentials scope).
    pub key: String,
    /// Replacement URL to fetch, if different from the feed URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Options passed through to the fetcher.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Ask a brokered fetcher to fetch when its cache misses.
    pub execute_fetch_if_not_in_cache: bool,
    /// Force a brokered fetcher to fetch even on a cache hit.
    pub execute_fetch: bool,
    /// Out-of-band request keying.
    pub lookup_details: Option<RequestLookupDetails>,
}

/// A fetch result. `body: None` means the request is still pending.
#[derive(Debug, Clone, Default)]
pub struct FetchResponse {
    /// The response body, absent while the request is in flight.
    pub body: Option<String>,
}

/// Delivers feed bodies.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the given URL.
    async fn fetch(&self, url: &str, opts: &FetchOptions) -> Result<FetchResponse>;
}

/// Direct HTTP fetcher.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher with default settings.
    pub fn new() -> Result<Self> {
        Self::with_config(&FetchConfig::default())
    }

    /// Create a fetcher from configuration.
    pub fn with_config(config: &FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| RelayError::Fetch(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, _opts: &FetchOptions) -> Result<FetchResponse> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RelayError::Fetch(format!("failed to fetch feed: {e}")))?;

        if !response.status().is_success() {
            return Err(RelayError::Fetch(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        if let Some(content_length) = response.content_length() {
            if content_length > MAX_FEED_SIZE {
                return Err(RelayError::Fetch(format!(
                    "feed too large: {content_length} bytes (max {MAX_FEED_SIZE} bytes)"
                )));
            }
        }

        let body = response
            .text()
            .await
            .map_err(|e| RelayError::Fetch(format!("failed to read response: {e}")))?;

        if body.len() as u64 > MAX_FEED_SIZE {
            return Err(RelayError::Fetch(format!(
                "feed too large: {} bytes (max {MAX_FEED_SIZE} bytes)",
                body.len()
            )));
        }

        Ok(FetchResponse { body: Some(body) })
    }
}
