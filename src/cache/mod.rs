//! Compressed article caching for feedrelay.
//!
//! Caches whole parse results keyed by a canonical fingerprint of the
//! request, so repeated polls of the same URL with the same options skip
//! the fetch and parse entirely. Payloads are zlib-deflated JSON wrapped
//! in base64; entries live for five minutes unless refreshed.

pub mod memory;

use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::Serialize;

use crate::articles::flatten::{ExternalFeedProperty, FormatOptions};
use crate::articles::types::{Article, CachedArticles};
use crate::fetch::RequestLookupDetails;
use crate::hash::sha1_hex;
use crate::{RelayError, Result};

pub use memory::MemoryCacheStore;

/// Prefix of every article-cache key.
pub const CACHE_KEY_PREFIX: &str = "articles:com:";

/// Default time-to-live for cached article sets.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Key/value store the cache layer sits on.
///
/// `set` with `ttl: None` keeps the entry's remaining time-to-live.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Check whether a key exists.
    async fn exists(&self, key: &str) -> Result<bool>;
    /// Get a value.
    async fn get(&self, key: &str) -> Result<Option<String>>;
    /// Set a value, with a fresh TTL or keeping the old one.
    async fn set(&self, key: &str, body: &str, ttl: Option<Duration>) -> Result<()>;
    /// Delete a key.
    async fn del(&self, key: &str) -> Result<()>;
    /// Reset a key's TTL without rewriting its value.
    async fn set_expire(&self, key: &str, ttl: Duration) -> Result<()>;
}

/// The request fields that participate in cache identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheKeyData<'a> {
    /// The feed URL.
    pub url: &'a str,
    /// Formatting options, if any.
    pub format_options: Option<&'a FormatOptions>,
    /// External page-scrape properties, if any.
    pub external_feed_properties: Option<&'a [ExternalFeedProperty]>,
    /// Out-of-band request keying, if any.
    pub request_lookup_details: Option<&'a RequestLookupDetails>,
}

/// Canonical JSON shape hashed into the cache key.
///
/// Fields whose every sub-field is absent are dropped entirely, and
/// lookup details are reduced to their key, so equivalent requests always
/// fingerprint identically.
#[derive(Serialize)]
struct CanonicalKey<'a> {
    url: &'a str,
    options: CanonicalOptions<'a>,
}

#[derive(Serialize)]
struct CanonicalOptions<'a> {
    #[serde(rename = "formatOptions", skip_serializing_if = "Option::is_none")]
    format_options: Option<&'a FormatOptions>,
    #[serde(
        rename = "externalFeedProperties",
        skip_serializing_if = "Option::is_none"
    )]
    external_feed_properties: Option<&'a [ExternalFeedProperty]>,
    #[serde(
        rename = "requestLookupDetails",
        skip_serializing_if = "Option::is_none"
    )]
    request_lookup_details: Option<LookupKey<'a>>,
}

#[derive(Serialize)]
struct LookupKey<'a> {
    key: &'a str,
}

/// Derive the canonical cache key for a request.
pub fn cache_key(data: &CacheKeyData<'_>) -> Result<String> {
    let canonical = CanonicalKey {
        url: data.url,
        options: CanonicalOptions {
            format_options: data.format_options.filter(|o| !o.is_empty()),
            external_feed_properties: data.external_feed_properties.filter(|p| !p.is_empty()),
            request_lookup_details: data
                .request_lookup_details
                .map(|d| LookupKey { key: &d.key }),
        },
    };
    let json = serde_json::to_string(&canonical)?;
    Ok(format!("{CACHE_KEY_PREFIX}{}", sha1_hex(&json)))
}

/// Compressed article cache over a key/value store.
#[derive(Clone)]
pub struct ArticleCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl ArticleCache {
    /// Create a cache with the default TTL.
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self::with_ttl(store, DEFAULT_CACHE_TTL)
    }

    /// Create a cache with a custom TTL.
    pub fn with_ttl(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Create a cache from configuration.
    pub fn from_config(store: Arc<dyn CacheStore>, config: &crate::config::CacheConfig) -> Self {
        Self::with_ttl(store, Duration::from_secs(config.ttl_secs))
    }

    /// Check whether a cached result exists for this request.
    pub async fn exists(&self, data: &CacheKeyData<'_>) -> Result<bool> {
        self.store.exists(&cache_key(data)?).await
    }

    /// Get the cached articles for this request, if present.
    pub async fn get(&self, data: &CacheKeyData<'_>) -> Result<Option<Vec<Article>>> {
        let key = cache_key(data)?;
        match self.store.get(&key).await? {
            Some(body) => Ok(Some(decode_articles(&body)?)),
            None => Ok(None),
        }
    }

    /// Cache the articles for this request.
    ///
    /// With `use_old_ttl` the entry's remaining TTL is preserved instead
    /// of being reset.
    pub async fn set(
        &self,
        data: &CacheKeyData<'_>,
        articles: &[Article],
        use_old_ttl: bool,
    ) -> Result<()> {
        let key = cache_key(data)?;
        let body = encode_articles(articles)?;
        let ttl = if use_old_ttl { None } else { Some(self.ttl) };
        self.store.set(&key, &body, ttl).await
    }

    /// Drop the cached result for this request.
    pub async fn invalidate(&self, data: &CacheKeyData<'_>) -> Result<()> {
        self.store.del(&cache_key(data)?).await
    }

    /// Bump the entry back to a full TTL without rewriting its value.
    pub async fn refresh_ttl(&self, data: &CacheKeyData<'_>) -> Result<()> {
        self.store.set_expire(&cache_key(data)?, self.ttl).await
    }
}

/// Encode articles to base64-wrapped zlib-deflated JSON.
fn encode_articles(articles: &[Article]) -> Result<String> {
    let payload = CachedArticles {
        articles: articles.to_vec(),
    };
    let json = serde_json::to_vec(&payload)?;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    let compressed = encoder.finish()?;

    Ok(BASE64.encode(compressed))
}

/// Decode a cached body back into articles.
fn decode_articles(body: &str) -> Result<Vec<Article>> {
    let compressed = BASE64
        .decode(body)
        .map_err(|e| RelayError::Cache(format!("invalid base64 payload: {e}")))?;

    let mut decoder = ZlibDecoder::new(&compressed[..]);
    let mut json = Vec::new();
    decoder.read_to_end(&mut json)?;

    let payload: CachedArticles = serde_json::from_slice(&json)?;
    Ok(payload.articles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::articles::types::{FlatValue, RawDates};
    use std::collections::BTreeMap;

    fn article(id: &str) -> Article {
        let mut flattened = BTreeMap::new();
        flattened.insert("id".to_string(), FlatValue::from(id));
        flattened.insert("idHash".to_string(), FlatValue::from(sha1_hex(id)));
        flattened.insert("title".to_string(), FlatValue::from("Title"));
        Article {
            flattened,
            raw: RawDates::default(),
        }
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let articles = vec![article("a"), article("b")];
        let body = encode_articles(&articles).unwrap();
        let back = decode_articles(&body).unwrap();
        assert_eq!(back, articles);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_articles("not base64!!!").is_err());
    }

    #[test]
    fn test_cache_key_has_prefix() {
        let key = cache_key(&CacheKeyData {
            url: "https://example.com/feed.xml",
            ..Default::default()
        })
        .unwrap();
        assert!(key.starts_with(CACHE_KEY_PREFIX));
        // prefix + 40 hex chars
        assert_eq!(key.len(), CACHE_KEY_PREFIX.len() + 40);
    }

    #[test]
    fn test_cache_key_deterministic() {
        let options = FormatOptions {
            date_format: Some("%Y-%m-%d".to_string()),
            disable_image_link_previews: Some(true),
        };
        let a = cache_key(&CacheKeyData {
            url: "https://example.com/feed.xml",
            format_options: Some(&options),
            ..Default::default()
        })
        .unwrap();
        let b = cache_key(&CacheKeyData {
            url: "https://example.com/feed.xml",
            format_options: Some(&options.clone()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_cache_key_empty_options_match_absent_options() {
        let empty = FormatOptions::default();
        let with_empty = cache_key(&CacheKeyData {
            url: "https://example.com/feed.xml",
            format_options: Some(&empty),
            external_feed_properties: Some(&[]),
            ..Default::default()
        })
        .unwrap();
        let without = cache_key(&CacheKeyData {
            url: "https://example.com/feed.xml",
            ..Default::default()
        })
        .unwrap();
        assert_eq!(with_empty, without);
    }

    #[test]
    fn test_cache_key_lookup_details_reduced_to_key() {
        let a = RequestLookupDetails {
            key: "scope-1".to_string(),
            url: Some("https://proxy.example.com/a".to_string()),
        };
        let b = RequestLookupDetails {
            key: "scope-1".to_string(),
            url: Some("https://proxy.example.com/b".to_string()),
        };
        let key_a = cache_key(&CacheKeyData {
            url: "https://example.com/feed.xml",
            request_lookup_details: Some(&a),
            ..Default::default()
        })
        .unwrap();
        let key_b = cache_key(&CacheKeyData {
            url: "https://example.com/feed.xml",
            request_lookup_details: Some(&b),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(key_a, key_b);
    }

    #[test]
    fn test_cache_key_differs_by_url() {
        let a = cache_key(&CacheKeyData {
            url: "https://example.com/a.xml",
            ..Default::default()
        })
        .unwrap();
        let b = cache_key(&CacheKeyData {
            url: "https://example.com/b.xml",
            ..Default::default()
        })
        .unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_article_cache_round_trip() {
        let store = Arc::new(MemoryCacheStore::new());
        let cache = ArticleCache::new(store);
        let data = CacheKeyData {
            url: "https://example.com/feed.xml",
            ..Default::default()
        };

        assert!(!cache.exists(&data).await.unwrap());
        assert_eq!(cache.get(&data).await.unwrap(), None);

        let articles = vec![article("a")];
        cache.set(&data, &articles, false).await.unwrap();

        assert!(cache.exists(&data).await.unwrap());
        assert_eq!(cache.get(&data).await.unwrap(), Some(articles));

        cache.invalidate(&data).await.unwrap();
        assert!(!cache.exists(&data).await.unwrap());
    }
}
