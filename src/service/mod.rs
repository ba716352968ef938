//! Article fetching service for feedrelay.
//!
//! Orchestrates cache, fetcher, and parser: a poll first consults the
//! compressed cache, then fetches and parses, writing successful results
//! back through the cache. Feeds that turn out to be HTML pages are
//! recovered via their advertised RSS link or the common `/feed` and
//! `/rss` paths.

use std::sync::Arc;

use futures::future::BoxFuture;
use rand::Rng;
use tracing::{debug, warn};
use url::Url;

use crate::articles::flatten::{ExternalFeedProperty, FlattenOptions, FormatOptions};
use crate::articles::parser::FeedParser;
use crate::articles::types::Article;
use crate::cache::{ArticleCache, CacheKeyData};
use crate::fetch::{html, FetchOptions, Fetcher, RequestLookupDetails};
use crate::{RelayError, Result};

/// Options for a fetch-articles request.
#[derive(Debug, Clone, Default)]
pub struct FetchArticlesOptions {
    /// Formatting options forwarded to the flattener.
    pub format_options: FormatOptions,
    /// Whether dialect-specific parser rules apply.
    pub use_parser_rules: Option<bool>,
    /// Page-scrape enrichments forwarded to the flattener.
    pub external_feed_properties: Vec<ExternalFeedProperty>,
    /// Out-of-band request keying for brokered fetchers.
    pub request_lookup_details: Option<RequestLookupDetails>,
    /// Try to recover a feed URL from an HTML response.
    pub find_rss_from_html: bool,
    /// Force a brokered fetcher to fetch even on a cache hit.
    pub execute_fetch: bool,
}

/// The outcome of a fetch-articles request.
#[derive(Debug, Clone)]
pub struct FetchArticlesResult {
    /// The parsed articles; absent while the fetch is still pending.
    pub output: Option<Vec<Article>>,
    /// The URL the articles were ultimately fetched from.
    pub url: String,
    /// Whether the HTML-link fallback was used to resolve the feed.
    pub attempted_to_resolve_from_html: bool,
}

/// Fetches and parses feed articles with caching.
#[derive(Clone)]
pub struct ArticlesService {
    fetcher: Arc<dyn Fetcher>,
    cache: ArticleCache,
    parser: FeedParser,
}

impl ArticlesService {
    /// Create a service over the given fetcher, cache, and parser.
    pub fn new(fetcher: Arc<dyn Fetcher>, cache: ArticleCache, parser: FeedParser) -> Self {
        Self {
            fetcher,
            cache,
            parser,
        }
    }

    /// The article cache, for direct cache operations.
    pub fn cache(&self) -> &ArticleCache {
        &self.cache
    }

    /// The cache identity of a request, for cache operations.
    pub fn cache_key_data<'a>(
        &self,
        url: &'a str,
        opts: &'a FetchArticlesOptions,
    ) -> CacheKeyData<'a> {
        CacheKeyData {
            url,
            format_options: Some(&opts.format_options),
            external_feed_properties: Some(&opts.external_feed_properties),
            request_lookup_details: opts.request_lookup_details.as_ref(),
        }
    }

    /// Fetch, parse, and cache the articles at a URL.
    ///
    /// A cache hit refreshes the entry's TTL and skips the fetcher. A
    /// fetcher response with no body is surfaced as `output: None`
    /// ("pending"). With `find_rss_from_html`, an HTML response is
    /// retried once against the feed URL it advertises.
    pub async fn fetch_feed_articles(
        &self,
        url: &str,
        opts: &FetchArticlesOptions,
    ) -> Result<FetchArticlesResult> {
        self.fetch_inner(url.to_string(), opts, true).await
    }

    /// `fetch_feed_articles` with `/feed` and `/rss` probes on invalid
    /// feeds. The original error is rethrown when every probe fails.
    pub async fn find_or_fetch_feed_articles(
        &self,
        url: &str,
        opts: &FetchArticlesOptions,
    ) -> Result<FetchArticlesResult> {
        match self.fetch_feed_articles(url, opts).await {
            Err(original) if original.is_invalid_feed() => {
                let Some(base) = origin_and_path(url) else {
                    return Err(original);
                };
                for suffix in ["/feed", "/rss"] {
                    let probe = format!("{base}{suffix}");
                    debug!(url, %probe, "probing alternate feed path");
                    match self.fetch_feed_articles(&probe, opts).await {
                        Ok(result) => return Ok(result),
                        Err(probe_err) => {
                            debug!(%probe, "alternate feed path failed: {probe_err}")
                        }
                    }
                }
                Err(original)
            }
            other => other,
        }
    }

    /// Fetch a single article by its id.
    ///
    /// # Errors
    ///
    /// `PendingRequest` when the fetch has no body yet,
    /// `ArticleNotFound` when no article carries the id.
    pub async fn fetch_feed_article(
        &self,
        url: &str,
        article_id: &str,
        opts: &FetchArticlesOptions,
    ) -> Result<Article> {
        let result = self.fetch_feed_articles(url, opts).await?;
        let articles = result.output.ok_or(RelayError::PendingRequest)?;
        articles
            .into_iter()
            .find(|a| a.id() == article_id)
            .ok_or(RelayError::ArticleNotFound)
    }

    /// Fetch a uniformly random article, `None` for an empty feed.
    pub async fn fetch_random_feed_article(
        &self,
        url: &str,
        opts: &FetchArticlesOptions,
    ) -> Result<Option<Article>> {
        let result = self.fetch_feed_articles(url, opts).await?;
        let articles = result.output.ok_or(RelayError::PendingRequest)?;
        if articles.is_empty() {
            return Ok(None);
        }
        let index = rand::thread_rng().gen_range(0..articles.len());
        Ok(articles.into_iter().nth(index))
    }

    fn fetch_inner<'a>(
        &'a self,
        url: String,
        opts: &'a FetchArticlesOptions,
        allow_html_fallback: bool,
    ) -> BoxFuture<'a, Result<FetchArticlesResult>> {
        Box::pin(async move {
            let key_data = CacheKeyData {
                url: &url,
                format_options: Some(&opts.format_options),
                external_feed_properties: Some(&opts.external_feed_properties),
                request_lookup_details: opts.request_lookup_details.as_ref(),
            };
            if let Some(articles) = self.cache.get(&key_data).await? {
                self.cache.refresh_ttl(&key_data).await?;
                debug!(%url, "serving articles from cache");
                return Ok(FetchArticlesResult {
                    output: Some(articles),
                    url,
                    attempted_to_resolve_from_html: false,
                });
            }

            let fetch_opts = FetchOptions {
                execute_fetch_if_not_in_cache: true,
                execute_fetch: opts.execute_fetch,
                lookup_details: opts.request_lookup_details.clone(),
            };
            let fetch_url = opts
                .request_lookup_details
                .as_ref()
                .and_then(|d| d.url.as_deref())
                .unwrap_or(&url);
            let response = self.fetcher.fetch(fetch_url, &fetch_opts).await?;
            let Some(body) = response.body else {
                return Ok(FetchArticlesResult {
                    output: None,
                    url,
                    attempted_to_resolve_from_html: false,
                });
            };

            let flatten_opts = FlattenOptions {
                format_options: opts.format_options.clone(),
                use_parser_rules: opts.use_parser_rules,
                external_feed_properties: opts.external_feed_properties.clone(),
            };
            match self.parser.parse_articles(&body, &flatten_opts).await {
                Ok(articles) => {
                    self.cache.set(&key_data, &articles, false).await?;
                    Ok(FetchArticlesResult {
                        output: Some(articles),
                        url,
                        attempted_to_resolve_from_html: false,
                    })
                }
                Err(e)
                    if e.is_invalid_feed() && opts.find_rss_from_html && allow_html_fallback =>
                {
                    match html::extract_rss_from_html(&body, &url) {
                        Some(feed_url) => {
                            warn!(%url, %feed_url, "resolving feed from HTML link");
                            crate::logging::metric("html_fallback_attempts", 1);
                            let mut result = self.fetch_inner(feed_url, opts, false).await?;
                            result.attempted_to_resolve_from_html = true;
                            Ok(result)
                        }
                        None => Err(e),
                    }
                }
                Err(e) => Err(e),
            }
        })
    }
}

/// `origin + pathname` with the trailing slash stripped.
fn origin_and_path(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let base = format!("{}{}", parsed.origin().ascii_serialization(), parsed.path());
    Some(base.trim_end_matches('/').to_string())
}
