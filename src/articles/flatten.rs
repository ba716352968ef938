//! Article flattening for feedrelay.
//!
//! A `Flattener` turns a parsed feed entry into the flat string-keyed map
//! that the rest of the pipeline hashes, compares, and caches. The bundled
//! `EntryFlattener` covers the common RSS/Atom fields and can enrich
//! articles with values scraped from the linked page.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feed_rs::model::Entry;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::articles::types::{Article, FlatValue};
use crate::Result;

/// Formatting options applied while flattening.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatOptions {
    /// strftime-style format applied to date fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_format: Option<String>,
    /// Suppress image link previews in downstream renderers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_image_link_previews: Option<bool>,
}

impl FormatOptions {
    /// Check whether every option is absent.
    pub fn is_empty(&self) -> bool {
        self.date_format.is_none() && self.disable_image_link_previews.is_none()
    }
}

/// A value scraped from the article's page and merged into the flat map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalFeedProperty {
    /// Key suffix under which the scraped value is stored.
    pub label: String,
    /// Flattened field holding the URL to fetch (usually `link`).
    pub source_field: String,
    /// CSS selector applied to the fetched page.
    pub css_selector: String,
}

/// Options passed through to the flattener.
#[derive(Debug, Clone, Default)]
pub struct FlattenOptions {
    /// Formatting options.
    pub format_options: FormatOptions,
    /// Whether dialect-specific extras (categories) are flattened.
    /// `None` behaves like `Some(true)`.
    pub use_parser_rules: Option<bool>,
    /// Page-scrape enrichments to apply during content injection.
    pub external_feed_properties: Vec<ExternalFeedProperty>,
}

/// Flattener output for one entry.
#[derive(Debug, Clone)]
pub struct FlattenedArticle {
    /// The flat field map (identity fields are attached by the builder).
    pub flattened: BTreeMap<String, FlatValue>,
    /// Whether this article wants the deferred content-injection pass.
    pub wants_injection: bool,
}

/// Turns feed entries into flat field maps.
#[async_trait]
pub trait Flattener: Send + Sync {
    /// Flatten one entry.
    fn flatten(&self, entry: &Entry, opts: &FlattenOptions) -> FlattenedArticle;

    /// Enrich a built article in place (deferred, possibly remote work).
    async fn inject_content(&self, article: &mut Article, opts: &FlattenOptions) -> Result<()>;
}

/// Default flattener for RSS/Atom entries.
pub struct EntryFlattener {
    client: reqwest::Client,
}

impl EntryFlattener {
    /// Create a flattener with its own HTTP client for page scraping.
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .user_agent("feedrelay/1.0 (Feed Poller)")
            .build()
            .unwrap_or_default();
        Self { client }
    }

    /// Create a flattener reusing an existing HTTP client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn apply_property(
        &self,
        article: &mut Article,
        property: &ExternalFeedProperty,
    ) -> Result<()> {
        let Some(url) = article
            .field_text(&property.source_field)
            .map(|v| v.into_owned())
        else {
            debug!(
                source_field = %property.source_field,
                "article has no source field for external property"
            );
            return Ok(());
        };

        let selector = match Selector::parse(&property.css_selector) {
            Ok(s) => s,
            Err(_) => {
                warn!(
                    selector = %property.css_selector,
                    "skipping external property with unparsable selector"
                );
                return Ok(());
            }
        };

        let response = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(url = %url, "external property fetch failed: {e}");
                return Ok(());
            }
        };
        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => {
                warn!(url = %url, "external property body read failed: {e}");
                return Ok(());
            }
        };

        let document = Html::parse_document(&body);
        let value = document
            .select(&selector)
            .map(|el| el.text().collect::<String>())
            .collect::<Vec<_>>()
            .join("\n");
        let value = value.trim();

        if !value.is_empty() {
            article.flattened.insert(
                format!("external::{}", property.label),
                FlatValue::Text(value.to_string()),
            );
        }
        Ok(())
    }
}

impl Default for EntryFlattener {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Flattener for EntryFlattener {
    fn flatten(&self, entry: &Entry, opts: &FlattenOptions) -> FlattenedArticle {
        let mut flattened = BTreeMap::new();

        if !entry.id.is_empty() {
            flattened.insert("guid".to_string(), FlatValue::Text(entry.id.clone()));
        }
        if let Some(title) = &entry.title {
            if !title.content.is_empty() {
                flattened.insert("title".to_string(), FlatValue::Text(title.content.clone()));
            }
        }
        // Summary first, full content body as the fallback
        let description = entry
            .summary
            .as_ref()
            .map(|t| t.content.clone())
            .or_else(|| entry.content.as_ref().and_then(|c| c.body.clone()));
        if let Some(description) = description {
            if !description.is_empty() {
                flattened.insert("description".to_string(), FlatValue::Text(description));
            }
        }
        if let Some(link) = entry.links.first() {
            flattened.insert("link".to_string(), FlatValue::Text(link.href.clone()));
        }
        if let Some(author) = entry.authors.first() {
            if !author.name.is_empty() {
                flattened.insert("author".to_string(), FlatValue::Text(author.name.clone()));
            }
        }

        let date_format = opts.format_options.date_format.as_deref();
        if let Some(published) = entry.published {
            flattened.insert(
                "pubdate".to_string(),
                FlatValue::Text(format_date(&published, date_format)),
            );
        }
        if let Some(date) = entry.updated.or(entry.published) {
            flattened.insert(
                "date".to_string(),
                FlatValue::Text(format_date(&date, date_format)),
            );
        }

        // Dialect extras unless parser rules are switched off
        if opts.use_parser_rules.unwrap_or(true) && !entry.categories.is_empty() {
            let categories = entry
                .categories
                .iter()
                .map(|c| c.label.clone().unwrap_or_else(|| c.term.clone()))
                .collect::<Vec<_>>()
                .join(",");
            if !categories.is_empty() {
                flattened.insert("categories".to_string(), FlatValue::Text(categories));
            }
        }

        FlattenedArticle {
            flattened,
            wants_injection: !opts.external_feed_properties.is_empty(),
        }
    }

    async fn inject_content(&self, article: &mut Article, opts: &FlattenOptions) -> Result<()> {
        for property in &opts.external_feed_properties {
            self.apply_property(article, property).await?;
        }
        Ok(())
    }
}

/// Format a date with the operator's format string, RFC 2822 otherwise.
///
/// An unparsable format string falls back rather than failing the pass.
fn format_date(dt: &DateTime<Utc>, format: Option<&str>) -> String {
    if let Some(format) = format {
        let mut buf = String::new();
        if write!(buf, "{}", dt.format(format)).is_ok() {
            return buf;
        }
    }
    dt.to_rfc2822()
}
