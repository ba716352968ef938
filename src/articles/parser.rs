//! Streaming feed parsing with a time budget.
//!
//! Wraps the RSS/Atom parser: items are accumulated off the async
//! runtime, a timeout bounds the whole parse, and parse failures are
//! classified so the orchestrator can tell "those bytes are not a feed"
//! apart from everything else.

use std::sync::Arc;
use std::time::Duration;

use feed_rs::model::Entry;

use crate::articles::builder::ArticleBuilder;
use crate::articles::flatten::{FlattenOptions, Flattener};
use crate::articles::types::Article;
use crate::config::ParserConfig;
use crate::{RelayError, Result};

/// Parses feed XML into entries and articles.
#[derive(Clone)]
pub struct FeedParser {
    flattener: Arc<dyn Flattener>,
    timeout: Duration,
    max_injection_article_count: usize,
    injection_batch_size: usize,
    injection_batch_pause: Duration,
}

impl FeedParser {
    /// Create a parser with default limits.
    pub fn new(flattener: Arc<dyn Flattener>) -> Self {
        Self::with_config(flattener, &ParserConfig::default())
    }

    /// Create a parser with configured limits.
    pub fn with_config(flattener: Arc<dyn Flattener>, config: &ParserConfig) -> Self {
        Self {
            flattener,
            timeout: Duration::from_secs(config.timeout_secs),
            max_injection_article_count: config.max_injection_article_count,
            injection_batch_size: config.injection_batch_size.max(1),
            injection_batch_pause: Duration::from_millis(config.injection_batch_pause_ms),
        }
    }

    /// Override the parse timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Parse feed XML into raw entries.
    ///
    /// An empty feed (valid XML, zero items) is not an error.
    ///
    /// # Errors
    ///
    /// `InvalidFeed` when the bytes are not a feed, `ParseTimeout` when
    /// the time budget is exceeded, `Parse` for anything else.
    pub async fn parse_entries(&self, xml: &str) -> Result<Vec<Entry>> {
        let owned = xml.to_owned();
        let parse = tokio::task::spawn_blocking(move || feed_rs::parser::parse(owned.as_bytes()));

        match tokio::time::timeout(self.timeout, parse).await {
            Err(_) => Err(RelayError::ParseTimeout(self.timeout)),
            Ok(Err(join_err)) => Err(RelayError::Parse(join_err.to_string())),
            Ok(Ok(Ok(feed))) => Ok(feed.entries),
            Ok(Ok(Err(e))) => Err(classify_parse_failure(xml, e.to_string())),
        }
    }

    /// Parse feed XML all the way to built articles.
    pub async fn parse_articles(&self, xml: &str, opts: &FlattenOptions) -> Result<Vec<Article>> {
        let entries = self.parse_entries(xml).await?;
        let builder = ArticleBuilder::new(
            Arc::clone(&self.flattener),
            self.max_injection_article_count,
            self.injection_batch_size,
            self.injection_batch_pause,
        );
        builder.build(&entries, opts).await
    }
}

/// Map a parse failure to the error taxonomy.
///
/// The parser reports malformed input through its message; inputs with no
/// feed root at all are invalid regardless of how the parser worded it.
fn classify_parse_failure(xml: &str, message: String) -> RelayError {
    if !looks_like_feed(xml) {
        return RelayError::InvalidFeed(message);
    }
    let lower = message.to_lowercase();
    if lower.contains("not a feed")
        || lower.contains("no root")
        || lower.contains("no feed root")
        || lower.contains("unexpected end")
        || lower.contains("unexpected eof")
    {
        RelayError::InvalidFeed(message)
    } else {
        RelayError::Parse(message)
    }
}

/// Cheap sniff for an RSS/Atom/RDF root element.
fn looks_like_feed(xml: &str) -> bool {
    let lower = xml.to_lowercase();
    lower.contains("<rss") || lower.contains("<feed") || lower.contains("<rdf")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::articles::flatten::EntryFlattener;

    fn parser() -> FeedParser {
        FeedParser::new(Arc::new(EntryFlattener::new()))
    }

    fn rss_with_items(count: usize) -> String {
        let mut xml = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<rss version=\"2.0\"><channel><title>Feed</title>",
        );
        for i in 0..count {
            xml.push_str(&format!(
                "<item><guid>guid-{i}</guid><title>Article {i}</title></item>"
            ));
        }
        xml.push_str("</channel></rss>");
        xml
    }

    #[tokio::test]
    async fn test_parse_valid_rss() {
        let entries = parser().parse_entries(&rss_with_items(3)).await.unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].id, "guid-0");
    }

    #[tokio::test]
    async fn test_parse_empty_feed_is_ok() {
        let entries = parser().parse_entries(&rss_with_items(0)).await.unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn test_parse_html_is_invalid_feed() {
        let html = "<!DOCTYPE html><html><head><title>Page</title></head><body></body></html>";
        let err = parser().parse_entries(html).await.unwrap_err();
        assert!(err.is_invalid_feed(), "got: {err}");
    }

    #[tokio::test]
    async fn test_parse_plain_text_is_invalid_feed() {
        let err = parser().parse_entries("This is not XML").await.unwrap_err();
        assert!(err.is_invalid_feed(), "got: {err}");
    }

    #[tokio::test]
    async fn test_parse_timeout() {
        let parser = parser().with_timeout(Duration::from_millis(1));
        let big = rss_with_items(5000);
        let err = parser.parse_entries(&big).await.unwrap_err();
        assert!(matches!(err, RelayError::ParseTimeout(_)), "got: {err}");
    }

    #[test]
    fn test_looks_like_feed() {
        assert!(looks_like_feed("<rss version=\"2.0\"></rss>"));
        assert!(looks_like_feed("<feed xmlns=\"http://www.w3.org/2005/Atom\"/>"));
        assert!(!looks_like_feed("<html><body/></html>"));
    }

    #[test]
    fn test_classify_truncated_feed() {
        let err = classify_parse_failure(
            "<rss version=\"2.0\"><channel><item>",
            "Unexpected end of input".to_string(),
        );
        assert!(err.is_invalid_feed());
    }

    #[test]
    fn test_classify_other_errors_propagate() {
        let err = classify_parse_failure(
            "<rss version=\"2.0\"></rss>",
            "unsupported encoding".to_string(),
        );
        assert!(matches!(err, RelayError::Parse(_)));
    }
}
