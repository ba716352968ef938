//! Delivery planning for feedrelay.
//!
//! Decides which parsed articles actually go downstream: new articles
//! that survive blocking comparisons, plus previously-seen articles that
//! mutated in a tracked passing field.

pub mod planner;

use chrono::{DateTime, Utc};

use crate::articles::flatten::{ExternalFeedProperty, FormatOptions};
use crate::articles::types::Article;

pub use planner::DeliveryService;

/// Date placeholders consulted when none are configured.
const DEFAULT_DATE_PLACEHOLDERS: [&str; 2] = ["date", "pubdate"];

/// Age-based delivery filtering.
#[derive(Debug, Clone, Default)]
pub struct DateChecks {
    /// Maximum article age in milliseconds; absent disables the filter.
    pub old_article_date_diff_ms_threshold: Option<i64>,
    /// Placeholders evaluated against the article's raw dates, in order.
    /// Defaults to `date`, then `pubdate`.
    pub date_placeholder_references: Option<Vec<String>>,
}

/// One delivery-planning request.
#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    /// Feed whose dedup state scopes this pass.
    pub feed_id: String,
    /// The fetched feed XML.
    pub feed_xml: String,
    /// Field names whose repetition suppresses delivery of new articles.
    pub blocking_comparisons: Vec<String>,
    /// Field names whose novel values re-deliver seen articles.
    pub passing_comparisons: Vec<String>,
    /// Formatting options forwarded to the flattener.
    pub format_options: FormatOptions,
    /// Whether dialect-specific parser rules apply.
    pub use_parser_rules: Option<bool>,
    /// Page-scrape enrichments forwarded to the flattener.
    pub external_feed_properties: Vec<ExternalFeedProperty>,
    /// Age-based delivery filtering.
    pub date_checks: Option<DateChecks>,
    /// Elevated logging for this pass.
    pub debug: bool,
}

impl DeliveryRequest {
    /// Create a request with no comparisons and default options.
    pub fn new(feed_id: impl Into<String>, feed_xml: impl Into<String>) -> Self {
        Self {
            feed_id: feed_id.into(),
            feed_xml: feed_xml.into(),
            blocking_comparisons: Vec::new(),
            passing_comparisons: Vec::new(),
            format_options: FormatOptions::default(),
            use_parser_rules: None,
            external_feed_properties: Vec::new(),
            date_checks: None,
            debug: false,
        }
    }

    /// Set the blocking comparisons.
    pub fn with_blocking_comparisons(mut self, names: Vec<String>) -> Self {
        self.blocking_comparisons = names;
        self
    }

    /// Set the passing comparisons.
    pub fn with_passing_comparisons(mut self, names: Vec<String>) -> Self {
        self.passing_comparisons = names;
        self
    }

    /// Set the date checks.
    pub fn with_date_checks(mut self, checks: DateChecks) -> Self {
        self.date_checks = Some(checks);
        self
    }

    /// Enable elevated logging for this pass.
    pub fn with_debug(mut self) -> Self {
        self.debug = true;
        self
    }
}

/// The outcome of one delivery-planning pass.
#[derive(Debug, Clone)]
pub struct DeliveryResult {
    /// Every article parsed from the XML, in emission order.
    pub all_articles: Vec<Article>,
    /// The subset to deliver, oldest first.
    pub articles_to_deliver: Vec<Article>,
}

/// Apply the date-check filter to a delivery candidate list.
///
/// Without a threshold everything passes. With one, the first placeholder
/// that parses as a date decides; articles with no valid date are dropped.
pub(crate) fn filter_by_date_checks(
    articles: Vec<Article>,
    checks: Option<&DateChecks>,
    now: DateTime<Utc>,
) -> Vec<Article> {
    let Some(checks) = checks else {
        return articles;
    };
    let Some(threshold_ms) = checks.old_article_date_diff_ms_threshold else {
        return articles;
    };

    articles
        .into_iter()
        .filter(|article| {
            let date = match &checks.date_placeholder_references {
                Some(placeholders) => first_valid_date(article, placeholders.iter().map(String::as_str)),
                None => first_valid_date(article, DEFAULT_DATE_PLACEHOLDERS.into_iter()),
            };
            match date {
                Some(date) => (now - date).num_milliseconds() <= threshold_ms,
                None => false,
            }
        })
        .collect()
}

fn first_valid_date<'a>(
    article: &Article,
    placeholders: impl Iterator<Item = &'a str>,
) -> Option<DateTime<Utc>> {
    for placeholder in placeholders {
        if let Some(value) = article.raw.get(placeholder) {
            if let Some(date) = parse_date(value) {
                return Some(date);
            }
        }
    }
    None
}

fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .or_else(|_| DateTime::parse_from_rfc2822(value))
        .ok()
        .map(|d| d.with_timezone(&Utc))
}
