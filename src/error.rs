//! Error types for feedrelay.

use std::time::Duration;

use thiserror::Error;

/// Errors raised by the article store and comparison registry.
///
/// Unique-constraint collisions are a distinct kind so that write paths
/// can recognize and absorb them when a concurrent worker wins the race.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Another writer already inserted the same row.
    #[error("unique constraint violation: {0}")]
    UniqueViolation(String),

    /// Any other database failure.
    #[error("database error: {0}")]
    Database(String),
}

impl StoreError {
    /// Check whether this error is a duplicate-row collision.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, StoreError::UniqueViolation(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::UniqueViolation(db.to_string())
            }
            _ => StoreError::Database(e.to_string()),
        }
    }
}

/// Common error type for feedrelay.
#[derive(Error, Debug)]
pub enum RelayError {
    /// The fetched bytes are not an RSS/Atom feed.
    #[error("invalid feed: {0}")]
    InvalidFeed(String),

    /// The feed parser exceeded its time budget.
    #[error("feed parse timed out after {0:?}")]
    ParseTimeout(Duration),

    /// No identity field is present and non-empty on every feed item.
    #[error("no usable id field found across feed items")]
    NoIdType,

    /// An article came out of the build pass without an id hash.
    #[error("article is missing its id hash")]
    MissingIdHash,

    /// The fetcher has no response body yet; the request is in flight.
    #[error("feed request is still pending")]
    PendingRequest,

    /// A single-article lookup found no matching article.
    #[error("feed article not found")]
    ArticleNotFound,

    /// Feed parsing failed in a way that is not `InvalidFeed`.
    #[error("feed parse error: {0}")]
    Parse(String),

    /// Fetcher failure.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// Cache layer failure.
    #[error("cache error: {0}")]
    Cache(String),

    /// Store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// HTTP client failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<sqlx::Error> for RelayError {
    fn from(e: sqlx::Error) -> Self {
        RelayError::Store(StoreError::from(e))
    }
}

impl RelayError {
    /// Check whether this error means "those bytes are not a feed".
    ///
    /// The orchestrator dispatches its HTML-link fallback and the
    /// `/feed` / `/rss` probes on this kind.
    pub fn is_invalid_feed(&self) -> bool {
        matches!(self, RelayError::InvalidFeed(_))
    }
}

/// Result type alias for feedrelay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
