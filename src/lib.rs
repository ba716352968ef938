//! feedrelay - Feed polling and article delivery core
//!
//! Fetches RSS/Atom feeds, decides which articles are genuinely new (or
//! have mutated in fields the operator tracks), persists deduplication
//! state per feed, and emits the subset to deliver downstream.

pub mod articles;
pub mod cache;
pub mod config;
pub mod db;
pub mod delivery;
pub mod error;
pub mod fetch;
pub mod hash;
pub mod logging;
pub mod service;
pub mod store;

pub use articles::{
    Article, ArticleBuilder, CachedArticles, EntryFlattener, ExternalFeedProperty, FeedParser,
    FlatValue, FlattenOptions, Flattener, FormatOptions, IdCandidates, IdResolver, IdType,
    RawDates, ID_HASH_KEY, ID_KEY,
};
pub use cache::{
    cache_key, ArticleCache, CacheKeyData, CacheStore, MemoryCacheStore, CACHE_KEY_PREFIX,
    DEFAULT_CACHE_TTL,
};
pub use config::Config;
pub use db::{Database, DbPool, MIGRATIONS};
pub use delivery::{DateChecks, DeliveryRequest, DeliveryResult, DeliveryService};
pub use error::{RelayError, Result, StoreError};
pub use fetch::{
    html::extract_rss_from_html, FetchOptions, FetchResponse, Fetcher, HttpFetcher,
    RequestLookupDetails, MAX_FEED_SIZE,
};
pub use service::{ArticlesService, FetchArticlesOptions, FetchArticlesResult};
pub use store::{
    ComparisonRegistry, FieldCheck, FieldStore, NewFieldRow, SqliteComparisonRegistry,
    SqliteFieldStore, ID_FIELD_NAME,
};
