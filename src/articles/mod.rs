//! Article parsing and construction for feedrelay.
//!
//! This module turns feed XML into finished articles: identity
//! resolution, flattening, and the content-injection pass.

pub mod builder;
pub mod flatten;
pub mod id;
pub mod parser;
pub mod types;

pub use builder::ArticleBuilder;
pub use flatten::{
    EntryFlattener, ExternalFeedProperty, FlattenOptions, FlattenedArticle, Flattener,
    FormatOptions,
};
pub use id::{IdCandidates, IdResolver, IdType};
pub use parser::FeedParser;
pub use types::{Article, CachedArticles, FlatValue, RawDates, ID_HASH_KEY, ID_KEY};
