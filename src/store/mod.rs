//! Deduplication state contracts for feedrelay.
//!
//! Delivery decisions are grounded in two per-feed stores: the field
//! store holds hashed article field values, and the comparison registry
//! records which comparison field names are currently tracked.

pub mod sqlite;

use async_trait::async_trait;

use crate::StoreError;

pub use sqlite::{SqliteComparisonRegistry, SqliteFieldStore};

/// Field name under which article identity hashes are stored.
pub const ID_FIELD_NAME: &str = "id";

/// Result alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A field row to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFieldRow {
    /// Owning feed.
    pub feed_id: String,
    /// Field name (`id` for identity rows).
    pub field_name: String,
    /// Lowercase hex SHA-1 of the field's value.
    pub field_hashed_value: String,
}

impl NewFieldRow {
    /// Create a row for an arbitrary field.
    pub fn new(
        feed_id: impl Into<String>,
        field_name: impl Into<String>,
        field_hashed_value: impl Into<String>,
    ) -> Self {
        Self {
            feed_id: feed_id.into(),
            field_name: field_name.into(),
            field_hashed_value: field_hashed_value.into(),
        }
    }

    /// Create an identity row.
    pub fn id_row(feed_id: impl Into<String>, id_hash: impl Into<String>) -> Self {
        Self::new(feed_id, ID_FIELD_NAME, id_hash)
    }
}

/// A (field name, hashed value) pair to probe for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldCheck {
    /// Field name.
    pub field_name: String,
    /// Lowercase hex SHA-1 of the field's value.
    pub field_hashed_value: String,
}

impl FieldCheck {
    /// Create a probe pair.
    pub fn new(field_name: impl Into<String>, field_hashed_value: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            field_hashed_value: field_hashed_value.into(),
        }
    }
}

/// Partitioned store of hashed article field values.
#[async_trait]
pub trait FieldStore: Send + Sync {
    /// Persist rows atomically; rows that already exist are absorbed.
    async fn persist(&self, rows: &[NewFieldRow]) -> StoreResult<()>;

    /// Of the candidate id hashes, return those already stored for the feed.
    async fn find_id_hashes(
        &self,
        feed_id: &str,
        candidate_hashes: &[String],
    ) -> StoreResult<Vec<String>>;

    /// Whether any of the given (field, hashed value) pairs exist for the feed.
    async fn some_fields_exist(&self, feed_id: &str, fields: &[FieldCheck]) -> StoreResult<bool>;

    /// Whether any identity rows are stored for the feed at all.
    async fn has_prior_articles(&self, feed_id: &str) -> StoreResult<bool>;

    /// Delete every row of the feed.
    async fn delete_all_for_feed(&self, feed_id: &str) -> StoreResult<()>;
}

/// Registry of comparison field names activated per feed.
#[async_trait]
pub trait ComparisonRegistry: Send + Sync {
    /// Of the given names, return those already activated for the feed.
    async fn find(&self, feed_id: &str, field_names: &[String]) -> StoreResult<Vec<String>>;

    /// Activate names for the feed; already-activated names are absorbed.
    async fn persist(&self, feed_id: &str, field_names: &[String]) -> StoreResult<()>;

    /// Delete every registration of the feed.
    async fn delete_all_for_feed(&self, feed_id: &str) -> StoreResult<()>;
}
