//! SQLite-backed field store and comparison registry.
//!
//! Bulk writes go through a single multi-row `INSERT ... ON CONFLICT DO
//! NOTHING`, which makes each persist call atomic and absorbs collisions
//! with concurrent writers.

use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite};

use crate::db::DbPool;
use crate::store::{ComparisonRegistry, FieldCheck, FieldStore, NewFieldRow, StoreResult};
use crate::store::ID_FIELD_NAME;
use crate::StoreError;

/// Field store over the shared SQLite pool.
#[derive(Clone)]
pub struct SqliteFieldStore {
    pool: DbPool,
}

impl SqliteFieldStore {
    /// Create a store over the given pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FieldStore for SqliteFieldStore {
    async fn persist(&self, rows: &[NewFieldRow]) -> StoreResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut qb = QueryBuilder::<Sqlite>::new(
            "INSERT INTO article_field_values (feed_id, field_name, field_hashed_value) ",
        );
        qb.push_values(rows, |mut b, row| {
            b.push_bind(&row.feed_id)
                .push_bind(&row.field_name)
                .push_bind(&row.field_hashed_value);
        });
        qb.push(" ON CONFLICT DO NOTHING");
        qb.build()
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)?;
        Ok(())
    }

    async fn find_id_hashes(
        &self,
        feed_id: &str,
        candidate_hashes: &[String],
    ) -> StoreResult<Vec<String>> {
        if candidate_hashes.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT field_hashed_value FROM article_field_values WHERE feed_id = ",
        );
        qb.push_bind(feed_id);
        qb.push(" AND field_name = ");
        qb.push_bind(ID_FIELD_NAME);
        qb.push(" AND field_hashed_value IN (");
        {
            let mut sep = qb.separated(", ");
            for hash in candidate_hashes {
                sep.push_bind(hash);
            }
        }
        qb.push(")");

        let hashes = qb
            .build_query_scalar::<String>()
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from)?;
        Ok(hashes)
    }

    async fn some_fields_exist(&self, feed_id: &str, fields: &[FieldCheck]) -> StoreResult<bool> {
        if fields.is_empty() {
            return Ok(false);
        }
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT EXISTS(SELECT 1 FROM article_field_values WHERE feed_id = ",
        );
        qb.push_bind(feed_id);
        qb.push(" AND (");
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                qb.push(" OR ");
            }
            qb.push("(field_name = ");
            qb.push_bind(&field.field_name);
            qb.push(" AND field_hashed_value = ");
            qb.push_bind(&field.field_hashed_value);
            qb.push(")");
        }
        qb.push("))");

        let exists = qb
            .build_query_scalar::<bool>()
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::from)?;
        Ok(exists)
    }

    async fn has_prior_articles(&self, feed_id: &str) -> StoreResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM article_field_values WHERE feed_id = $1 AND field_name = $2)",
        )
        .bind(feed_id)
        .bind(ID_FIELD_NAME)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(exists)
    }

    async fn delete_all_for_feed(&self, feed_id: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM article_field_values WHERE feed_id = $1")
            .bind(feed_id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)?;
        Ok(())
    }
}

/// Comparison registry over the shared SQLite pool.
#[derive(Clone)]
pub struct SqliteComparisonRegistry {
    pool: DbPool,
}

impl SqliteComparisonRegistry {
    /// Create a registry over the given pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ComparisonRegistry for SqliteComparisonRegistry {
    async fn find(&self, feed_id: &str, field_names: &[String]) -> StoreResult<Vec<String>> {
        if field_names.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb =
            QueryBuilder::<Sqlite>::new("SELECT field_name FROM feed_comparisons WHERE feed_id = ");
        qb.push_bind(feed_id);
        qb.push(" AND field_name IN (");
        {
            let mut sep = qb.separated(", ");
            for name in field_names {
                sep.push_bind(name);
            }
        }
        qb.push(")");

        let names = qb
            .build_query_scalar::<String>()
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from)?;
        Ok(names)
    }

    async fn persist(&self, feed_id: &str, field_names: &[String]) -> StoreResult<()> {
        if field_names.is_empty() {
            return Ok(());
        }
        let mut qb =
            QueryBuilder::<Sqlite>::new("INSERT INTO feed_comparisons (feed_id, field_name) ");
        qb.push_values(field_names, |mut b, name| {
            b.push_bind(feed_id).push_bind(name);
        });
        qb.push(" ON CONFLICT DO NOTHING");
        qb.build()
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)?;
        Ok(())
    }

    async fn delete_all_for_feed(&self, feed_id: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM feed_comparisons WHERE feed_id = $1")
            .bind(feed_id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)?;
        Ok(())
    }
}
