//! SQLite migrations for the deduplication state.
//!
//! Two tables back the delivery pipeline: `article_field_values` holds
//! every hashed field value ever persisted per feed, and
//! `feed_comparisons` records which comparison names are active. The
//! `schema_version` table (managed by [`crate::db::Database`]) tracks
//! how far a given database has advanced through this list.

/// Ordered migration scripts; index N brings the schema to version N+1.
pub const MIGRATIONS: &[&str] = &[
    // v1: field-hash table plus the comparison registry
    r#"
-- One row per (feed, field, hashed value) ever observed and persisted.
-- The unique constraint is what absorbs concurrent duplicate inserts.
CREATE TABLE article_field_values (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    feed_id             TEXT NOT NULL,
    field_name          TEXT NOT NULL,
    field_hashed_value  TEXT NOT NULL,
    created_at          TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (feed_id, field_name, field_hashed_value)
);

CREATE INDEX idx_field_values_feed_field
    ON article_field_values(feed_id, field_name);

-- Comparison names activated per feed. Field-value rows for an
-- activated (feed, field) pair are authoritative for dedup decisions.
CREATE TABLE feed_comparisons (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    feed_id     TEXT NOT NULL,
    field_name  TEXT NOT NULL,
    created_at  TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (feed_id, field_name)
);

CREATE INDEX idx_feed_comparisons_feed ON feed_comparisons(feed_id);
"#,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_schema_creates_dedup_tables() {
        let initial = MIGRATIONS[0];
        assert!(initial.contains("CREATE TABLE article_field_values"));
        assert!(initial.contains("CREATE TABLE feed_comparisons"));
    }

    #[test]
    fn test_dedup_tables_carry_unique_constraints() {
        // Collision absorption depends on these tuples being unique
        let initial = MIGRATIONS[0];
        assert!(initial.contains("UNIQUE (feed_id, field_name, field_hashed_value)"));
        assert!(initial.contains("UNIQUE (feed_id, field_name)"));
    }

    #[test]
    fn test_presence_probes_have_an_index() {
        assert!(MIGRATIONS[0].contains("idx_field_values_feed_field"));
    }

    #[test]
    fn test_no_migration_is_blank() {
        for (i, migration) in MIGRATIONS.iter().enumerate() {
            assert!(!migration.trim().is_empty(), "migration {} is blank", i + 1);
        }
    }
}
