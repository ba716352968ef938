//! The delivery-planning algorithm.
//!
//! A pass parses the XML, partitions articles into new and seen by id
//! hash, applies blocking and passing comparisons against the persisted
//! field hashes, persists this pass's state, and emits the delivery set
//! oldest-first.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::articles::flatten::FlattenOptions;
use crate::articles::parser::FeedParser;
use crate::articles::types::Article;
use crate::delivery::{filter_by_date_checks, DeliveryRequest, DeliveryResult};
use crate::hash::sha1_hex;
use crate::store::{ComparisonRegistry, FieldCheck, FieldStore, NewFieldRow};
use crate::Result;

/// Plans article deliveries and owns the feed's deduplication state.
#[derive(Clone)]
pub struct DeliveryService {
    parser: FeedParser,
    field_store: Arc<dyn FieldStore>,
    registry: Arc<dyn ComparisonRegistry>,
}

impl DeliveryService {
    /// Create a service over the given parser and stores.
    pub fn new(
        parser: FeedParser,
        field_store: Arc<dyn FieldStore>,
        registry: Arc<dyn ComparisonRegistry>,
    ) -> Self {
        Self {
            parser,
            field_store,
            registry,
        }
    }

    /// Run one delivery-planning pass over fetched feed XML.
    ///
    /// The first-ever pass for a feed seeds the store and delivers
    /// nothing, so adding a feed never floods with its backlog.
    pub async fn get_articles_to_deliver_from_xml(
        &self,
        request: &DeliveryRequest,
    ) -> Result<DeliveryResult> {
        let flatten_opts = FlattenOptions {
            format_options: request.format_options.clone(),
            use_parser_rules: request.use_parser_rules,
            external_feed_properties: request.external_feed_properties.clone(),
        };
        let articles = self
            .parser
            .parse_articles(&request.feed_xml, &flatten_opts)
            .await?;
        if articles.is_empty() {
            return Ok(DeliveryResult {
                all_articles: Vec::new(),
                articles_to_deliver: Vec::new(),
            });
        }

        let feed_id = request.feed_id.as_str();
        let comparisons = union_preserving(
            &request.blocking_comparisons,
            &request.passing_comparisons,
        );

        let prior_articles_stored = self.field_store.has_prior_articles(feed_id).await?;
        if !prior_articles_stored {
            return self.seed_pass(feed_id, articles, &comparisons).await;
        }

        // Partition into new and seen by stored id hash
        let id_hashes: Vec<String> = articles
            .iter()
            .map(|a| a.id_hash().to_string())
            .collect();
        let stored_hashes: HashSet<String> = self
            .field_store
            .find_id_hashes(feed_id, &id_hashes)
            .await?
            .into_iter()
            .collect();
        let (new_articles, seen_articles): (Vec<&Article>, Vec<&Article>) = articles
            .iter()
            .partition(|a| !stored_hashes.contains(a.id_hash()));

        if request.debug {
            info!(
                feed_id,
                total = articles.len(),
                new = new_articles.len(),
                seen = seen_articles.len(),
                "partitioned articles by id hash"
            );
        }

        // Split requested comparisons into activated and not-yet-activated
        let stored_comparisons: HashSet<String> = self
            .registry
            .find(feed_id, &comparisons)
            .await?
            .into_iter()
            .collect();
        let unstored_comparisons: Vec<String> = comparisons
            .iter()
            .filter(|name| !stored_comparisons.contains(*name))
            .cloned()
            .collect();
        let activated_blocking: Vec<String> = request
            .blocking_comparisons
            .iter()
            .filter(|name| stored_comparisons.contains(*name))
            .cloned()
            .collect();
        let activated_passing: Vec<String> = request
            .passing_comparisons
            .iter()
            .filter(|name| stored_comparisons.contains(*name))
            .cloned()
            .collect();

        let articles_past_blocks = self
            .check_blocking(
                feed_id,
                &new_articles,
                &request.blocking_comparisons,
                &activated_blocking,
                request.debug,
            )
            .await?;
        let articles_passed_comparisons = self
            .check_passing(feed_id, &seen_articles, &activated_passing, request.debug)
            .await?;

        // Staged persistence; collisions with concurrent workers are absorbed
        if !new_articles.is_empty() {
            let mut rows = Vec::new();
            for article in &new_articles {
                rows.push(NewFieldRow::id_row(feed_id, article.id_hash()));
                rows.extend(field_rows_for(feed_id, article, stored_comparisons.iter()));
            }
            self.persist_field_rows(rows).await?;
        }
        if !articles_passed_comparisons.is_empty() {
            // Seen articles keep their id rows; only the mutated
            // comparison values are recorded
            let mut rows = Vec::new();
            for article in &articles_passed_comparisons {
                rows.extend(field_rows_for(feed_id, article, activated_passing.iter()));
            }
            self.persist_field_rows(rows).await?;
        }
        if !unstored_comparisons.is_empty() {
            // Activation backfill: record every current article's values
            // first so the activation itself never triggers deliveries
            let mut rows = Vec::new();
            for article in &articles {
                rows.extend(field_rows_for(feed_id, article, unstored_comparisons.iter()));
            }
            self.persist_field_rows(rows).await?;
            self.registry
                .persist(feed_id, &unstored_comparisons)
                .await
                .map_err(crate::RelayError::Store)?;
            debug!(feed_id, comparisons = ?unstored_comparisons, "activated comparisons");
        }

        // Feeds list newest first; deliveries go out oldest first
        let mut articles_to_deliver: Vec<Article> = articles_past_blocks
            .into_iter()
            .chain(articles_passed_comparisons)
            .cloned()
            .collect();
        articles_to_deliver.reverse();
        let articles_to_deliver =
            filter_by_date_checks(articles_to_deliver, request.date_checks.as_ref(), Utc::now());
        if !articles_to_deliver.is_empty() {
            crate::logging::metric("articles_delivered", articles_to_deliver.len() as u64);
        }

        Ok(DeliveryResult {
            all_articles: articles,
            articles_to_deliver,
        })
    }

    /// Drop every piece of dedup state held for a feed.
    pub async fn delete_info_for_feed(&self, feed_id: &str) -> Result<()> {
        self.field_store
            .delete_all_for_feed(feed_id)
            .await
            .map_err(crate::RelayError::Store)?;
        self.registry
            .delete_all_for_feed(feed_id)
            .await
            .map_err(crate::RelayError::Store)?;
        Ok(())
    }

    /// First-ever poll: persist everything, deliver nothing.
    async fn seed_pass(
        &self,
        feed_id: &str,
        articles: Vec<Article>,
        comparisons: &[String],
    ) -> Result<DeliveryResult> {
        debug!(
            feed_id,
            count = articles.len(),
            "seeding feed with no prior state"
        );
        let mut rows = Vec::new();
        for article in &articles {
            rows.push(NewFieldRow::id_row(feed_id, article.id_hash()));
            rows.extend(field_rows_for(feed_id, article, comparisons.iter()));
        }
        self.persist_field_rows(rows).await?;

        Ok(DeliveryResult {
            all_articles: articles,
            articles_to_deliver: Vec::new(),
        })
    }

    /// Keep the new articles whose activated blocking-field values have
    /// never been seen for this feed.
    async fn check_blocking<'a>(
        &self,
        feed_id: &str,
        new_articles: &[&'a Article],
        blocking_comparisons: &[String],
        activated_blocking: &[String],
        debug_pass: bool,
    ) -> Result<Vec<&'a Article>> {
        // No blocking comparisons requested, or none activated yet:
        // every new article passes
        if blocking_comparisons.is_empty() || activated_blocking.is_empty() {
            return Ok(new_articles.to_vec());
        }

        let mut passed = Vec::new();
        for article in new_articles {
            let checks = field_checks_for(article, activated_blocking.iter());
            if checks.is_empty() {
                passed.push(*article);
                continue;
            }
            let blocked = self.field_store.some_fields_exist(feed_id, &checks).await?;
            if blocked {
                if debug_pass {
                    info!(feed_id, id = article.id(), "article blocked by comparison");
                } else {
                    debug!(feed_id, id = article.id(), "article blocked by comparison");
                }
            } else {
                passed.push(*article);
            }
        }
        Ok(passed)
    }

    /// Keep the seen articles carrying a never-seen value in an activated
    /// passing field.
    async fn check_passing<'a>(
        &self,
        feed_id: &str,
        seen_articles: &[&'a Article],
        activated_passing: &[String],
        debug_pass: bool,
    ) -> Result<Vec<&'a Article>> {
        if activated_passing.is_empty() {
            return Ok(Vec::new());
        }

        let mut passed = Vec::new();
        for article in seen_articles {
            let checks = field_checks_for(article, activated_passing.iter());
            // An article with no value in any tracked field has nothing
            // novel to say
            if checks.is_empty() {
                continue;
            }
            let seen_before = self.field_store.some_fields_exist(feed_id, &checks).await?;
            if !seen_before {
                if debug_pass {
                    info!(feed_id, id = article.id(), "seen article passed comparison");
                }
                passed.push(*article);
            }
        }
        Ok(passed)
    }

    /// Persist field rows, absorbing unique-constraint collisions.
    async fn persist_field_rows(&self, rows: Vec<NewFieldRow>) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        match self.field_store.persist(&rows).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_unique_violation() => {
                warn!("concurrent writer already persisted field rows: {e}");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Rows for the article's values in the given fields.
fn field_rows_for<'a>(
    feed_id: &str,
    article: &Article,
    field_names: impl Iterator<Item = &'a String>,
) -> Vec<NewFieldRow> {
    field_names
        .filter_map(|name| {
            article
                .field_text(name)
                .map(|value| NewFieldRow::new(feed_id, name.clone(), sha1_hex(&value)))
        })
        .collect()
}

/// Probe pairs for the article's values in the given fields.
fn field_checks_for<'a>(
    article: &Article,
    field_names: impl Iterator<Item = &'a String>,
) -> Vec<FieldCheck> {
    field_names
        .filter_map(|name| {
            article
                .field_text(name)
                .map(|value| FieldCheck::new(name.clone(), sha1_hex(&value)))
        })
        .collect()
}

/// Order-preserving union of two comparison name lists.
fn union_preserving(a: &[String], b: &[String]) -> Vec<String> {
    let mut union: Vec<String> = Vec::with_capacity(a.len() + b.len());
    for name in a.iter().chain(b.iter()) {
        if !union.contains(name) {
            union.push(name.clone());
        }
    }
    union
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::articles::types::{FlatValue, RawDates};
    use std::collections::BTreeMap;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn article(fields: &[(&str, &str)]) -> Article {
        let flattened: BTreeMap<String, FlatValue> = fields
            .iter()
            .map(|(k, v)| (k.to_string(), FlatValue::from(*v)))
            .collect();
        Article {
            flattened,
            raw: RawDates::default(),
        }
    }

    #[test]
    fn test_union_preserving_order_and_dedup() {
        let union = union_preserving(
            &strings(&["title", "description"]),
            &strings(&["description", "author"]),
        );
        assert_eq!(union, strings(&["title", "description", "author"]));
    }

    #[test]
    fn test_union_preserving_empty() {
        assert!(union_preserving(&[], &[]).is_empty());
    }

    #[test]
    fn test_field_rows_skip_absent_fields() {
        let article = article(&[("title", "Hello")]);
        let names = strings(&["title", "description"]);
        let rows = field_rows_for("feed-1", &article, names.iter());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].field_name, "title");
        assert_eq!(rows[0].field_hashed_value, sha1_hex("Hello"));
    }

    #[test]
    fn test_field_checks_hash_values() {
        let article = article(&[("title", "Hello"), ("description", "World")]);
        let names = strings(&["title", "description"]);
        let checks = field_checks_for(&article, names.iter());
        assert_eq!(checks.len(), 2);
        assert!(checks
            .iter()
            .any(|c| c.field_name == "description" && c.field_hashed_value == sha1_hex("World")));
    }
}
