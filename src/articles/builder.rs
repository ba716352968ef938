//! Article construction for feedrelay.
//!
//! Takes raw feed entries through flattening, identity attachment, and
//! the optional content-injection pass.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use feed_rs::model::Entry;
use tracing::{debug, warn};

use crate::articles::flatten::{FlattenOptions, Flattener};
use crate::articles::id::{IdCandidates, IdResolver};
use crate::articles::types::{Article, FlatValue, RawDates, ID_HASH_KEY, ID_KEY};
use crate::hash::sha1_hex;
use crate::{RelayError, Result};

/// Builds finished articles from raw feed entries.
pub struct ArticleBuilder {
    flattener: Arc<dyn Flattener>,
    max_injection_article_count: usize,
    injection_batch_size: usize,
    injection_batch_pause: Duration,
}

impl ArticleBuilder {
    /// Create a builder with the given injection limits.
    pub fn new(
        flattener: Arc<dyn Flattener>,
        max_injection_article_count: usize,
        injection_batch_size: usize,
        injection_batch_pause: Duration,
    ) -> Self {
        Self {
            flattener,
            max_injection_article_count,
            injection_batch_size: injection_batch_size.max(1),
            injection_batch_pause,
        }
    }

    /// Build all entries of one parse pass into articles.
    ///
    /// # Errors
    ///
    /// `NoIdType` when no identity field survives the whole batch,
    /// `MissingIdHash` when a built article lost its id hash.
    pub async fn build(&self, entries: &[Entry], opts: &FlattenOptions) -> Result<Vec<Article>> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let candidates: Vec<IdCandidates> =
            entries.iter().map(IdCandidates::from_entry).collect();

        let mut resolver = IdResolver::new();
        for c in &candidates {
            resolver.observe(c);
        }
        let id_type = resolver.resolve()?;

        let mut articles = Vec::with_capacity(entries.len());
        let mut wants_injection = Vec::with_capacity(entries.len());
        for (entry, candidates) in entries.iter().zip(&candidates) {
            let flat = self.flattener.flatten(entry, opts);
            let id = candidates
                .value(id_type)
                .ok_or(RelayError::NoIdType)?
                .to_string();

            let mut flattened = flat.flattened;
            flattened.insert(ID_HASH_KEY.to_string(), FlatValue::Text(sha1_hex(&id)));
            flattened.insert(ID_KEY.to_string(), FlatValue::Text(id));

            articles.push(Article {
                flattened,
                raw: raw_dates(entry),
            });
            wants_injection.push(flat.wants_injection);
        }

        self.check_id_hashes(&articles)?;
        self.inject_batch(&mut articles, &wants_injection, opts)
            .await?;

        Ok(articles)
    }

    /// Warn about colliding id hashes and enforce the id-hash invariant.
    ///
    /// Duplicates survive the parse; the later store insert collides on
    /// the unique constraint and is absorbed there.
    fn check_id_hashes(&self, articles: &[Article]) -> Result<()> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for article in articles {
            *counts.entry(article.id_hash()).or_default() += 1;
        }
        for (hash, count) in counts {
            if hash.is_empty() {
                return Err(RelayError::MissingIdHash);
            }
            if count > 1 {
                warn!(id_hash = %hash, count, "duplicate article id hash within one parse");
            }
        }
        Ok(())
    }

    /// Run the deferred content-injection pass in rate-limited batches.
    ///
    /// Skipped when the batch exceeds the configured article count.
    async fn inject_batch(
        &self,
        articles: &mut [Article],
        wants_injection: &[bool],
        opts: &FlattenOptions,
    ) -> Result<()> {
        if !wants_injection.iter().any(|w| *w) {
            return Ok(());
        }
        if articles.len() > self.max_injection_article_count {
            debug!(
                count = articles.len(),
                max = self.max_injection_article_count,
                "skipping content injection for oversized batch"
            );
            return Ok(());
        }

        let mut flagged: Vec<&mut Article> = articles
            .iter_mut()
            .zip(wants_injection)
            .filter_map(|(article, wants)| wants.then_some(article))
            .collect();

        for (batch_no, batch) in flagged.chunks_mut(self.injection_batch_size).enumerate() {
            if batch_no > 0 {
                tokio::time::sleep(self.injection_batch_pause).await;
            }
            let results = futures::future::join_all(
                batch
                    .iter_mut()
                    .map(|article| self.flattener.inject_content(article, opts)),
            )
            .await;
            for result in results {
                result?;
            }
        }
        Ok(())
    }
}

/// Normalize the entry's temporal fields to ISO-8601.
fn raw_dates(entry: &Entry) -> RawDates {
    RawDates {
        date: entry
            .updated
            .or(entry.published)
            .map(|d| d.to_rfc3339()),
        pubdate: entry.published.map(|d| d.to_rfc3339()),
    }
}
