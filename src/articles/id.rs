//! Identity resolution for feed items.
//!
//! Feed dialects disagree about which field identifies an item. The
//! resolver watches a whole batch and picks the highest-priority field
//! that is present and non-empty on every item, so one poll's articles
//! all derive their identity the same way.

use feed_rs::model::Entry;

use crate::{RelayError, Result};

/// Candidate identity fields, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdType {
    /// The item's guid / Atom id.
    Guid,
    /// The item's publication date, in its wire form.
    Pubdate,
    /// The item's title.
    Title,
    /// The item's first link.
    Link,
}

/// All candidates, highest priority first.
const CANDIDATES: [IdType; 4] = [IdType::Guid, IdType::Pubdate, IdType::Title, IdType::Link];

/// One item's candidate identity values.
///
/// Dates are stringified to RFC 2822 (their RSS wire form) so the same
/// article produces the same id across polls.
#[derive(Debug, Clone, Default)]
pub struct IdCandidates {
    /// Guid / Atom id.
    pub guid: Option<String>,
    /// Publication date, stringified.
    pub pubdate: Option<String>,
    /// Item title.
    pub title: Option<String>,
    /// First link href.
    pub link: Option<String>,
}

impl IdCandidates {
    /// Extract the candidate values from a parsed feed entry.
    pub fn from_entry(entry: &Entry) -> Self {
        Self {
            guid: non_empty(Some(entry.id.clone())),
            pubdate: entry.published.map(|d| d.to_rfc2822()),
            title: non_empty(entry.title.as_ref().map(|t| t.content.clone())),
            link: non_empty(entry.links.first().map(|l| l.href.clone())),
        }
    }

    /// The value for a given candidate, if present and non-empty.
    pub fn value(&self, id_type: IdType) -> Option<&str> {
        let value = match id_type {
            IdType::Guid => self.guid.as_deref(),
            IdType::Pubdate => self.pubdate.as_deref(),
            IdType::Title => self.title.as_deref(),
            IdType::Link => self.link.as_deref(),
        };
        value.filter(|v| !v.is_empty())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Chooses a single identity field for a batch of feed items.
#[derive(Debug)]
pub struct IdResolver {
    surviving: [bool; 4],
    observed_any: bool,
}

impl IdResolver {
    /// Create a resolver with every candidate still in the running.
    pub fn new() -> Self {
        Self {
            surviving: [true; 4],
            observed_any: false,
        }
    }

    /// Observe one item; candidates it lacks are eliminated.
    pub fn observe(&mut self, candidates: &IdCandidates) {
        self.observed_any = true;
        for (i, id_type) in CANDIDATES.iter().enumerate() {
            if self.surviving[i] && candidates.value(*id_type).is_none() {
                self.surviving[i] = false;
            }
        }
    }

    /// Return the highest-priority surviving candidate.
    ///
    /// # Errors
    ///
    /// Returns `NoIdType` when no candidate is present on every observed
    /// item (or when no items were observed at all).
    pub fn resolve(&self) -> Result<IdType> {
        if !self.observed_any {
            return Err(RelayError::NoIdType);
        }
        CANDIDATES
            .iter()
            .enumerate()
            .find(|(i, _)| self.surviving[*i])
            .map(|(_, id_type)| *id_type)
            .ok_or(RelayError::NoIdType)
    }
}

impl Default for IdResolver {
    fn default() -> Self {
        Self::new()
    }
}
