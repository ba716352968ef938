//! Article types for feedrelay.

use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Flattened-map key holding the article's stable identity.
pub const ID_KEY: &str = "id";

/// Flattened-map key holding the lowercase hex SHA-1 of the identity.
pub const ID_HASH_KEY: &str = "idHash";

/// A primitive value in an article's flattened map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlatValue {
    /// Boolean value.
    Bool(bool),
    /// Numeric value.
    Number(f64),
    /// String value.
    Text(String),
}

impl FlatValue {
    /// Render the value as text.
    ///
    /// Comparison hashing and identity derivation both go through this,
    /// so the rendering must stay stable across polls.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            FlatValue::Bool(b) => Cow::Owned(b.to_string()),
            FlatValue::Number(n) => Cow::Owned(n.to_string()),
            FlatValue::Text(s) => Cow::Borrowed(s.as_str()),
        }
    }

    /// Check whether the rendered value is empty.
    pub fn is_empty_text(&self) -> bool {
        matches!(self, FlatValue::Text(s) if s.is_empty())
    }
}

impl From<String> for FlatValue {
    fn from(s: String) -> Self {
        FlatValue::Text(s)
    }
}

impl From<&str> for FlatValue {
    fn from(s: &str) -> Self {
        FlatValue::Text(s.to_string())
    }
}

impl From<f64> for FlatValue {
    fn from(n: f64) -> Self {
        FlatValue::Number(n)
    }
}

impl From<bool> for FlatValue {
    fn from(b: bool) -> Self {
        FlatValue::Bool(b)
    }
}

/// Temporal fields of the source item, normalized to ISO-8601.
///
/// A field is present only when the source value parsed as a valid date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDates {
    /// Item modification date (falls back to the publication date).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    /// Item publication date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pubdate: Option<String>,
}

impl RawDates {
    /// Look up a date placeholder by name (`date` or `pubdate`).
    pub fn get(&self, placeholder: &str) -> Option<&str> {
        match placeholder {
            "date" => self.date.as_deref(),
            "pubdate" => self.pubdate.as_deref(),
            _ => None,
        }
    }
}

/// A parsed feed entry flattened to string-keyed primitives.
///
/// The flattened map always contains a non-empty `id` and its `idHash`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    /// String-keyed primitive fields, including `id` and `idHash`.
    pub flattened: BTreeMap<String, FlatValue>,
    /// Normalized temporal fields from the source item.
    #[serde(default)]
    pub raw: RawDates,
}

impl Article {
    /// The article's stable identity, empty if the build invariant broke.
    pub fn id(&self) -> &str {
        match self.flattened.get(ID_KEY) {
            Some(FlatValue::Text(s)) => s,
            _ => "",
        }
    }

    /// Lowercase hex SHA-1 of the identity, empty if absent.
    pub fn id_hash(&self) -> &str {
        match self.flattened.get(ID_HASH_KEY) {
            Some(FlatValue::Text(s)) => s,
            _ => "",
        }
    }

    /// Get a flattened field's text rendering, if the field is present.
    pub fn field_text(&self, name: &str) -> Option<Cow<'_, str>> {
        self.flattened.get(name).map(FlatValue::as_text)
    }
}

/// The JSON shape of a cached article set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedArticles {
    /// The cached articles.
    pub articles: Vec<Article>,
}
