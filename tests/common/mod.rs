//! Test helpers for feedrelay integration tests.
//!
//! Provides an in-memory delivery environment, a scripted fetcher, and
//! RSS fixture builders.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use feedrelay::{
    ComparisonRegistry, Database, DeliveryService, EntryFlattener, FeedParser, FetchOptions,
    FetchResponse, Fetcher, FieldStore, RelayError, Result, SqliteComparisonRegistry,
    SqliteFieldStore,
};

/// One RSS item fixture.
#[derive(Debug, Clone)]
pub struct TestItem {
    pub guid: String,
    pub title: String,
    pub description: Option<String>,
    pub pubdate: Option<String>,
}

impl TestItem {
    pub fn new(guid: &str, title: &str) -> Self {
        Self {
            guid: guid.to_string(),
            title: title.to_string(),
            description: None,
            pubdate: None,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn with_pubdate(mut self, pubdate: &str) -> Self {
        self.pubdate = Some(pubdate.to_string());
        self
    }
}

/// Build an RSS 2.0 document from item fixtures (newest first, as feeds
/// list them).
pub fn rss(items: &[TestItem]) -> String {
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <rss version=\"2.0\"><channel><title>Test Feed</title>\
         <link>https://example.com</link>",
    );
    for item in items {
        xml.push_str("<item>");
        xml.push_str(&format!("<guid>{}</guid>", item.guid));
        xml.push_str(&format!("<title>{}</title>", item.title));
        if let Some(description) = &item.description {
            xml.push_str(&format!("<description>{description}</description>"));
        }
        if let Some(pubdate) = &item.pubdate {
            xml.push_str(&format!("<pubDate>{pubdate}</pubDate>"));
        }
        xml.push_str("</item>");
    }
    xml.push_str("</channel></rss>");
    xml
}

/// An in-memory delivery environment.
pub struct DeliveryEnv {
    pub db: Database,
    pub service: DeliveryService,
    pub field_store: Arc<SqliteFieldStore>,
    pub registry: Arc<SqliteComparisonRegistry>,
}

/// Build a delivery service over a fresh in-memory database.
pub async fn delivery_env() -> DeliveryEnv {
    let db = Database::open_in_memory().await.unwrap();
    let field_store = Arc::new(SqliteFieldStore::new(db.pool().clone()));
    let registry = Arc::new(SqliteComparisonRegistry::new(db.pool().clone()));
    let parser = FeedParser::new(Arc::new(EntryFlattener::new()));
    let service = DeliveryService::new(
        parser,
        Arc::clone(&field_store) as Arc<dyn FieldStore>,
        Arc::clone(&registry) as Arc<dyn ComparisonRegistry>,
    );
    DeliveryEnv {
        db,
        service,
        field_store,
        registry,
    }
}

/// Fetcher serving scripted bodies; a `None` body means "pending".
pub struct ScriptedFetcher {
    responses: Mutex<HashMap<String, Option<String>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Script the body served for a URL.
    pub fn respond(&self, url: &str, body: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), Some(body.to_string()));
    }

    /// The URLs fetched so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for ScriptedFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str, _opts: &FetchOptions) -> Result<FetchResponse> {
        self.calls.lock().unwrap().push(url.to_string());
        match self.responses.lock().unwrap().get(url) {
            Some(body) => Ok(FetchResponse { body: body.clone() }),
            None => Err(RelayError::Fetch(format!("HTTP error: 404 for {url}"))),
        }
    }
}
