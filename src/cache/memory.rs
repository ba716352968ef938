//! In-process cache store with per-key expiry.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::cache::CacheStore;
use crate::Result;

#[derive(Debug, Clone)]
struct Entry {
    body: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }
}

/// Key/value cache store backed by a process-local map.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryCacheStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining time-to-live for a key, if the key is present.
    ///
    /// `Some(None)` means the key exists without an expiry.
    pub fn ttl_remaining(&self, key: &str) -> Option<Option<Duration>> {
        let entries = self.entries.read().unwrap();
        let entry = entries.get(key)?;
        if entry.is_expired() {
            return None;
        }
        Some(
            entry
                .expires_at
                .map(|deadline| deadline.saturating_duration_since(Instant::now())),
        )
    }

    fn drop_if_expired(&self, key: &str) {
        let mut entries = self.entries.write().unwrap();
        if entries.get(key).is_some_and(Entry::is_expired) {
            entries.remove(key);
        }
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        self.drop_if_expired(key);
        Ok(self.entries.read().unwrap().contains_key(key))
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.drop_if_expired(key);
        Ok(self
            .entries
            .read()
            .unwrap()
            .get(key)
            .map(|e| e.body.clone()))
    }

    async fn set(&self, key: &str, body: &str, ttl: Option<Duration>) -> Result<()> {
        let mut entries = self.entries.write().unwrap();
        let expires_at = match ttl {
            Some(ttl) => Some(Instant::now() + ttl),
            // Keep the previous deadline, if any
            None => entries
                .get(key)
                .filter(|e| !e.is_expired())
                .and_then(|e| e.expires_at),
        };
        entries.insert(
            key.to_string(),
            Entry {
                body: body.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.entries.write().unwrap().remove(key);
        Ok(())
    }

    async fn set_expire(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.write().unwrap();
        if let Some(entry) = entries.get_mut(key) {
            if !entry.is_expired() {
                entry.expires_at = Some(Instant::now() + ttl);
            }
        }
        Ok(())
    }
}
