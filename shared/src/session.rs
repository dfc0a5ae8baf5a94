use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// URLs that finished loading during this session, with the time each one
/// landed. Anything in here is assumed to sit in the platform's own cache.
///
/// The set only ever grows.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionCache {
    loaded: HashMap<String, DateTime<Utc>>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seen(&self, url: &str) -> bool {
        self.loaded.contains_key(url)
    }

    /// Keeps the first load time if the URL was already recorded.
    pub fn record(&mut self, url: &str) {
        self.record_at(url, Utc::now());
    }

    pub fn record_at(&mut self, url: &str, at: DateTime<Utc>) {
        self.loaded.entry(url.to_string()).or_insert(at);
    }

    pub fn loaded_at(&self, url: &str) -> Option<DateTime<Utc>> {
        self.loaded.get(url).copied()
    }

    pub fn len(&self) -> usize {
        self.loaded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaded.is_empty()
    }

    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.loaded.keys().map(String::as_str)
    }
}
