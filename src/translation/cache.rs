//! Translation result cache.
//!
//! Keyed by language pair and exact source text. Hits short-circuit the
//! Ambassador entirely, so a cached translation is served even while the
//! dependency's circuit is open.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::config::CacheConfig;
use crate::observability::metrics;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    source_lang: String,
    target_lang: String,
    text: String,
}

impl CacheKey {
    fn new(text: &str, source_lang: &str, target_lang: &str) -> Self {
        Self {
            source_lang: source_lang.to_lowercase(),
            target_lang: target_lang.to_lowercase(),
            text: text.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    translated: String,
    inserted: Instant,
}

/// A thread-safe TTL cache of translations.
#[derive(Debug, Clone)]
pub struct TranslationCache {
    inner: Arc<DashMap<CacheKey, CacheEntry>>,
    ttl: Duration,
    max_entries: usize,
}

impl TranslationCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            ttl,
            max_entries,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(Duration::from_secs(config.ttl_secs), config.max_entries)
    }

    /// Look up a live entry; expired entries are dropped on read.
    pub fn get(&self, text: &str, source_lang: &str, target_lang: &str) -> Option<String> {
        let key = CacheKey::new(text, source_lang, target_lang);
        // Read guard must be released before removing from the same shard.
        let entry = self
            .inner
            .get(&key)
            .map(|r| (r.inserted.elapsed() < self.ttl, r.translated.clone()));
        let hit = match entry {
            Some((true, translated)) => Some(translated),
            Some((false, _)) => {
                self.inner.remove(&key);
                None
            }
            None => None,
        };

        metrics::record_cache_lookup(hit.is_some());
        hit
    }

    pub fn put(&self, text: &str, source_lang: &str, target_lang: &str, translated: &str) {
        if self.inner.len() >= self.max_entries {
            self.purge_expired();
        }
        if self.inner.len() >= self.max_entries {
            // Still full: evict the oldest entry.
            let oldest = self
                .inner
                .iter()
                .min_by_key(|r| r.value().inserted)
                .map(|r| r.key().clone());
            if let Some(key) = oldest {
                self.inner.remove(&key);
            }
        }

        self.inner.insert(
            CacheKey::new(text, source_lang, target_lang),
            CacheEntry {
                translated: translated.to_string(),
                inserted: Instant::now(),
            },
        );
    }

    /// Remove expired entries, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let before = self.inner.len();
        let ttl = self.ttl;
        self.inner.retain(|_, entry| entry.inserted.elapsed() < ttl);
        before.saturating_sub(self.inner.len())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
