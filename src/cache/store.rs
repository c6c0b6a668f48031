//! In-memory backend store.
//!
//! LRU-bounded map with per-entry expiry. Stands in for the platform cache in
//! tests and in the `replay` command.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use lru::LruCache;
use metrics::counter;
use serde_json::Value;

use super::backend::{BackendError, CacheBackend};
use super::config::CacheConfig;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";
const METRIC_EVICT_TOTAL: &str = "catalog_cache_evict_total";

#[derive(Debug, Clone)]
struct StoredEntry {
    value: Value,
    expires_at: Instant,
}

impl StoredEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

pub struct MemoryBackend {
    entries: RwLock<LruCache<String, StoredEntry>>,
}

impl MemoryBackend {
    /// Create a new memory backend sized from the given configuration.
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.memory_capacity_non_zero())),
        }
    }

    /// Number of stored entries, expired ones included until they are swept.
    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<Value>, BackendError> {
        let mut entries = rw_write(&self.entries, SOURCE, "get");
        let now = Instant::now();
        let expired = match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        Ok(None)
    }

    fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), BackendError> {
        let expires_at = Instant::now()
            .checked_add(ttl)
            .ok_or_else(|| BackendError::operation("set", "ttl overflows the clock"))?;

        let evicted = rw_write(&self.entries, SOURCE, "set")
            .push(key.to_string(), StoredEntry { value, expires_at });

        if evicted.is_some_and(|(evicted_key, _)| evicted_key != key) {
            counter!(METRIC_EVICT_TOTAL).increment(1);
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), BackendError> {
        rw_write(&self.entries, SOURCE, "delete").pop(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, BackendError> {
        let mut entries = rw_write(&self.entries, SOURCE, "keys");
        let now = Instant::now();

        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }

        Ok(entries.iter().map(|(key, _)| key.clone()).collect())
    }
}
