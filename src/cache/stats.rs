//! Process-local cache statistics.
//!
//! Best-effort counters for observability; never read as a correctness
//! signal.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub(crate) struct Statistics {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    invalidated_keys: AtomicU64,
    bulk_operations: AtomicU64,
    bulk_products_processed: AtomicU64,
    bulk_categories_processed: AtomicU64,
}

impl Statistics {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_invalidated(&self, keys: usize) {
        self.invalidated_keys
            .fetch_add(keys as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_bulk_products(&self, products: usize) {
        self.bulk_operations.fetch_add(1, Ordering::Relaxed);
        self.bulk_products_processed
            .fetch_add(products as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_bulk_categories(&self, categories: usize) {
        self.bulk_operations.fetch_add(1, Ordering::Relaxed);
        self.bulk_categories_processed
            .fetch_add(categories as u64, Ordering::Relaxed);
    }

    pub(crate) fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.writes,
            &self.invalidated_keys,
            &self.bulk_operations,
            &self.bulk_products_processed,
            &self.bulk_categories_processed,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    pub(crate) fn snapshot(
        &self,
        enabled: bool,
        total_entries: usize,
        ttl_seconds: u64,
        prefix: &str,
    ) -> CacheStats {
        CacheStats {
            enabled,
            total_entries,
            invalidated_keys: self.invalidated_keys.load(Ordering::Relaxed),
            ttl: ttl_seconds,
            prefix: prefix.to_string(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            bulk_operations: BulkOperationStats {
                total_operations: self.bulk_operations.load(Ordering::Relaxed),
                total_products_processed: self.bulk_products_processed.load(Ordering::Relaxed),
                total_categories_processed: self
                    .bulk_categories_processed
                    .load(Ordering::Relaxed),
            },
        }
    }
}

/// Snapshot returned by `CacheService::stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub enabled: bool,
    /// Live backend keys under the service prefix at snapshot time.
    pub total_entries: usize,
    pub invalidated_keys: u64,
    /// Default TTL in seconds.
    pub ttl: u64,
    pub prefix: String,
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub bulk_operations: BulkOperationStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkOperationStats {
    pub total_operations: u64,
    /// Unique product ids, after deduplication.
    pub total_products_processed: u64,
    pub total_categories_processed: u64,
}
