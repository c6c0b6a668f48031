//! Mutation events and the invalidation log.
//!
//! Defines the domain mutations the host reports and a bounded, in-memory
//! record of the invalidations they caused.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::products::{CategoryId, ProductId};

use super::lock::mutex_lock;

const SOURCE: &str = "cache::events";

/// Domain mutations that trigger invalidation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MutationEvent {
    ProductSaved { id: ProductId },
    ProductDeleted { id: ProductId },
    VariationSaved { id: ProductId },
    CategoryChanged { id: CategoryId },
    BulkVariationsSaved { parent_id: ProductId },
    BulkProductsSaved { ids: Vec<ProductId> },
    BulkCategoriesChanged { ids: Vec<CategoryId> },
}

impl MutationEvent {
    pub fn action(&self) -> InvalidationAction {
        match self {
            Self::ProductSaved { .. } => InvalidationAction::ProductSaved,
            Self::ProductDeleted { .. } => InvalidationAction::ProductDeleted,
            Self::VariationSaved { .. } => InvalidationAction::VariationSaved,
            Self::CategoryChanged { .. } => InvalidationAction::CategoryChanged,
            Self::BulkVariationsSaved { .. } => InvalidationAction::BulkVariations,
            Self::BulkProductsSaved { .. } => InvalidationAction::BulkProducts,
            Self::BulkCategoriesChanged { .. } => InvalidationAction::BulkCategories,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationAction {
    ProductSaved,
    ProductDeleted,
    VariationSaved,
    CategoryChanged,
    BulkProducts,
    BulkCategories,
    BulkVariations,
    Pattern,
    Flush,
}

impl InvalidationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProductSaved => "product_saved",
            Self::ProductDeleted => "product_deleted",
            Self::VariationSaved => "variation_saved",
            Self::CategoryChanged => "category_changed",
            Self::BulkProducts => "bulk_products",
            Self::BulkCategories => "bulk_categories",
            Self::BulkVariations => "bulk_variations",
            Self::Pattern => "pattern",
            Self::Flush => "flush",
        }
    }
}

impl fmt::Display for InvalidationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidationRecord {
    pub action: InvalidationAction,
    pub affected_keys: usize,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl InvalidationRecord {
    pub fn new(action: InvalidationAction, affected_keys: usize) -> Self {
        Self {
            action,
            affected_keys,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

/// Snapshot returned by `InvalidationCoordinator::stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidationStats {
    /// Records appended since start or the last clear, evicted ones included.
    pub total_invalidations: u64,
    /// Per-action counts over the same span.
    pub actions: BTreeMap<InvalidationAction, u64>,
    /// Newest first.
    pub recent_activity: Vec<InvalidationRecord>,
}

#[derive(Default)]
struct LogState {
    records: VecDeque<InvalidationRecord>,
    actions: BTreeMap<InvalidationAction, u64>,
}

/// Bounded log of invalidation records.
///
/// Appending to a full log evicts the oldest record. Totals keep counting
/// past evictions until the log is cleared.
pub struct InvalidationLog {
    capacity: NonZeroUsize,
    state: Mutex<LogState>,
    total: AtomicU64,
}

impl InvalidationLog {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            capacity,
            state: Mutex::new(LogState {
                records: VecDeque::with_capacity(capacity.get()),
                actions: BTreeMap::new(),
            }),
            total: AtomicU64::new(0),
        }
    }

    pub fn append(&self, record: InvalidationRecord) {
        let mut state = mutex_lock(&self.state, SOURCE, "append");
        if state.records.len() == self.capacity.get() {
            state.records.pop_front();
        }
        *state.actions.entry(record.action).or_default() += 1;
        state.records.push_back(record);
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    /// Totals plus up to `recent_limit` of the newest records, newest first.
    pub fn stats(&self, recent_limit: usize) -> InvalidationStats {
        let state = mutex_lock(&self.state, SOURCE, "stats");
        InvalidationStats {
            total_invalidations: self.total.load(Ordering::Relaxed),
            actions: state.actions.clone(),
            recent_activity: state.records.iter().rev().take(recent_limit).cloned().collect(),
        }
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.state, SOURCE, "len").records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut state = mutex_lock(&self.state, SOURCE, "clear");
        state.records.clear();
        state.actions.clear();
        self.total.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    fn log_with_capacity(capacity: usize) -> InvalidationLog {
        InvalidationLog::new(NonZeroUsize::new(capacity).expect("non-zero capacity"))
    }

    #[test]
    fn append_and_read_newest_first() {
        let log = log_with_capacity(10);
        log.append(InvalidationRecord::new(InvalidationAction::ProductSaved, 3));
        log.append(InvalidationRecord::new(InvalidationAction::CategoryChanged, 2));

        let recent = log.stats(10).recent_activity;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].action, InvalidationAction::CategoryChanged);
        assert_eq!(recent[1].affected_keys, 3);
    }

    #[test]
    fn full_log_evicts_oldest() {
        let log = log_with_capacity(3);
        for keys in 0..5 {
            log.append(InvalidationRecord::new(InvalidationAction::Pattern, keys));
        }

        assert_eq!(log.len(), 3);
        let stats = log.stats(10);
        let kept: Vec<usize> = stats.recent_activity.iter().map(|r| r.affected_keys).collect();
        assert_eq!(kept, vec![4, 3, 2]);
        assert_eq!(stats.total_invalidations, 5);
        assert_eq!(stats.actions[&InvalidationAction::Pattern], 5);
    }

    #[test]
    fn stats_limit_recent_activity() {
        let log = log_with_capacity(10);
        for _ in 0..4 {
            log.append(InvalidationRecord::new(InvalidationAction::Flush, 0));
        }
        assert_eq!(log.stats(2).recent_activity.len(), 2);
    }

    #[test]
    fn clear_resets_everything() {
        let log = log_with_capacity(10);
        log.append(InvalidationRecord::new(InvalidationAction::Flush, 0));
        log.clear();

        assert!(log.is_empty());
        let stats = log.stats(10);
        assert_eq!(stats.total_invalidations, 0);
        assert!(stats.actions.is_empty());
    }

    #[test]
    fn event_maps_to_action() {
        assert_eq!(
            MutationEvent::BulkVariationsSaved { parent_id: 1 }.action(),
            InvalidationAction::BulkVariations
        );
        assert_eq!(
            MutationEvent::ProductDeleted { id: 1 }.action(),
            InvalidationAction::ProductDeleted
        );
    }

    #[test]
    fn event_deserializes_from_tagged_form() {
        let event: MutationEvent =
            serde_json::from_str(r#"{"event": "bulk_products_saved", "ids": [1, 2]}"#)
                .expect("event should deserialize");
        assert_eq!(event, MutationEvent::BulkProductsSaved { ids: vec![1, 2] });
    }

    #[test]
    fn record_serializes_action_and_timestamp() {
        let record = InvalidationRecord::new(InvalidationAction::BulkCategories, 4);
        let json = serde_json::to_value(&record).expect("serialize");
        assert_eq!(json["action"], "bulk_categories");
        assert_eq!(json["affected_keys"], 4);
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn log_recovers_from_poisoned_lock() {
        let log = log_with_capacity(4);

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = log.state.lock().expect("log lock should be acquired");
            panic!("poison log lock");
        }));

        log.append(InvalidationRecord::new(InvalidationAction::Flush, 0));
        assert_eq!(log.len(), 1);
    }
}
