//! Invalidation coordinator.
//!
//! Translates domain mutation events into cache service calls, resolving
//! parent/variation relationships on the way, and keeps the bounded log of
//! what each event cleared.

use std::collections::BTreeSet;
use std::sync::Arc;

use metrics::counter;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::products::{CategoryId, ProductId};

use super::events::{
    InvalidationAction, InvalidationLog, InvalidationRecord, InvalidationStats, MutationEvent,
};
use super::service::{CacheService, InvalidationOutcome};

const METRIC_EVENTS_TOTAL: &str = "catalog_cache_events_total";

/// Event-driven invalidation over a [`CacheService`].
///
/// Every handler runs to completion before returning. Relationship lookups
/// that fail never abort a handler: whatever keys can still be identified are
/// cleared, since clearing too much is safe and clearing too little serves
/// stale data.
///
/// # Usage
///
/// ```ignore
/// // After the host saves a product:
/// coordinator.on_product_saved(product.id).await;
/// ```
pub struct InvalidationCoordinator {
    service: Arc<CacheService>,
    log: InvalidationLog,
    recent_limit: usize,
}

impl InvalidationCoordinator {
    pub fn new(service: Arc<CacheService>) -> Self {
        let config = service.config();
        let log = InvalidationLog::new(config.invalidation_log_capacity_non_zero());
        let recent_limit = config.recent_activity_limit;
        Self {
            service,
            log,
            recent_limit,
        }
    }

    pub fn service(&self) -> &Arc<CacheService> {
        &self.service
    }

    /// Dispatch an event to its handler.
    pub async fn handle(&self, event: MutationEvent) -> InvalidationOutcome {
        let event_id = Uuid::new_v4();
        let action = event.action();
        info!(event_id = %event_id, event = ?event, "Cache mutation event received");
        counter!(METRIC_EVENTS_TOTAL, "action" => action.as_str()).increment(1);

        let outcome = match event {
            MutationEvent::ProductSaved { id } => self.on_product_saved(id).await,
            MutationEvent::ProductDeleted { id } => self.on_product_deleted(id).await,
            MutationEvent::VariationSaved { id } => self.on_variation_saved(id).await,
            MutationEvent::CategoryChanged { id } => self.on_category_changed(id),
            MutationEvent::BulkVariationsSaved { parent_id } => {
                self.on_bulk_variations_saved(parent_id).await
            }
            MutationEvent::BulkProductsSaved { ids } => self.on_bulk_products_saved(&ids).await,
            MutationEvent::BulkCategoriesChanged { ids } => self.on_bulk_categories_changed(&ids),
        };

        info!(
            event_id = %event_id,
            action = %action,
            keys_touched = outcome.keys_touched,
            success = outcome.success,
            "Cache mutation event handled"
        );
        outcome
    }

    /// A product was created or updated. Variations cascade to their parent.
    pub async fn on_product_saved(&self, id: ProductId) -> InvalidationOutcome {
        let outcome = self.service.invalidate_product(id).await;
        self.record(InvalidationAction::ProductSaved, outcome)
    }

    /// A product was deleted.
    ///
    /// The product may already be gone from the catalog, in which case only
    /// its own keys and the lists are cleared.
    pub async fn on_product_deleted(&self, id: ProductId) -> InvalidationOutcome {
        let outcome = self.service.invalidate_product(id).await;
        self.record(InvalidationAction::ProductDeleted, outcome)
    }

    /// A single variation was saved: clear it and its parent.
    pub async fn on_variation_saved(&self, id: ProductId) -> InvalidationOutcome {
        let outcome = self.service.invalidate_product(id).await;
        self.record(InvalidationAction::VariationSaved, outcome)
    }

    pub fn on_category_changed(&self, id: CategoryId) -> InvalidationOutcome {
        let outcome = self.service.invalidate_category(id);
        self.record(InvalidationAction::CategoryChanged, outcome)
    }

    /// All variations of a parent were saved at once.
    ///
    /// Clears the parent and every child in one bulk call. If the children
    /// cannot be enumerated, the parent is still cleared.
    pub async fn on_bulk_variations_saved(&self, parent_id: ProductId) -> InvalidationOutcome {
        let mut ids = vec![parent_id];
        match self.service.catalog() {
            Some(catalog) => match catalog.variation_ids(parent_id).await {
                Ok(children) => ids.extend(children),
                Err(error) => warn!(
                    parent_id,
                    error = %error,
                    "Variation lookup failed, invalidating the parent alone"
                ),
            },
            None => warn!(
                parent_id,
                "No catalog attached, invalidating the parent alone"
            ),
        }

        let outcome = self.service.invalidate_bulk_products(&ids);
        self.record(InvalidationAction::BulkVariations, outcome)
    }

    /// Many products were saved at once.
    ///
    /// Parents of any variations among them are added before the single bulk
    /// call, so a bulk save of variations still reaches their parents.
    pub async fn on_bulk_products_saved(&self, ids: &[ProductId]) -> InvalidationOutcome {
        if ids.is_empty() {
            return InvalidationOutcome::empty();
        }

        let unique: BTreeSet<ProductId> = ids.iter().copied().collect();
        let mut targets = unique.clone();
        for id in &unique {
            if let Some(parent_id) = self.service.resolve_parent(*id).await {
                targets.insert(parent_id);
            }
        }

        let targets: Vec<ProductId> = targets.into_iter().collect();
        let outcome = self.service.invalidate_bulk_products(&targets);
        self.record(InvalidationAction::BulkProducts, outcome)
    }

    pub fn on_bulk_categories_changed(&self, ids: &[CategoryId]) -> InvalidationOutcome {
        if ids.is_empty() {
            return InvalidationOutcome::empty();
        }
        let outcome = self.service.invalidate_bulk_categories(ids);
        self.record(InvalidationAction::BulkCategories, outcome)
    }

    pub fn invalidate_pattern(&self, pattern: &str) -> InvalidationOutcome {
        let outcome = self.service.invalidate_by_pattern(pattern);
        self.record(InvalidationAction::Pattern, outcome)
    }

    pub fn flush(&self) -> bool {
        let before = self.service.stats().total_entries;
        let success = self.service.flush();
        self.record(
            InvalidationAction::Flush,
            InvalidationOutcome {
                success,
                keys_touched: before,
            },
        );
        success
    }

    /// Append a record for a successful invalidation and pass the outcome on.
    fn record(
        &self,
        action: InvalidationAction,
        outcome: InvalidationOutcome,
    ) -> InvalidationOutcome {
        if outcome.success {
            self.log
                .append(InvalidationRecord::new(action, outcome.keys_touched));
        }
        outcome
    }

    pub fn stats(&self) -> InvalidationStats {
        self.log.stats(self.recent_limit)
    }

    /// Empty the invalidation log. Always succeeds.
    pub fn clear_logs(&self) -> bool {
        self.log.clear();
        info!("Invalidation log cleared");
        true
    }
}
