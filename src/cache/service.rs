//! Cache service.
//!
//! Owns the get/set/delete/flush contract over a backend store, key
//! generation, statistics, and the targeted and bulk invalidation
//! operations. The cache is an optimisation: no failure in here is ever
//! surfaced to callers as an error.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};

use crate::domain::products::{CategoryId, ProductCatalog, ProductId, ProductRecord};

use super::backend::{BackendError, CacheBackend};
use super::config::{CacheConfig, DEFAULT_KEY_PREFIX};
use super::keys::{self, EntityKey, KeyError, ParamValue};
use super::planner::InvalidationPlan;
use super::registry::CacheRegistry;
use super::stats::{CacheStats, Statistics};

const METRIC_HIT_TOTAL: &str = "catalog_cache_hit_total";
const METRIC_MISS_TOTAL: &str = "catalog_cache_miss_total";
const METRIC_WRITE_TOTAL: &str = "catalog_cache_write_total";
const METRIC_INVALIDATED_KEYS_TOTAL: &str = "catalog_cache_invalidated_keys_total";
const METRIC_BACKEND_ERROR_TOTAL: &str = "catalog_cache_backend_error_total";
const METRIC_INVALIDATION_MS: &str = "catalog_cache_invalidation_ms";

/// Result of an invalidation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InvalidationOutcome {
    /// False only when the backend rejected an operation it was able to run.
    pub success: bool,
    /// Distinct logical keys a delete was issued for.
    pub keys_touched: usize,
}

impl InvalidationOutcome {
    pub fn empty() -> Self {
        Self {
            success: true,
            keys_touched: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }
}

impl From<InvalidationOutcome> for bool {
    fn from(outcome: InvalidationOutcome) -> Self {
        outcome.success
    }
}

pub struct CacheService {
    config: CacheConfig,
    backend: Arc<dyn CacheBackend>,
    registry: Arc<CacheRegistry>,
    catalog: Option<Arc<dyn ProductCatalog>>,
    stats: Statistics,
}

impl CacheService {
    /// Create a service over the given backend, without catalog access.
    ///
    /// Without a catalog, product invalidation cannot discover variation
    /// parents and clears only the product itself. A blank key prefix is
    /// replaced by the default one, since flush deletes by prefix.
    pub fn new(mut config: CacheConfig, backend: Arc<dyn CacheBackend>) -> Self {
        if config.key_prefix.trim().is_empty() {
            warn!(
                fallback = DEFAULT_KEY_PREFIX,
                "Blank cache key prefix replaced with the default"
            );
            config.key_prefix = DEFAULT_KEY_PREFIX.to_string();
        }
        Self {
            config,
            backend,
            registry: Arc::new(CacheRegistry::new()),
            catalog: None,
            stats: Statistics::default(),
        }
    }

    /// Attach the product store used to resolve variation parents.
    pub fn with_catalog(mut self, catalog: Arc<dyn ProductCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<CacheRegistry> {
        &self.registry
    }

    pub(crate) fn catalog(&self) -> Option<&Arc<dyn ProductCatalog>> {
        self.catalog.as_ref()
    }

    /// Generate `{prefix}_{digest}` for a parameter map.
    pub fn generate_key<I, K>(&self, prefix: &str, params: I) -> Result<String, KeyError>
    where
        I: IntoIterator<Item = (K, ParamValue)>,
        K: Into<String>,
    {
        keys::generate_key(prefix, params)
    }

    fn backend_key(&self, key: &str) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }

    fn logical_key<'a>(&self, backend_key: &'a str) -> Option<&'a str> {
        backend_key.strip_prefix(self.config.key_prefix.as_str())
    }

    // ========================================================================
    // Core contract
    // ========================================================================

    /// Read a cached value.
    ///
    /// `None` is a miss. A disabled cache, an unavailable backend, and a
    /// stored value that no longer decodes as `T` all read as a miss.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if !self.config.enabled || !self.backend.is_available() {
            return self.miss();
        }

        let backend_key = self.backend_key(key);
        match self.backend.get(&backend_key) {
            Ok(Some(raw)) => match serde_json::from_value(raw) {
                Ok(value) => {
                    self.stats.record_hit();
                    counter!(METRIC_HIT_TOTAL).increment(1);
                    Some(value)
                }
                Err(error) => {
                    warn!(key, error = %error, "Dropping cached value that no longer decodes");
                    if let Err(error) = self.backend.delete(&backend_key) {
                        self.backend_failure("delete", &error);
                    }
                    self.registry.unregister(key);
                    self.miss()
                }
            },
            Ok(None) => {
                self.registry.unregister(key);
                self.miss()
            }
            Err(error) => {
                self.backend_failure("get", &error);
                self.miss()
            }
        }
    }

    fn miss<T>(&self) -> Option<T> {
        self.stats.record_miss();
        counter!(METRIC_MISS_TOTAL).increment(1);
        None
    }

    /// Store a value under `key`.
    ///
    /// `ttl` defaults to the configured TTL and must be positive. A disabled
    /// cache reports success without writing.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Option<Duration>) -> bool {
        if !self.config.enabled {
            debug!(key, "Cache write skipped: cache disabled");
            return true;
        }

        let ttl = ttl.unwrap_or_else(|| self.config.ttl());
        if ttl.is_zero() {
            warn!(key, "Cache write rejected: ttl must be positive");
            return false;
        }

        let raw = match serde_json::to_value(value) {
            Ok(raw) => raw,
            Err(error) => {
                warn!(key, error = %error, "Cache write rejected: value does not serialize");
                return false;
            }
        };

        if !self.backend.is_available() {
            return self.backend_failure(
                "set",
                &BackendError::unavailable("backend reports unavailable"),
            );
        }

        match self.backend.set(&self.backend_key(key), raw, ttl) {
            Ok(()) => {
                self.stats.record_write();
                counter!(METRIC_WRITE_TOTAL).increment(1);
                debug!(key, ttl_secs = ttl.as_secs(), "Cache entry stored");
                true
            }
            Err(error) => self.backend_failure("set", &error),
        }
    }

    /// Store a value and register it against the entities it was built from.
    ///
    /// Invalidating any of those entities later deletes this key as well.
    /// Once the registry holds twice as many keys as the backend can, it is
    /// pruned of keys whose entries expired or were evicted.
    pub fn set_with_dependencies<T, E>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
        entities: E,
    ) -> bool
    where
        T: Serialize + ?Sized,
        E: IntoIterator<Item = EntityKey>,
    {
        let stored = self.set(key, value, ttl);
        if stored && self.config.enabled {
            let entities: HashSet<EntityKey> = entities.into_iter().collect();
            if !entities.is_empty() {
                let limit = self.config.memory_capacity_non_zero().get().saturating_mul(2);
                if self.registry.key_count() >= limit {
                    self.prune_registry();
                }
                self.registry.register(key, entities);
            }
        }
        stored
    }

    /// Return the cached value, or compute, store and return a fresh one.
    pub fn get_or_compute<T, F>(&self, key: &str, ttl: Option<Duration>, compute: F) -> T
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        if let Some(cached) = self.get(key) {
            return cached;
        }
        let fresh = compute();
        self.set(key, &fresh, ttl);
        fresh
    }

    /// Delete one entry. Deleting an absent key succeeds.
    pub fn delete(&self, key: &str) -> bool {
        self.registry.unregister(key);
        if !self.backend.is_available() {
            return self.backend_failure(
                "delete",
                &BackendError::unavailable("backend reports unavailable"),
            );
        }
        match self.backend.delete(&self.backend_key(key)) {
            Ok(()) => true,
            Err(error) => self.backend_failure("delete", &error),
        }
    }

    /// Delete every entry under this service's prefix and reset statistics.
    ///
    /// Keys of other tenants sharing the backend are left alone.
    #[instrument(skip(self), fields(prefix = %self.config.key_prefix))]
    pub fn flush(&self) -> bool {
        self.registry.clear();
        self.stats.reset();

        let keys = match self.list_backend_keys() {
            Ok(keys) => keys,
            Err(error) => return self.backend_failure("flush", &error),
        };

        let mut success = true;
        let mut flushed = 0usize;
        for backend_key in keys
            .iter()
            .filter(|key| key.starts_with(self.config.key_prefix.as_str()))
        {
            match self.backend.delete(backend_key) {
                Ok(()) => flushed += 1,
                Err(error) => success &= self.backend_failure("flush", &error),
            }
        }

        info!(flushed, success, "Cache flushed");
        success
    }

    /// Drop registrations whose backend entry is gone. Returns how many were
    /// dropped.
    pub fn prune_registry(&self) -> usize {
        match self.list_backend_keys() {
            Ok(backend_keys) => self.retain_live(&backend_keys),
            Err(error) => {
                self.backend_failure("prune", &error);
                0
            }
        }
    }

    fn retain_live(&self, backend_keys: &[String]) -> usize {
        let live: HashSet<&str> = backend_keys
            .iter()
            .filter_map(|key| self.logical_key(key))
            .collect();
        let pruned = self.registry.retain_keys(&live);
        if pruned > 0 {
            debug!(pruned, "Pruned registry keys with no backend entry");
        }
        pruned
    }

    fn list_backend_keys(&self) -> Result<Vec<String>, BackendError> {
        if !self.backend.is_available() {
            return Err(BackendError::unavailable("backend reports unavailable"));
        }
        self.backend.keys()
    }

    /// Log a backend failure and decide what the caller reports.
    ///
    /// An unavailable backend degrades to a no-op cache, so the caller
    /// reports success; any other failure is reported as `false`.
    fn backend_failure(&self, op: &'static str, error: &BackendError) -> bool {
        counter!(METRIC_BACKEND_ERROR_TOTAL, "op" => op).increment(1);
        match error {
            BackendError::Unavailable(_) => {
                warn!(op, error = %error, "Cache backend unavailable, degrading to no-op");
                true
            }
            BackendError::Operation { .. } => {
                warn!(op, error = %error, "Cache backend operation failed");
                false
            }
        }
    }

    // ========================================================================
    // Invalidation
    // ========================================================================

    /// Invalidate a product, its variation list, and every product list.
    ///
    /// When the product is a variation, its parent is invalidated too. The
    /// entries of the categories it belongs to go as well, since they carry
    /// product counts. A failed lookup is logged and the product itself is
    /// still cleared.
    #[instrument(skip(self))]
    pub async fn invalidate_product(&self, product_id: ProductId) -> InvalidationOutcome {
        let mut plan = InvalidationPlan::for_products([product_id]);
        if let Some(product) = self.lookup_product(product_id).await {
            if let Some(parent_id) = product.parent() {
                plan.add_product(parent_id);
            }
            for category_id in product.category_ids {
                plan.add_category(category_id);
            }
        }
        self.execute(&plan, "product")
    }

    /// Look up a variation's parent. Any failure resolves to `None`.
    pub(crate) async fn resolve_parent(&self, product_id: ProductId) -> Option<ProductId> {
        self.lookup_product(product_id).await?.parent()
    }

    async fn lookup_product(&self, product_id: ProductId) -> Option<ProductRecord> {
        let catalog = self.catalog.as_ref()?;
        match catalog.find_product(product_id).await {
            Ok(product) => {
                if product.is_none() {
                    debug!(product_id, "Product not found while resolving relations");
                }
                product
            }
            Err(error) => {
                warn!(
                    product_id,
                    error = %error,
                    "Product lookup failed, invalidating the product alone"
                );
                None
            }
        }
    }

    /// Invalidate a category entry and every list that may be scoped to it.
    #[instrument(skip(self))]
    pub fn invalidate_category(&self, category_id: CategoryId) -> InvalidationOutcome {
        self.execute(&InvalidationPlan::for_categories([category_id]), "category")
    }

    /// Invalidate many products with a single list sweep.
    ///
    /// Duplicate ids collapse; an empty request does nothing and touches no
    /// backend. Variation parents are not resolved here.
    #[instrument(skip(self, product_ids), fields(requested = product_ids.len()))]
    pub fn invalidate_bulk_products(&self, product_ids: &[ProductId]) -> InvalidationOutcome {
        if product_ids.is_empty() {
            return InvalidationOutcome::empty();
        }
        let plan = InvalidationPlan::for_products(product_ids.iter().copied());
        self.stats.record_bulk_products(plan.products.len());
        self.execute(&plan, "bulk_products")
    }

    /// Invalidate many categories with a single list sweep.
    #[instrument(skip(self, category_ids), fields(requested = category_ids.len()))]
    pub fn invalidate_bulk_categories(&self, category_ids: &[CategoryId]) -> InvalidationOutcome {
        if category_ids.is_empty() {
            return InvalidationOutcome::empty();
        }
        let plan = InvalidationPlan::for_categories(category_ids.iter().copied());
        self.stats.record_bulk_categories(plan.categories.len());
        self.execute(&plan, "bulk_categories")
    }

    /// Delete every key matching a glob (`*`, `?`) or, without wildcards, a
    /// substring. Matching nothing is a success; an empty pattern matches
    /// nothing.
    #[instrument(skip(self))]
    pub fn invalidate_by_pattern(&self, pattern: &str) -> InvalidationOutcome {
        let plan = InvalidationPlan::for_pattern(pattern);
        if plan.is_empty() {
            return InvalidationOutcome::empty();
        }
        self.execute(&plan, "pattern")
    }

    /// Run a plan: direct keys, registered dependents, then one sweep over
    /// the backend for all patterns together.
    pub fn execute(&self, plan: &InvalidationPlan, action: &'static str) -> InvalidationOutcome {
        if plan.is_empty() {
            return InvalidationOutcome::empty();
        }
        let started_at = Instant::now();

        let mut targets: BTreeSet<String> = plan.direct_keys();
        for entity in plan.entities() {
            targets.extend(self.registry.take_entity(&entity));
        }

        let mut success = true;
        let patterns = plan.sweep_patterns();
        if !patterns.is_empty() {
            match self.list_backend_keys() {
                Ok(backend_keys) => {
                    self.retain_live(&backend_keys);
                    targets.extend(
                        backend_keys
                            .iter()
                            .filter_map(|key| self.logical_key(key))
                            .filter(|key| {
                                patterns
                                    .iter()
                                    .any(|pattern| keys::matches_pattern(pattern, key))
                            })
                            .map(str::to_string),
                    );
                }
                Err(error) => success &= self.backend_failure("sweep", &error),
            }
        }

        for key in &targets {
            success &= self.delete(key);
        }

        let keys_touched = targets.len();
        self.stats.record_invalidated(keys_touched);
        counter!(METRIC_INVALIDATED_KEYS_TOTAL, "action" => action).increment(keys_touched as u64);
        histogram!(METRIC_INVALIDATION_MS, "action" => action)
            .record(started_at.elapsed().as_secs_f64() * 1000.0);

        info!(action, plan = %plan, keys_touched, success, "Cache invalidation complete");

        InvalidationOutcome {
            success,
            keys_touched,
        }
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    pub fn stats(&self) -> CacheStats {
        let total_entries = self
            .list_backend_keys()
            .map(|keys| {
                keys.iter()
                    .filter(|key| key.starts_with(self.config.key_prefix.as_str()))
                    .count()
            })
            .unwrap_or(0);

        self.stats.snapshot(
            self.config.enabled,
            total_entries,
            self.config.ttl().as_secs(),
            &self.config.key_prefix,
        )
    }
}
