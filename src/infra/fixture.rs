//! In-memory product catalog and TOML replay fixtures.
//!
//! A fixture describes a small catalog, the cache entries present before
//! anything changes, and an ordered list of mutation events. Replaying it
//! drives the coordinator over a fresh in-memory backend and reports what
//! is left.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cache::{
    CacheBackend, CacheConfig, CacheService, CacheStats, InvalidationCoordinator,
    InvalidationStats, MemoryBackend, MutationEvent, generate_key_from,
};
use crate::domain::error::CatalogError;
use crate::domain::products::{ProductCatalog, ProductId, ProductRecord};

use super::error::InfraError;

/// Product store held entirely in memory.
///
/// Variation ids are derived from the parent links of the stored records.
/// Taking the catalog offline makes every lookup fail, which is how lookup
/// failures are exercised.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    products: HashMap<ProductId, ProductRecord>,
    offline: AtomicBool,
}

impl InMemoryCatalog {
    pub fn new(products: impl IntoIterator<Item = ProductRecord>) -> Self {
        Self {
            products: products.into_iter().map(|p| (p.id, p)).collect(),
            offline: AtomicBool::new(false),
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }

    fn ensure_online(&self) -> Result<(), CatalogError> {
        if self.offline.load(Ordering::Relaxed) {
            return Err(CatalogError::unavailable("in-memory catalog is offline"));
        }
        Ok(())
    }
}

#[async_trait]
impl ProductCatalog for InMemoryCatalog {
    async fn find_product(&self, id: ProductId) -> Result<Option<ProductRecord>, CatalogError> {
        self.ensure_online()?;
        Ok(self.products.get(&id).cloned())
    }

    async fn variation_ids(&self, parent_id: ProductId) -> Result<Vec<ProductId>, CatalogError> {
        self.ensure_online()?;
        let mut ids: Vec<ProductId> = self
            .products
            .values()
            .filter(|product| product.parent() == Some(parent_id))
            .map(|product| product.id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }
}

/// A cache entry present before the events run.
///
/// Either `key` names a logical key directly, or `prefix` and `params` are
/// hashed into a list query key.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedEntry {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub params: Option<serde_json::Value>,
    pub value: serde_json::Value,
}

impl SeedEntry {
    pub fn resolve_key(&self) -> Result<String, InfraError> {
        if let Some(key) = self.key.as_ref() {
            return Ok(key.clone());
        }
        let prefix = self.prefix.as_deref().ok_or_else(|| {
            InfraError::configuration("seed entry needs either `key` or `prefix`")
        })?;
        let params = self
            .params
            .clone()
            .unwrap_or_else(|| serde_json::Value::Object(Default::default()));
        Ok(generate_key_from(prefix, &params)?)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Fixture {
    pub products: Vec<ProductRecord>,
    pub entries: Vec<SeedEntry>,
    pub events: Vec<MutationEvent>,
}

impl Fixture {
    pub async fn load(path: &Path) -> Result<Self, InfraError> {
        let raw = tokio::fs::read_to_string(path).await?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, InfraError> {
        Ok(toml::from_str(raw)?)
    }

    /// Seed a fresh cache, run every event in order, and report the result.
    pub async fn replay(self, config: CacheConfig) -> Result<ReplayReport, InfraError> {
        let backend = Arc::new(MemoryBackend::new(&config));
        let catalog = Arc::new(InMemoryCatalog::new(self.products));
        let prefix = config.key_prefix.clone();
        let service = Arc::new(CacheService::new(config, backend.clone()).with_catalog(catalog));
        let coordinator = InvalidationCoordinator::new(service.clone());

        for entry in &self.entries {
            let key = entry.resolve_key()?;
            let stored = service.set(&key, &entry.value, None);
            debug!(key = %key, stored, "Seeded cache entry");
        }

        let events = self.events.len();
        for event in self.events {
            coordinator.handle(event).await;
        }
        info!(events, "Fixture replay complete");

        let mut remaining_keys: Vec<String> = backend
            .keys()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|key| key.strip_prefix(prefix.as_str()).map(str::to_string))
            .collect();
        remaining_keys.sort();

        Ok(ReplayReport {
            cache: service.stats(),
            invalidation: coordinator.stats(),
            remaining_keys,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub cache: CacheStats,
    pub invalidation: InvalidationStats,
    pub remaining_keys: Vec<String>,
}
