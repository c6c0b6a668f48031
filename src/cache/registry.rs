//! Bidirectional dependency registry.
//!
//! Tracks which cached keys were built from which domain entities, so a
//! change to an entity can reach keys whose names (hashed list queries) do
//! not reveal what they contain.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use super::keys::EntityKey;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::registry";

#[derive(Default)]
struct Mappings {
    entity_to_keys: HashMap<EntityKey, HashSet<String>>,
    key_to_entities: HashMap<String, HashSet<EntityKey>>,
}

/// Tracks entity → cache keys and cache key → entities mappings.
///
/// Both directions live behind one lock so they can never disagree.
pub struct CacheRegistry {
    mappings: RwLock<Mappings>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self {
            mappings: RwLock::new(Mappings::default()),
        }
    }

    /// Register a cache key with the entities it depends on.
    ///
    /// Replaces any previous registration of the same key.
    pub fn register(&self, cache_key: &str, entities: HashSet<EntityKey>) {
        let mut mappings = rw_write(&self.mappings, SOURCE, "register");
        detach(&mut mappings, cache_key);

        for entity in &entities {
            mappings
                .entity_to_keys
                .entry(entity.clone())
                .or_default()
                .insert(cache_key.to_string());
        }
        mappings
            .key_to_entities
            .insert(cache_key.to_string(), entities);
    }

    /// Forget a cache key and clean up its entity mappings.
    pub fn unregister(&self, cache_key: &str) {
        let mut mappings = rw_write(&self.mappings, SOURCE, "unregister");
        detach(&mut mappings, cache_key);
    }

    /// Remove every key registered against an entity.
    ///
    /// Returns the keys that were registered; each is forgotten entirely,
    /// since the caller is about to delete it.
    pub fn take_entity(&self, entity: &EntityKey) -> HashSet<String> {
        let mut mappings = rw_write(&self.mappings, SOURCE, "take_entity");
        let keys = mappings.entity_to_keys.remove(entity).unwrap_or_default();
        for key in &keys {
            detach(&mut mappings, key);
        }
        keys
    }

    pub fn clear(&self) {
        let mut mappings = rw_write(&self.mappings, SOURCE, "clear");
        mappings.entity_to_keys.clear();
        mappings.key_to_entities.clear();
    }

    /// Forget every registered key that is not in `live`.
    ///
    /// Entries that expired or were evicted from the backend leave their
    /// registration behind; this drops those. Returns how many were dropped.
    pub fn retain_keys(&self, live: &HashSet<&str>) -> usize {
        let mut mappings = rw_write(&self.mappings, SOURCE, "retain_keys");
        let stale: Vec<String> = mappings
            .key_to_entities
            .keys()
            .filter(|key| !live.contains(key.as_str()))
            .cloned()
            .collect();
        for key in &stale {
            detach(&mut mappings, key);
        }
        stale.len()
    }

    pub fn key_count(&self) -> usize {
        rw_read(&self.mappings, SOURCE, "key_count")
            .key_to_entities
            .len()
    }
}

impl Default for CacheRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn detach(mappings: &mut Mappings, cache_key: &str) {
    let Some(entities) = mappings.key_to_entities.remove(cache_key) else {
        return;
    };
    for entity in entities {
        if let Some(keys) = mappings.entity_to_keys.get_mut(&entity) {
            keys.remove(cache_key);
            if keys.is_empty() {
                mappings.entity_to_keys.remove(&entity);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deps(entities: &[EntityKey]) -> HashSet<EntityKey> {
        entities.iter().cloned().collect()
    }

    fn entity_count(registry: &CacheRegistry) -> usize {
        rw_read(&registry.mappings, SOURCE, "entity_count")
            .entity_to_keys
            .len()
    }

    #[test]
    fn register_then_take() {
        let registry = CacheRegistry::new();
        registry.register(
            "products_abc",
            deps(&[EntityKey::Category(5), EntityKey::ProductLists]),
        );

        let taken = registry.take_entity(&EntityKey::ProductLists);
        assert!(taken.contains("products_abc"));
        assert_eq!(entity_count(&registry), 0);
    }

    #[test]
    fn unregister_cleans_up_mappings() {
        let registry = CacheRegistry::new();
        registry.register("product_1", deps(&[EntityKey::Product(1)]));
        assert_eq!(registry.key_count(), 1);
        assert_eq!(entity_count(&registry), 1);

        registry.unregister("product_1");
        assert_eq!(registry.key_count(), 0);
        assert_eq!(entity_count(&registry), 0);
    }

    #[test]
    fn reregistering_replaces_dependencies() {
        let registry = CacheRegistry::new();
        registry.register("products_abc", deps(&[EntityKey::Category(5)]));
        registry.register("products_abc", deps(&[EntityKey::Category(6)]));

        assert!(registry.take_entity(&EntityKey::Category(5)).is_empty());
        assert_eq!(registry.take_entity(&EntityKey::Category(6)).len(), 1);
    }

    #[test]
    fn take_entity_returns_and_forgets_keys() {
        let registry = CacheRegistry::new();
        registry.register(
            "products_a",
            deps(&[EntityKey::Category(5), EntityKey::Product(1)]),
        );
        registry.register("products_b", deps(&[EntityKey::Category(5)]));

        let taken = registry.take_entity(&EntityKey::Category(5));
        assert_eq!(taken.len(), 2);
        assert!(taken.contains("products_a"));
        assert!(taken.contains("products_b"));

        // The dropped keys no longer hang off their other entities.
        assert!(registry.take_entity(&EntityKey::Product(1)).is_empty());
        assert_eq!(registry.key_count(), 0);
    }

    #[test]
    fn retain_keys_drops_dead_registrations() {
        let registry = CacheRegistry::new();
        registry.register("products_a", deps(&[EntityKey::Category(5)]));
        registry.register("products_b", deps(&[EntityKey::Category(5)]));
        registry.register("products_c", deps(&[EntityKey::Category(6)]));

        let live: HashSet<&str> = ["products_b"].into_iter().collect();
        assert_eq!(registry.retain_keys(&live), 2);
        assert_eq!(registry.key_count(), 1);
        assert_eq!(entity_count(&registry), 1);
        assert_eq!(
            registry.take_entity(&EntityKey::Category(5)),
            HashSet::from(["products_b".to_string()])
        );
    }

    #[test]
    fn clear_removes_all_mappings() {
        let registry = CacheRegistry::new();
        registry.register("category_5", deps(&[EntityKey::Category(5)]));
        registry.clear();
        assert_eq!(registry.key_count(), 0);
        assert_eq!(entity_count(&registry), 0);
    }
}
