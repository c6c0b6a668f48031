//! Invalidation plan generation.
//!
//! Collects everything one invalidation call has to clear into a single,
//! deduplicated plan, so that shared list caches are swept once no matter
//! how many entities are involved.

use std::collections::BTreeSet;
use std::fmt;

use crate::domain::products::{CategoryId, ProductId};

use super::keys::{
    EntityKey, category_key, category_lists_pattern, product_key, product_lists_pattern,
    product_variations_key,
};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InvalidationPlan {
    /// Products whose own entry and variation list are cleared.
    pub products: BTreeSet<ProductId>,
    /// Categories whose own entry is cleared.
    pub categories: BTreeSet<CategoryId>,
    /// Sweep every product list query result.
    pub product_lists: bool,
    /// Sweep every category list query result.
    pub category_lists: bool,
    /// Extra glob patterns over logical keys.
    pub patterns: BTreeSet<String>,
}

impl fmt::Display for InvalidationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "InvalidationPlan {{ products: {}, categories: {}, product_lists: {}, \
             category_lists: {}, patterns: {} }}",
            self.products.len(),
            self.categories.len(),
            self.product_lists,
            self.category_lists,
            self.patterns.len(),
        )
    }
}

impl InvalidationPlan {
    /// Plan for a set of changed products. Duplicate ids collapse.
    pub fn for_products(ids: impl IntoIterator<Item = ProductId>) -> Self {
        Self {
            products: ids.into_iter().collect(),
            product_lists: true,
            ..Self::default()
        }
    }

    /// Plan for a set of changed categories.
    ///
    /// List query keys are hashed, so the lists filtered by a category cannot
    /// be told apart from the rest; every product and category list goes.
    pub fn for_categories(ids: impl IntoIterator<Item = CategoryId>) -> Self {
        Self {
            categories: ids.into_iter().collect(),
            product_lists: true,
            category_lists: true,
            ..Self::default()
        }
    }

    pub fn for_pattern(pattern: impl Into<String>) -> Self {
        Self {
            patterns: BTreeSet::from([pattern.into()]),
            ..Self::default()
        }
    }

    pub fn add_product(&mut self, id: ProductId) {
        self.products.insert(id);
    }

    /// Clear a category's own entry and its registered dependents without
    /// adding a category list sweep.
    pub fn add_category(&mut self, id: CategoryId) {
        self.categories.insert(id);
    }

    /// Logical keys named directly by the plan.
    pub fn direct_keys(&self) -> BTreeSet<String> {
        let mut keys = BTreeSet::new();
        for id in &self.products {
            keys.insert(product_key(*id));
            keys.insert(product_variations_key(*id));
        }
        for id in &self.categories {
            keys.insert(category_key(*id));
        }
        keys
    }

    /// Glob patterns to sweep, lists included. Empty patterns are dropped.
    pub fn sweep_patterns(&self) -> Vec<String> {
        let mut patterns: Vec<String> = self
            .patterns
            .iter()
            .filter(|pattern| !pattern.is_empty())
            .cloned()
            .collect();
        if self.product_lists {
            patterns.push(product_lists_pattern());
        }
        if self.category_lists {
            patterns.push(category_lists_pattern());
        }
        patterns
    }

    /// Entities whose registered dependents must go too.
    pub fn entities(&self) -> Vec<EntityKey> {
        let mut entities: Vec<EntityKey> = self
            .products
            .iter()
            .map(|id| EntityKey::Product(*id))
            .chain(self.categories.iter().map(|id| EntityKey::Category(*id)))
            .collect();
        if self.product_lists {
            entities.push(EntityKey::ProductLists);
        }
        if self.category_lists {
            entities.push(EntityKey::CategoryLists);
        }
        entities
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
            && self.categories.is_empty()
            && !self.product_lists
            && !self.category_lists
            && self.patterns.iter().all(String::is_empty)
    }
}
