//! Product relationship model.
//!
//! The cache layer never owns product data. It only needs to know how a
//! product relates to others: a variation points at its variable parent, a
//! variable product enumerates its variations, and any product may sit in
//! categories.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::CatalogError;

pub type ProductId = u64;
pub type CategoryId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductKind {
    Simple,
    Variable,
    Variation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: ProductId,
    pub kind: ProductKind,
    /// Parent reference; only meaningful for variations.
    #[serde(default)]
    pub parent_id: Option<ProductId>,
    /// Categories the product is listed under.
    #[serde(default)]
    pub category_ids: Vec<CategoryId>,
}

impl ProductRecord {
    pub fn simple(id: ProductId) -> Self {
        Self {
            id,
            kind: ProductKind::Simple,
            parent_id: None,
            category_ids: Vec::new(),
        }
    }

    pub fn variable(id: ProductId) -> Self {
        Self {
            id,
            kind: ProductKind::Variable,
            parent_id: None,
            category_ids: Vec::new(),
        }
    }

    pub fn variation(id: ProductId, parent_id: ProductId) -> Self {
        Self {
            id,
            kind: ProductKind::Variation,
            parent_id: Some(parent_id),
            category_ids: Vec::new(),
        }
    }

    pub fn with_categories(mut self, category_ids: impl Into<Vec<CategoryId>>) -> Self {
        self.category_ids = category_ids.into();
        self
    }

    pub fn is_variation(&self) -> bool {
        self.kind == ProductKind::Variation
    }

    /// Parent of a variation, ignoring the zero id the host uses for "none".
    pub fn parent(&self) -> Option<ProductId> {
        if !self.is_variation() {
            return None;
        }
        self.parent_id.filter(|id| *id != 0)
    }
}

/// Read access to the host product store.
///
/// Implementations wrap whatever the host offers (a database, an HTTP API, a
/// fixture). `Ok(None)` means the product does not exist, which is a normal
/// outcome after a delete.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn find_product(&self, id: ProductId) -> Result<Option<ProductRecord>, CatalogError>;

    async fn variation_ids(&self, parent_id: ProductId) -> Result<Vec<ProductId>, CatalogError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variation_exposes_parent() {
        let variation = ProductRecord::variation(11, 10);
        assert!(variation.is_variation());
        assert_eq!(variation.parent(), Some(10));
    }

    #[test]
    fn zero_parent_is_treated_as_none() {
        let orphan = ProductRecord::variation(11, 0);
        assert_eq!(orphan.parent(), None);
    }

    #[test]
    fn non_variations_have_no_parent() {
        let mut simple = ProductRecord::simple(5);
        simple.parent_id = Some(4);
        assert_eq!(simple.parent(), None);
        assert!(!ProductRecord::variable(6).is_variation());
    }

    #[test]
    fn kind_deserializes_from_snake_case() {
        let record: ProductRecord =
            serde_json::from_str(r#"{"id": 3, "kind": "variation", "parent_id": 1}"#)
                .expect("record should deserialize");
        assert_eq!(record.kind, ProductKind::Variation);
        assert!(record.category_ids.is_empty());
    }
}
