//! Catalog Cache System
//!
//! Caches product, variation, category and list query results behind a
//! pluggable backend, and keeps them correct as the catalog changes:
//!
//! - **Keys**: deterministic `{prefix}_{digest}` keys over request parameters
//! - **Service**: get/set/delete/flush plus targeted and bulk invalidation
//! - **Coordinator**: mutation events to invalidation calls, with an audit log
//!
//! ## Configuration
//!
//! Cache behavior is controlled via `catalog-cache.toml`:
//!
//! ```toml
//! [cache]
//! enabled = true
//! ttl_seconds = 3600
//! key_prefix = "wcapi_"
//! # ... see config.rs for all options
//! ```

mod backend;
mod config;
mod coordinator;
mod events;
mod keys;
mod lock;
mod planner;
mod registry;
mod service;
mod stats;
mod store;

pub use backend::{BackendError, CacheBackend, UnavailableBackend};
pub use config::CacheConfig;
pub use coordinator::InvalidationCoordinator;
pub use events::{
    InvalidationAction, InvalidationLog, InvalidationRecord, InvalidationStats, MutationEvent,
};
pub use keys::{
    CATEGORY_LIST_PREFIX, EntityKey, KeyError, PRODUCT_LIST_PREFIX, ParamValue, category_key,
    category_lists_pattern, generate_key, generate_key_from, matches_pattern, product_key,
    product_lists_pattern, product_variations_key,
};
pub use planner::InvalidationPlan;
pub use registry::CacheRegistry;
pub use service::{CacheService, InvalidationOutcome};
pub use stats::{BulkOperationStats, CacheStats};
pub use store::MemoryBackend;
