//! Catalog cache engine.
//!
//! Deterministic cache keys over request parameters, TTL storage behind a
//! pluggable backend, and dependency-aware invalidation across
//! product/variation/category/list relationships.

pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod infra;
