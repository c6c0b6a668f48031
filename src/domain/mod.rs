//! Domain layer types consumed from the host catalog.

pub mod error;
pub mod products;
