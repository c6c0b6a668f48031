//! Backend store contract.
//!
//! The persistent cache of the host platform is wrapped behind this trait so
//! the service can be built over an in-memory store in tests and over the
//! real thing in production.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cache backend operation `{op}` failed: {message}")]
    Operation { op: &'static str, message: String },
}

impl BackendError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    pub fn operation(op: &'static str, message: impl Into<String>) -> Self {
        Self::Operation {
            op,
            message: message.into(),
        }
    }
}

/// TTL-capable key-value store.
///
/// Single-key operations are expected to be atomic. Expiry is the backend's
/// job; callers never see an expired entry as a hit.
pub trait CacheBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, BackendError>;

    fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), BackendError>;

    /// Deleting an absent key succeeds.
    fn delete(&self, key: &str) -> Result<(), BackendError>;

    /// All live keys, in no particular order.
    fn keys(&self) -> Result<Vec<String>, BackendError>;

    fn is_available(&self) -> bool {
        true
    }
}

/// Backend standing in for a platform cache that never came up.
///
/// Every call fails with [`BackendError::Unavailable`].
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableBackend;

impl CacheBackend for UnavailableBackend {
    fn get(&self, _key: &str) -> Result<Option<Value>, BackendError> {
        Err(BackendError::unavailable("backend not initialized"))
    }

    fn set(&self, _key: &str, _value: Value, _ttl: Duration) -> Result<(), BackendError> {
        Err(BackendError::unavailable("backend not initialized"))
    }

    fn delete(&self, _key: &str) -> Result<(), BackendError> {
        Err(BackendError::unavailable("backend not initialized"))
    }

    fn keys(&self) -> Result<Vec<String>, BackendError> {
        Err(BackendError::unavailable("backend not initialized"))
    }

    fn is_available(&self) -> bool {
        false
    }
}
