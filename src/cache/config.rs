//! Cache configuration.
//!
//! Read once when the service is built; changing it means building a new
//! service.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

// Default values for cache configuration
const DEFAULT_TTL_SECONDS: u64 = 3600;
pub(crate) const DEFAULT_KEY_PREFIX: &str = "wcapi_";
const DEFAULT_MEMORY_CAPACITY: usize = 10_000;
const DEFAULT_INVALIDATION_LOG_CAPACITY: usize = 1000;
const DEFAULT_RECENT_ACTIVITY_LIMIT: usize = 20;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Master switch. Disabled reads always miss and writes are no-ops.
    pub enabled: bool,
    /// Default time-to-live for stored entries, in seconds.
    pub ttl_seconds: u64,
    /// Namespace prepended to every backend key.
    pub key_prefix: String,
    /// Maximum entries held by the in-memory backend.
    pub memory_capacity: usize,
    /// Maximum records kept in the invalidation log.
    pub invalidation_log_capacity: usize,
    /// Records returned as recent activity in invalidation stats.
    pub recent_activity_limit: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: DEFAULT_TTL_SECONDS,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
            invalidation_log_capacity: DEFAULT_INVALIDATION_LOG_CAPACITY,
            recent_activity_limit: DEFAULT_RECENT_ACTIVITY_LIMIT,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            ttl_seconds: settings.ttl.as_secs(),
            key_prefix: settings.key_prefix.clone(),
            memory_capacity: settings.memory_capacity.get(),
            invalidation_log_capacity: settings.invalidation_log_capacity.get(),
            recent_activity_limit: settings.recent_activity_limit,
        }
    }
}

impl CacheConfig {
    /// Default TTL, clamped to one second if configured as zero.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds.max(1))
    }

    /// Returns the memory capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn memory_capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.memory_capacity).unwrap_or(NonZeroUsize::MIN)
    }

    /// Returns the log capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn invalidation_log_capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.invalidation_log_capacity).unwrap_or(NonZeroUsize::MIN)
    }
}
