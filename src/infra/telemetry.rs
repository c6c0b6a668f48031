use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings,
/// and describe the cache metrics to whichever recorder is installed.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    // stdout carries `key` and `replay` output; logs stay on stderr.
    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

/// Counters emitted by the cache, with their descriptions.
const COUNTERS: &[(&str, &str)] = &[
    (
        "catalog_cache_hit_total",
        "Total number of cache reads served from the backend.",
    ),
    (
        "catalog_cache_miss_total",
        "Total number of cache reads that found nothing usable.",
    ),
    (
        "catalog_cache_write_total",
        "Total number of entries written to the backend.",
    ),
    (
        "catalog_cache_evict_total",
        "Total number of in-memory entries evicted due to capacity.",
    ),
    (
        "catalog_cache_invalidated_keys_total",
        "Total number of keys deleted by invalidation, by action.",
    ),
    (
        "catalog_cache_backend_error_total",
        "Total number of failed backend operations, by operation.",
    ),
    (
        "catalog_cache_events_total",
        "Total number of mutation events handled, by action.",
    ),
];

const INVALIDATION_LATENCY: &str = "catalog_cache_invalidation_ms";

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        for &(name, description) in COUNTERS {
            describe_counter!(name, Unit::Count, description);
        }
        describe_histogram!(
            INVALIDATION_LATENCY,
            Unit::Milliseconds,
            "Invalidation latency in milliseconds, by action."
        );
    });
}
