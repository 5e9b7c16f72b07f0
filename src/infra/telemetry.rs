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

/// Install a global tracing subscriber using the provided logging settings.
///
/// Logs go to stderr so command output on stdout stays machine-readable.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(false)
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

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "bahk_bookmark_cache_hit_total",
            Unit::Count,
            "Total number of bookmark cache hits."
        );
        describe_counter!(
            "bahk_bookmark_cache_miss_total",
            Unit::Count,
            "Total number of bookmark cache misses, including degraded reads."
        );
        describe_counter!(
            "bahk_bookmark_cache_error_total",
            Unit::Count,
            "Total number of bookmark cache backend failures and timeouts."
        );
        describe_counter!(
            "bahk_bookmark_cache_preload_total",
            Unit::Count,
            "Total number of bookmark sets preloaded from the database."
        );
        describe_histogram!(
            "bahk_bookmark_cache_op_ms",
            Unit::Milliseconds,
            "Bookmark cache backend operation latency in milliseconds."
        );
    });
}
