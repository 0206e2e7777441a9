use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::cache::{
    METRIC_FEED_HIT, METRIC_FEED_MISS, METRIC_FEED_STALE, METRIC_GENERATE_MS,
    METRIC_REFRESH_FAILURE, METRIC_REFRESH_SKIPPED, METRIC_REFRESH_SUCCESS,
};
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
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
            METRIC_FEED_HIT,
            Unit::Count,
            "Total number of feed reads served from a fresh or stale record."
        );
        describe_counter!(
            METRIC_FEED_MISS,
            Unit::Count,
            "Total number of feed reads that generated content inline."
        );
        describe_counter!(
            METRIC_FEED_STALE,
            Unit::Count,
            "Total number of feed reads served from a stale record."
        );
        describe_counter!(
            METRIC_REFRESH_SUCCESS,
            Unit::Count,
            "Total number of background refreshes that replaced the record."
        );
        describe_counter!(
            METRIC_REFRESH_FAILURE,
            Unit::Count,
            "Total number of background refreshes that failed."
        );
        describe_counter!(
            METRIC_REFRESH_SKIPPED,
            Unit::Count,
            "Total number of stale reads that found a refresh already running."
        );
        describe_histogram!(
            METRIC_GENERATE_MS,
            Unit::Milliseconds,
            "Feed generation latency in milliseconds."
        );
    });
}
