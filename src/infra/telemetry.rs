use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::application::fetch::{METRIC_FETCH_ATTEMPT_MS, METRIC_FETCH_RETRY};
use crate::cache::METRIC_LOCK_POISONED;
use crate::cache::monitor::{
    METRIC_DROPPED, METRIC_EVICT, METRIC_EXPIRE, METRIC_HIT, METRIC_MISS, METRIC_QUEUE_LEN,
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

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(METRIC_HIT, Unit::Count, "Cache hits per category.");
        describe_counter!(
            METRIC_MISS,
            Unit::Count,
            "Cache misses per category, including expired entries."
        );
        describe_counter!(
            METRIC_EVICT,
            Unit::Count,
            "Entries evicted to stay within category capacity."
        );
        describe_counter!(
            METRIC_EXPIRE,
            Unit::Count,
            "Entries removed after their TTL elapsed."
        );
        describe_counter!(
            METRIC_DROPPED,
            Unit::Count,
            "Monitoring signals dropped because the queue was full or busy."
        );
        describe_gauge!(
            METRIC_QUEUE_LEN,
            Unit::Count,
            "Pending monitoring signals after the last drain."
        );
        describe_counter!(
            METRIC_LOCK_POISONED,
            Unit::Count,
            "Cache locks recovered after a panic while held."
        );
        describe_histogram!(
            METRIC_FETCH_ATTEMPT_MS,
            Unit::Milliseconds,
            "Latency of individual upstream fetch attempts."
        );
        describe_counter!(
            METRIC_FETCH_RETRY,
            Unit::Count,
            "Upstream fetch attempts retried after a transient failure."
        );
    });
}
