use std::sync::Once;

use metrics::{Unit, describe_counter};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install the global tracing subscriber. `RUST_LOG` refines the configured
/// base level when set.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(ErrorLayer::default());

    let result = match logging.format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(true),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_target(true))
            .try_init(),
    };

    result
        .map_err(|err| InfraError::telemetry(format!("failed to install tracing subscriber: {err}")))
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "jairo_stats_flush_total",
            Unit::Count,
            "Total number of successful counter flushes to the store."
        );
        describe_counter!(
            "jairo_stats_flush_error_total",
            Unit::Count,
            "Total number of counter flushes that failed and were retried on the next tick."
        );
        describe_counter!(
            "jairo_snapshot_refresh_total",
            Unit::Count,
            "Total number of homepage snapshot refreshes."
        );
        describe_counter!(
            "jairo_snapshot_refresh_error_total",
            Unit::Count,
            "Total number of homepage snapshot refreshes that failed to render."
        );
    });
}
