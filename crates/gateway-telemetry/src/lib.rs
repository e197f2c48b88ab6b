//! # Gateway Telemetry
//!
//! Logging and metrics for the query gateway.
//!
//! ## Components
//!
//! - **Logging:** `tracing-subscriber` registry with an `EnvFilter` and a
//!   human-readable or JSON `fmt` layer
//! - **Metrics:** Prometheus counters and gauges in a process-wide registry
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gateway_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() -> Result<(), gateway_telemetry::TelemetryError> {
//!     let _guard = init_telemetry(&TelemetryConfig::from_env())?;
//!     // queries dispatched from here on are logged and counted
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OTEL_SERVICE_NAME` | `query-gateway` | Service name attached to logs |
//! | `QG_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `QG_JSON_LOGS` | `false` (`true` in containers) | JSON formatted logs |

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{
    gather_text, register_metrics, HistogramTimer, MetricsHandle, ACTIVE_SUBSCRIPTIONS,
    INTERCEPTOR_REGISTRATIONS, QUERIES_DISPATCHED, QUERY_DURATION, QUERY_FAILURES,
    SCATTER_GATHER_RESPONSES,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging and register metrics.
///
/// The returned guard keeps the metrics registry handle alive.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    config.validate()?;

    // Metrics first, so nothing logged during startup goes uncounted
    let metrics = register_metrics()?;
    init_logging(config)?;

    tracing::info!(
        service = %config.service_name,
        json_logs = config.json_logs,
        "Telemetry initialized"
    );

    Ok(TelemetryGuard { _metrics: metrics })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    _metrics: MetricsHandle,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry...");
    }
}

/// Log a query-related event with standard fields.
///
/// ```rust,ignore
/// log_query_event!(debug, "single", query.query_name(), "Dispatching query",
///     message_id = %query.id());
/// ```
#[macro_export]
macro_rules! log_query_event {
    ($level:ident, $mode:expr, $query_name:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            query_mode = $mode,
            query_name = %$query_name,
            $($($field)*,)?
            $msg
        )
    };
}

/// Increment a metric, optionally selecting label values.
#[macro_export]
macro_rules! metric_inc {
    ($metric:expr) => {
        $metric.inc()
    };
    ($metric:expr, $labels:expr) => {
        $metric.with_label_values($labels).inc()
    };
}
