//! Telemetry configuration from environment variables.

use crate::TelemetryError;
use std::env;
use tracing_subscriber::EnvFilter;

/// Configuration for logging and metrics.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to every log line
    pub service_name: String,

    /// Log filter directive (`info`, `query_gateway=debug`, ...)
    pub log_level: String,

    /// Whether to enable JSON formatted logs
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "query-gateway".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `OTEL_SERVICE_NAME`: Service name (default: query-gateway)
    /// - `QG_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `QG_JSON_LOGS`: Enable JSON logs (default: false in dev, true in containers)
    pub fn from_env() -> Self {
        let is_container =
            env::var("KUBERNETES_SERVICE_HOST").is_ok() || env::var("DOCKER_CONTAINER").is_ok();

        Self {
            service_name: env::var("OTEL_SERVICE_NAME")
                .unwrap_or_else(|_| "query-gateway".to_string()),

            log_level: env::var("QG_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),

            json_logs: env::var("QG_JSON_LOGS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(is_container),
        }
    }

    /// Check that the log level is a valid filter directive.
    pub fn validate(&self) -> Result<(), TelemetryError> {
        if self.service_name.trim().is_empty() {
            return Err(TelemetryError::Config("service name cannot be empty".into()));
        }
        self.env_filter().map(|_| ())
    }

    pub(crate) fn env_filter(&self) -> Result<EnvFilter, TelemetryError> {
        EnvFilter::try_new(&self.log_level)
            .map_err(|e| TelemetryError::Config(format!("log level '{}': {e}", self.log_level)))
    }
}
