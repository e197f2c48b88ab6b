//! Prometheus metrics for the query gateway.
//!
//! All metrics follow the naming convention: `qg_<area>_<metric>_<unit>`

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder, DEFAULT_BUCKETS,
};
use std::sync::Arc;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // DISPATCH METRICS
    // =========================================================================

    /// Queries handed to the bus, by delivery mode
    pub static ref QUERIES_DISPATCHED: IntCounterVec = IntCounterVec::new(
        Opts::new("qg_queries_dispatched_total", "Queries dispatched to the query bus"),
        &["mode"]  // mode: single/scatter_gather/subscription
    ).expect("metric creation failed");

    /// Failed queries, by delivery mode and error kind
    pub static ref QUERY_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("qg_query_failures_total", "Queries that completed with an error"),
        &["mode", "kind"]
    ).expect("metric creation failed");

    /// Single query latency
    pub static ref QUERY_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "qg_query_duration_seconds",
            "Time from dispatch to a single query's result"
        ).buckets(
            exponential_buckets(0.0005, 2.0, 14).unwrap_or_else(|_| DEFAULT_BUCKETS.to_vec())
        ),
        &["mode"]
    ).expect("metric creation failed");

    /// Results received from scatter-gather handlers
    pub static ref SCATTER_GATHER_RESPONSES: IntCounter = IntCounter::new(
        "qg_scatter_gather_responses_total",
        "Results received from scatter-gather handlers"
    ).expect("metric creation failed");

    // =========================================================================
    // SUBSCRIPTION METRICS
    // =========================================================================

    /// Subscriptions not yet cancelled, completed or failed
    pub static ref ACTIVE_SUBSCRIPTIONS: IntGauge = IntGauge::new(
        "qg_subscriptions_active",
        "Number of currently active subscription queries"
    ).expect("metric creation failed");

    // =========================================================================
    // INTERCEPTOR METRICS
    // =========================================================================

    /// Interceptors registered at runtime, by chain
    pub static ref INTERCEPTOR_REGISTRATIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("qg_interceptor_registrations_total", "Interceptors registered at runtime"),
        &["chain"]  // chain: dispatch/result
    ).expect("metric creation failed");
}

/// Handle to the registry the metrics were registered with
pub struct MetricsHandle {
    _registry: Arc<Registry>,
}

/// Register all metrics with the global registry.
///
/// Safe to call more than once; metrics already registered are skipped.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Dispatch
        Box::new(QUERIES_DISPATCHED.clone()),
        Box::new(QUERY_FAILURES.clone()),
        Box::new(QUERY_DURATION.clone()),
        Box::new(SCATTER_GATHER_RESPONSES.clone()),
        // Subscriptions
        Box::new(ACTIVE_SUBSCRIPTIONS.clone()),
        // Interceptors
        Box::new(INTERCEPTOR_REGISTRATIONS.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle {
        _registry: Arc::new(REGISTRY.clone()),
    })
}

/// Encode all metrics as Prometheus text format.
pub fn gather_text() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: prometheus::Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start a timer for `mode` on the query duration histogram.
    pub fn query(mode: &str) -> Self {
        Self {
            histogram: QUERY_DURATION.with_label_values(&[mode]),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.observe(duration);
    }
}
