//! Metrics and observability utilities
//!
//! Prometheus-style counters and histograms for requests, entitlement
//! checks, portal validations and the AI relay.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all Casedesk metrics
pub const METRICS_PREFIX: &str = "casedesk";

/// Histogram buckets for request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    10.00,  // 10s - AI relay calls land here
    30.00,  // 30s
];

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    describe_counter!(
        format!("{}_entitlement_checks_total", METRICS_PREFIX),
        Unit::Count,
        "Entitlement checks by action and outcome"
    );

    describe_counter!(
        format!("{}_portal_validations_total", METRICS_PREFIX),
        Unit::Count,
        "Portal token validations by outcome"
    );

    describe_counter!(
        format!("{}_portal_grants_issued_total", METRICS_PREFIX),
        Unit::Count,
        "Portal grants issued"
    );

    describe_counter!(
        format!("{}_relay_requests_total", METRICS_PREFIX),
        Unit::Count,
        "AI relay requests by upstream outcome"
    );

    describe_histogram!(
        format!("{}_relay_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "AI relay upstream latency in seconds"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

pub fn record_entitlement_check(action: &'static str, allowed: bool) {
    counter!(
        format!("{}_entitlement_checks_total", METRICS_PREFIX),
        "action" => action,
        "allowed" => if allowed { "true" } else { "false" }
    )
    .increment(1);
}

/// `outcome` is one of granted, missing, invalid, expired, unavailable
pub fn record_portal_validation(outcome: &'static str) {
    counter!(
        format!("{}_portal_validations_total", METRICS_PREFIX),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_grant_issued() {
    counter!(format!("{}_portal_grants_issued_total", METRICS_PREFIX)).increment(1);
}

pub fn record_relay(duration_secs: f64, upstream_status: u16) {
    counter!(
        format!("{}_relay_requests_total", METRICS_PREFIX),
        "status" => upstream_status.to_string()
    )
    .increment(1);

    histogram!(format!("{}_relay_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}
