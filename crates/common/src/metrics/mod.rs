//! Metrics and observability utilities
//!
//! Prometheus metrics for the gateway, lifecycle engine and PDF export.

use crate::errors::AppError;
use crate::lifecycle::LifecycleAction;
use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all CMR metrics
pub const METRICS_PREFIX: &str = "cmr";

/// Histogram buckets for request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000,
];

/// Buckets for PDF rendering, which waits on image downloads
pub const EXPORT_BUCKETS: &[f64] = &[0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.00, 30.00];

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
        format!("{}_lifecycle_transitions_total", METRICS_PREFIX),
        Unit::Count,
        "Lifecycle actions applied"
    );

    describe_counter!(
        format!("{}_lifecycle_rejections_total", METRICS_PREFIX),
        Unit::Count,
        "Lifecycle actions refused by a precondition"
    );

    describe_counter!(
        format!("{}_exports_total", METRICS_PREFIX),
        Unit::Count,
        "PDF exports by outcome"
    );

    describe_histogram!(
        format!("{}_export_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "PDF export latency in seconds"
    );

    describe_counter!(
        format!("{}_export_images_total", METRICS_PREFIX),
        Unit::Count,
        "Images embedded in exports, by outcome"
    );

    describe_counter!(
        format!("{}_storage_operations_total", METRICS_PREFIX),
        Unit::Count,
        "Object storage calls by operation and status"
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

pub fn record_transition(action: LifecycleAction) {
    counter!(
        format!("{}_lifecycle_transitions_total", METRICS_PREFIX),
        "action" => action.as_str()
    )
    .increment(1);
}

pub fn record_rejection(action: LifecycleAction, error: &AppError) {
    counter!(
        format!("{}_lifecycle_rejections_total", METRICS_PREFIX),
        "action" => action.as_str(),
        "reason" => rejection_reason(error)
    )
    .increment(1);
}

fn rejection_reason(error: &AppError) -> &'static str {
    match error {
        AppError::MissingShipperSignature => "missing_shipper_signature",
        AppError::InvalidTransition { .. } => "invalid_transition",
        AppError::DocumentNotFound { .. } => "not_found",
        _ => "other",
    }
}

/// Record one export; `outcome` is `success` or `error`
pub fn record_export(duration_secs: f64, success: bool) {
    let outcome = if success { "success" } else { "error" };

    counter!(
        format!("{}_exports_total", METRICS_PREFIX),
        "outcome" => outcome
    )
    .increment(1);

    if success {
        histogram!(format!("{}_export_duration_seconds", METRICS_PREFIX)).record(duration_secs);
    }
}

/// `embedded` or `placeholder`
pub fn record_export_image(embedded: bool) {
    let outcome = if embedded { "embedded" } else { "placeholder" };
    counter!(
        format!("{}_export_images_total", METRICS_PREFIX),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_storage(operation: &'static str, success: bool) {
    let status = if success { "success" } else { "error" };
    counter!(
        format!("{}_storage_operations_total", METRICS_PREFIX),
        "operation" => operation,
        "status" => status
    )
    .increment(1);
}
