//! Prometheus metrics for engagement-service

use actix_web::HttpResponse;
use prometheus::{Encoder, IntCounterVec, TextEncoder};

lazy_static::lazy_static! {
    pub static ref ENGAGEMENT_OPERATIONS_TOTAL: IntCounterVec = prometheus::register_int_counter_vec!(
        "engagement_operations_total",
        "Engagement toggle requests by kind, operation and outcome",
        &["kind", "op", "outcome"]
    ).expect("engagement_operations_total registers once");

    pub static ref COUNTER_DRIFT_TOTAL: IntCounterVec = prometheus::register_int_counter_vec!(
        "engagement_counter_drift_total",
        "Counter adjustments that failed after the event write was confirmed",
        &["kind"]
    ).expect("engagement_counter_drift_total registers once");

    pub static ref RECONCILED_COUNTERS_TOTAL: IntCounterVec = prometheus::register_int_counter_vec!(
        "engagement_reconciled_counters_total",
        "Counters recomputed from the event log",
        &["kind", "outcome"]
    ).expect("engagement_reconciled_counters_total registers once");
}

/// GET /metrics
pub async fn metrics_handler() -> HttpResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(err) = encoder.encode(&prometheus::gather(), &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
