//! Prometheus metrics for conference-billing.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// Invoices written, by kind (original, version, company).
pub static INVOICES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "billing_invoices_total",
        "Total number of invoices issued by kind",
        &["kind"]
    )
    .expect("Failed to register invoices_total")
});

/// E-invoice gateway calls by operation and outcome.
pub static EINVOICE_SUBMISSIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "billing_einvoice_submissions_total",
        "Total number of e-invoice submissions by operation and outcome",
        &["operation", "outcome"] // submit|reverse, success|failure
    )
    .expect("Failed to register einvoice_submissions_total")
});

/// Hosted checkout calls by operation and outcome.
pub static CHECKOUT_REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "billing_checkout_requests_total",
        "Total number of payment gateway calls by operation and outcome",
        &["operation", "outcome"]
    )
    .expect("Failed to register checkout_requests_total")
});

/// Paid amounts recorded, by currency and source.
pub static PAYMENT_AMOUNT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "billing_payment_amount_total",
        "Total payment amount by currency and source",
        &["currency", "source"]
    )
    .expect("Failed to register payment_amount_total")
});

/// Receipt deliveries by outcome.
pub static RECEIPTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "billing_receipts_total",
        "Total number of receipt deliveries by outcome",
        &["outcome"]
    )
    .expect("Failed to register receipts_total")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "billing_errors_total",
        "Total number of errors by type",
        &["error_type"]
    )
    .expect("Failed to register errors_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "billing_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// External call duration (e-invoice and payment gateways).
pub static GATEWAY_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "billing_gateway_request_duration_seconds",
        "Outbound gateway request duration in seconds",
        &["gateway"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("Failed to register gateway_request_duration")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&INVOICES_TOTAL);
    Lazy::force(&EINVOICE_SUBMISSIONS_TOTAL);
    Lazy::force(&CHECKOUT_REQUESTS_TOTAL);
    Lazy::force(&PAYMENT_AMOUNT_TOTAL);
    Lazy::force(&RECEIPTS_TOTAL);
    Lazy::force(&ERRORS_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&GATEWAY_REQUEST_DURATION);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
