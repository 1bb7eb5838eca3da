//! Prometheus metrics for the order pipeline.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. Registration only
//! fails on duplicate metric names, a fatal configuration error that should
//! crash at startup rather than fail silently. These panics occur during
//! static initialization, never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram, register_int_gauge, CounterVec, Histogram, IntGauge,
};

/// Orders submitted, by side and order kind.
pub static ORDERS_SUBMITTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pmx_orders_submitted_total",
        "Total orders submitted to the exchange",
        &["side", "kind"]
    )
    .unwrap()
});

/// Orders that ended in a classified failure.
pub static ORDERS_FAILED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pmx_orders_failed_total",
        "Total orders that failed, by error classification",
        &["error"]
    )
    .unwrap()
});

/// Wall-clock latency of the full place-order pipeline.
pub static PLACE_ORDER_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "pmx_place_order_seconds",
        "Wall-clock duration of a full place-order invocation",
        vec![0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]
    )
    .unwrap()
});

/// Credential link attempts, by outcome.
pub static CREDENTIAL_LINKS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pmx_credential_links_total",
        "Total credential link attempts",
        &["outcome"]
    )
    .unwrap()
});

/// Deposits verified, by outcome.
pub static DEPOSITS_VERIFIED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pmx_deposits_verified_total",
        "Total deposit verification results",
        &["outcome"]
    )
    .unwrap()
});

/// Whether an order is currently in flight (the single-flight guard).
pub static ORDER_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "pmx_order_in_flight",
        "1 while an order is in flight, 0 otherwise"
    )
    .unwrap()
});
