//! Prometheus metrics for the notification service.
//!
//! - Creation metrics (records created)
//! - Delivery metrics (attempts, outcomes, template fallbacks, duration)
//! - Lifecycle metrics (status transitions, purged records)
//!
//! The registry is scraped from `GET /metrics` (see `serve_metrics`).

mod helpers;
mod server;

pub use helpers::{encode_metrics, DeliveryMetrics, LifecycleMetrics};
pub use server::{metrics_router, serve_metrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "lms";

lazy_static! {
    // ============================================================================
    // Creation Metrics
    // ============================================================================

    /// Total notification records created
    pub static ref NOTIFICATIONS_CREATED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_notifications_created_total", METRIC_PREFIX),
        "Total notification records created"
    ).unwrap();

    // ============================================================================
    // Delivery Metrics
    // ============================================================================

    /// Delivery tasks currently running
    pub static ref DELIVERIES_IN_FLIGHT: IntGauge = register_int_gauge!(
        format!("{}_deliveries_in_flight", METRIC_PREFIX),
        "Delivery tasks currently running"
    ).unwrap();

    /// Total delivery attempts (each retry counts)
    pub static ref DELIVERY_ATTEMPTS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_delivery_attempts_total", METRIC_PREFIX),
        "Total delivery attempts including retries"
    ).unwrap();

    /// Delivery sequences by final outcome
    pub static ref DELIVERY_OUTCOMES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_delivery_outcomes_total", METRIC_PREFIX),
        "Delivery sequences by final outcome",
        &["outcome"]
    ).unwrap();

    /// Sends that used the hard-coded fallback body
    pub static ref TEMPLATE_FALLBACKS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_template_fallbacks_total", METRIC_PREFIX),
        "Sends that used the fallback body after template rendering failed"
    ).unwrap();

    /// Template data that could not be parsed
    pub static ref TEMPLATE_DATA_ERRORS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_template_data_errors_total", METRIC_PREFIX),
        "Notifications whose template data could not be parsed"
    ).unwrap();

    /// Wall-clock duration of a delivery sequence including backoff
    pub static ref DELIVERY_DURATION: Histogram = register_histogram!(
        format!("{}_delivery_duration_seconds", METRIC_PREFIX),
        "Delivery sequence duration in seconds, including backoff",
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    ).unwrap();

    // ============================================================================
    // Lifecycle Metrics
    // ============================================================================

    /// Status transitions by target status
    pub static ref STATUS_TRANSITIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_status_transitions_total", METRIC_PREFIX),
        "Notification status transitions by target status",
        &["status"]
    ).unwrap();

    /// Records physically removed by purge
    pub static ref PURGED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_notifications_purged_total", METRIC_PREFIX),
        "Soft-deleted notifications physically removed"
    ).unwrap();
}
