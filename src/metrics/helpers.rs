//! Metrics helper structs for convenient metric recording

use std::time::Duration;

use prometheus::{Encoder, TextEncoder};

use crate::notification::NotificationStatus;

use super::{
    DELIVERIES_IN_FLIGHT, DELIVERY_ATTEMPTS_TOTAL, DELIVERY_DURATION, DELIVERY_OUTCOMES_TOTAL,
    NOTIFICATIONS_CREATED_TOTAL, PURGED_TOTAL, STATUS_TRANSITIONS_TOTAL, TEMPLATE_DATA_ERRORS_TOTAL,
    TEMPLATE_FALLBACKS_TOTAL,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording delivery metrics
pub struct DeliveryMetrics;

impl DeliveryMetrics {
    pub fn record_created() {
        NOTIFICATIONS_CREATED_TOTAL.inc();
    }

    pub fn record_started() {
        DELIVERIES_IN_FLIGHT.inc();
    }

    pub fn record_attempt() {
        DELIVERY_ATTEMPTS_TOTAL.inc();
    }

    pub fn record_fallback() {
        TEMPLATE_FALLBACKS_TOTAL.inc();
    }

    pub fn record_template_data_error() {
        TEMPLATE_DATA_ERRORS_TOTAL.inc();
    }

    /// Record the end of a delivery sequence
    pub fn record_finished(outcome: &str, elapsed: Duration) {
        DELIVERIES_IN_FLIGHT.dec();
        DELIVERY_OUTCOMES_TOTAL.with_label_values(&[outcome]).inc();
        DELIVERY_DURATION.observe(elapsed.as_secs_f64());
    }
}

/// Helper struct for recording status lifecycle metrics
pub struct LifecycleMetrics;

impl LifecycleMetrics {
    pub fn record_transition(status: NotificationStatus) {
        STATUS_TRANSITIONS_TOTAL
            .with_label_values(&[status.as_str()])
            .inc();
    }

    pub fn record_transitions(status: NotificationStatus, count: usize) {
        STATUS_TRANSITIONS_TOTAL
            .with_label_values(&[status.as_str()])
            .inc_by(count as u64);
    }

    pub fn record_purged(count: usize) {
        PURGED_TOTAL.inc_by(count as u64);
    }
}
