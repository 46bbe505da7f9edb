//! Metrics collection and export for Courier.
//!
//! Uses the `metrics` crate for instrumentation and exports to
//! Prometheus format.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const MESSAGES_PUSHED: &str = "courier_messages_pushed_total";
    pub const MESSAGES_DELIVERED: &str = "courier_messages_delivered_total";
    pub const QUEUE_SIZE: &str = "courier_queue_size";
    pub const SUBSCRIBERS_TOTAL: &str = "courier_subscribers_total";
    pub const SUBSCRIBERS_ACTIVE: &str = "courier_subscribers_active";
    pub const REQUEST_ERRORS: &str = "courier_request_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::MESSAGES_PUSHED,
        "Total number of messages accepted since server start"
    );
    metrics::describe_counter!(
        names::MESSAGES_DELIVERED,
        "Total number of messages delivered through pulls"
    );
    metrics::describe_gauge!(names::QUEUE_SIZE, "Current number of pending messages");
    metrics::describe_gauge!(
        names::SUBSCRIBERS_TOTAL,
        "Current number of registered subscribers"
    );
    metrics::describe_gauge!(
        names::SUBSCRIBERS_ACTIVE,
        "Current number of subscribers within the liveness window"
    );
    metrics::describe_counter!(
        names::REQUEST_ERRORS,
        "Total number of rejected API requests"
    );

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{port}").parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record an accepted push.
pub fn record_push() {
    counter!(names::MESSAGES_PUSHED).increment(1);
}

/// Record a pull that delivered `count` messages.
pub fn record_delivery(count: usize) {
    counter!(names::MESSAGES_DELIVERED).increment(count as u64);
}

/// Update the pending-queue gauge.
pub fn set_queue_size(size: usize) {
    gauge!(names::QUEUE_SIZE).set(size as f64);
}

/// Update the subscriber gauges.
pub fn set_subscriber_counts(total: usize, active: usize) {
    gauge!(names::SUBSCRIBERS_TOTAL).set(total as f64);
    gauge!(names::SUBSCRIBERS_ACTIVE).set(active as f64);
}

/// Record a rejected request.
pub fn record_error(kind: &str) {
    counter!(names::REQUEST_ERRORS, "kind" => kind.to_string()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_does_not_panic() {
        record_push();
        record_delivery(3);
        set_queue_size(7);
        set_subscriber_counts(2, 1);
        record_error("not_found");
    }
}
