//! Metrics definitions for the Media Handler
//!
//! All metrics follow Prometheus naming conventions:
//! - `mh_` prefix for Media Handler
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion. Resource ids are
//! never used as labels.
//! - `reason`: close triggers (3 values) or rejection reasons (2 values)
//! - `event`: bounded by notification and listener event names (~15 values)
//! - `method`: bounded by `Method` (9 values)
//! - `error_type`: bounded by `MhError::error_type` (5 values)

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded. Worker requests are
/// local IPC, so request latency buckets start at 100 microseconds.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("mh_channel_request".to_string()),
            &[
                0.0001, 0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set channel request buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Consumer Lifecycle Metrics
// ============================================================================

/// Record a consumer construction.
///
/// Metric: `mh_consumers_created_total`
pub fn record_consumer_created() {
    counter!("mh_consumers_created_total").increment(1);
}

/// Record a consumer closure.
///
/// Metric: `mh_consumers_closed_total`
/// Labels: `reason` (explicit, producer_closed, transport_closed)
pub fn record_consumer_closed(reason: &'static str) {
    counter!("mh_consumers_closed_total", "reason" => reason).increment(1);
}

// ============================================================================
// Notification Metrics
// ============================================================================

/// Record a dispatched worker notification.
///
/// Metric: `mh_consumer_notifications_total`
/// Labels: `event`
pub fn record_notification(event: &'static str) {
    counter!("mh_consumer_notifications_total", "event" => event).increment(1);
}

/// Record a notification that could not be dispatched.
///
/// Metric: `mh_consumer_notifications_rejected_total`
/// Labels: `reason` (unknown_event, malformed)
pub fn record_notification_rejected(reason: &'static str) {
    counter!("mh_consumer_notifications_rejected_total", "reason" => reason).increment(1);
}

/// Record a payload dropped because its consumer is closed.
///
/// Metric: `mh_consumer_payloads_dropped_total`
pub fn record_payload_dropped() {
    counter!("mh_consumer_payloads_dropped_total").increment(1);
}

/// Record a listener that panicked during emission.
///
/// Metric: `mh_listener_panics_total`
/// Labels: `event`
pub fn record_listener_panic(event: &'static str) {
    counter!("mh_listener_panics_total", "event" => event).increment(1);
}

// ============================================================================
// Channel Metrics
// ============================================================================

/// Record the latency of a worker request, successful or not.
///
/// Metric: `mh_channel_request_duration_seconds`
/// Labels: `method`
pub fn record_channel_request(method: &'static str, duration: Duration) {
    histogram!("mh_channel_request_duration_seconds", "method" => method)
        .record(duration.as_secs_f64());
}

/// Record a failed worker request.
///
/// Metric: `mh_channel_request_errors_total`
/// Labels: `method`, `error_type`
pub fn record_channel_request_error(method: &'static str, error_type: &'static str) {
    counter!(
        "mh_channel_request_errors_total",
        "method" => method,
        "error_type" => error_type
    )
    .increment(1);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    // Note: most tests execute the recording functions against the global
    // no-op recorder for coverage. The snapshot test below uses a
    // thread-local debugging recorder so it does not race other tests.

    #[test]
    fn test_record_lifecycle() {
        record_consumer_created();
        record_consumer_closed("explicit");
        record_consumer_closed("producer_closed");
        record_consumer_closed("transport_closed");
    }

    #[test]
    fn test_record_notifications() {
        record_notification("score");
        record_notification("producerpause");
        record_notification_rejected("unknown_event");
        record_notification_rejected("malformed");
        record_payload_dropped();
        record_listener_panic("rtp");
    }

    #[test]
    fn test_record_channel() {
        record_channel_request("consumer.pause", Duration::from_micros(250));
        record_channel_request("consumer.dump", Duration::from_millis(3));
        record_channel_request_error("consumer.pause", "timeout");
    }

    #[test]
    fn test_metrics_are_recorded_with_bounded_labels() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_consumer_closed("transport_closed");
            record_consumer_closed("transport_closed");
            record_notification("score");
            record_channel_request("consumer.resume", Duration::from_millis(1));
            record_channel_request_error("consumer.resume", "request");
        });

        let snapshot = snapshotter.snapshot().into_vec();

        let closed = snapshot
            .iter()
            .find(|(key, _, _, _)| key.key().name() == "mh_consumers_closed_total")
            .expect("close counter recorded");
        assert!(matches!(closed.3, DebugValue::Counter(2)));
        assert!(closed
            .0
            .key()
            .labels()
            .any(|label| label.key() == "reason" && label.value() == "transport_closed"));

        let names: Vec<&str> = snapshot
            .iter()
            .map(|(key, _, _, _)| key.key().name())
            .collect();
        assert!(names.contains(&"mh_consumer_notifications_total"));
        assert!(names.contains(&"mh_channel_request_duration_seconds"));
        assert!(names.contains(&"mh_channel_request_errors_total"));
    }
}
