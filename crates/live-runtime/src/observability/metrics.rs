//! Metrics definitions for the live runtime.
//!
//! All metrics follow Prometheus naming conventions:
//! - `live_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `kind`: error kinds of `LiveError` (8 values)
//! - `event_kind`: client, self
//! - `reason`: inbox_full, session_gone, sink_full
//! - `actor_type`: supervisor, session

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Event handling runs in-process, sub-millisecond is normal
        .set_buckets_for_metric(
            Matcher::Prefix("live_event".to_string()),
            &[
                0.0001, 0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set event latency buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("live_render".to_string()),
            &[
                0.0001, 0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set render duration buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Session Metrics
// ============================================================================

/// Set the number of live sessions.
///
/// Metric: `live_sessions_active`
/// Labels: none
pub fn set_sessions_active(count: usize) {
    // usize to f64 conversion is safe for realistic session counts (< 2^53)
    #[allow(clippy::cast_precision_loss)]
    gauge!("live_sessions_active").set(count as f64);
}

/// Record an error reported by a session actor.
///
/// Metric: `live_session_errors_total`
/// Labels: `kind`
pub fn record_session_error(kind: &'static str) {
    counter!("live_session_errors_total", "kind" => kind).increment(1);
}

/// Record snapshots purged from the retention store.
///
/// Metric: `live_snapshots_purged_total`
/// Labels: none
pub fn record_snapshots_purged(count: usize) {
    counter!("live_snapshots_purged_total").increment(count as u64);
}

// ============================================================================
// Latency Metrics (Histograms)
// ============================================================================

/// Record event processing latency (dispatch, render and flush).
///
/// Metric: `live_event_latency_seconds`
/// Labels: `event_kind`
pub fn record_event_latency(event_kind: &'static str, duration: Duration) {
    histogram!("live_event_latency_seconds", "event_kind" => event_kind)
        .record(duration.as_secs_f64());
}

/// Record render duration.
///
/// Metric: `live_render_duration_seconds`
/// Labels: none
pub fn record_render_duration(duration: Duration) {
    histogram!("live_render_duration_seconds").record(duration.as_secs_f64());
}

// ============================================================================
// Delivery Metrics (Counters)
// ============================================================================

/// Record a completed broadcast.
///
/// Metrics: `live_broadcasts_total`, `live_broadcast_deliveries_total`
pub fn record_broadcast(delivered: usize, dropped: usize) {
    counter!("live_broadcasts_total").increment(1);
    counter!("live_broadcast_deliveries_total", "outcome" => "delivered")
        .increment(delivered as u64);
    if dropped > 0 {
        counter!("live_broadcast_deliveries_total", "outcome" => "dropped")
            .increment(dropped as u64);
    }
}

/// Record a dropped delivery.
///
/// Metric: `live_delivery_dropped_total`
/// Labels: `reason`
pub fn record_delivery_dropped(reason: &'static str) {
    counter!("live_delivery_dropped_total", "reason" => reason).increment(1);
}

/// Record an actor panic.
///
/// Metric: `live_actor_panics_total`
/// Labels: `actor_type`
pub fn record_actor_panic(actor_type: &'static str) {
    counter!("live_actor_panics_total", "actor_type" => actor_type).increment(1);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use metrics_util::debugging::DebuggingRecorder;

    // Without an installed recorder these calls go to the no-op recorder.
    #[test]
    fn test_recording_without_recorder() {
        set_sessions_active(0);
        set_sessions_active(10_000);
        record_session_error("handler_not_found");
        record_event_latency("client", Duration::from_micros(150));
        record_render_duration(Duration::from_micros(80));
        record_broadcast(3, 1);
        record_delivery_dropped("inbox_full");
        record_actor_panic("session");
        record_snapshots_purged(2);
    }

    #[test]
    fn test_metric_names() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            set_sessions_active(2);
            record_session_error("handler_failure");
            record_event_latency("self", Duration::from_millis(1));
            record_render_duration(Duration::from_millis(1));
            record_broadcast(2, 0);
            record_delivery_dropped("session_gone");
            record_actor_panic("supervisor");
            record_snapshots_purged(1);
        });

        let names: Vec<String> = snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .map(|(key, _, _, _)| key.key().name().to_string())
            .collect();

        for expected in [
            "live_sessions_active",
            "live_session_errors_total",
            "live_event_latency_seconds",
            "live_render_duration_seconds",
            "live_broadcasts_total",
            "live_broadcast_deliveries_total",
            "live_delivery_dropped_total",
            "live_actor_panics_total",
            "live_snapshots_purged_total",
        ] {
            assert!(
                names.iter().any(|n| n == expected),
                "missing metric {expected}, got {names:?}"
            );
        }
    }
}
