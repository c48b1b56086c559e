//! Prometheus Metrics Module
//!
//! Exposes relay metrics in Prometheus format, rendered at `/metrics` on
//! the health server port.
//!
//! # Metrics Categories
//!
//! - **Frames**: upstream frames received and dropped, by stream kind
//! - **Delivery**: events fanned out to client sessions
//! - **Connections**: upstream reconnects and live session counts

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::domain::event::StreamKind;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let builder = PrometheusBuilder::new();
            let handle = builder
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

fn register_metrics() {
    describe_counter!(
        "relay_frames_received_total",
        "Total frames received from upstream streams"
    );
    describe_counter!(
        "relay_frames_dropped_total",
        "Total upstream frames dropped as unparseable"
    );
    describe_counter!(
        "relay_events_delivered_total",
        "Total events delivered to client sessions"
    );
    describe_counter!(
        "relay_upstream_reconnects_total",
        "Total upstream reconnection attempts"
    );
    describe_gauge!(
        "relay_client_sessions",
        "Number of connected client sessions"
    );
    describe_gauge!("relay_streams_active", "Number of live upstream streams");
}

/// Record one frame received from an upstream stream.
pub fn record_frame_received(kind: StreamKind) {
    counter!(
        "relay_frames_received_total",
        "stream" => kind.wire_name()
    )
    .increment(1);
}

/// Record one upstream frame dropped during normalization.
pub fn record_frame_dropped(kind: StreamKind) {
    counter!(
        "relay_frames_dropped_total",
        "stream" => kind.wire_name()
    )
    .increment(1);
}

/// Record events delivered to client sessions.
pub fn record_events_delivered(kind: StreamKind, count: u64) {
    counter!(
        "relay_events_delivered_total",
        "stream" => kind.wire_name()
    )
    .increment(count);
}

/// Record an upstream reconnection attempt.
pub fn record_upstream_reconnect(kind: StreamKind) {
    counter!(
        "relay_upstream_reconnects_total",
        "stream" => kind.wire_name()
    )
    .increment(1);
}

/// Update the connected-session gauge.
pub fn set_client_sessions(count: f64) {
    gauge!("relay_client_sessions").set(count);
}

/// Update the live-stream gauge.
pub fn set_streams_active(count: f64) {
    gauge!("relay_streams_active").set(count);
}
