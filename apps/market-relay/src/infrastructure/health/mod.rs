//! Health Check HTTP Server
//!
//! Exposes liveness, readiness, health detail, and Prometheus metrics on
//! a dedicated port, separate from the client-facing WebSocket port.
//!
//! Streams come and go with demand, so an empty registry is healthy; the
//! status only degrades when live streams are failing to hold their
//! upstream connections.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::relay::RelayService;
use crate::domain::registry::{ConnectionState, StreamStats};
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Response Types
// =============================================================================

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Every live stream is connected (or nothing is live yet).
    Healthy,
    /// Some live streams are connected, some are not.
    Degraded,
    /// Live streams exist and none are connected.
    Unhealthy,
}

/// One live stream in the health payload.
#[derive(Debug, Clone, Serialize)]
pub struct StreamInfo {
    /// Provider stream name.
    pub stream: String,
    /// Connection state name.
    pub state: &'static str,
    /// Whether the upstream connection is live.
    pub connected: bool,
    /// Attached subscribers.
    pub subscribers: usize,
    /// Frames received from the provider.
    pub messages_received: u64,
    /// Consecutive reconnect attempts.
    pub reconnect_attempts: u32,
    /// Events buffered for snapshots.
    pub history_len: usize,
}

impl From<StreamStats> for StreamInfo {
    fn from(stats: StreamStats) -> Self {
        Self {
            stream: stats.stream,
            state: stats.state.as_str(),
            connected: stats.state == ConnectionState::Connected,
            subscribers: stats.subscribers,
            messages_received: stats.messages_received,
            reconnect_attempts: stats.reconnect_attempts,
            history_len: stats.history_len,
        }
    }
}

/// Full health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Service version.
    pub version: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Current server time.
    pub current_time: DateTime<Utc>,
    /// Live streams.
    pub streams: Vec<StreamInfo>,
    /// Total attached subscribers.
    pub subscribers: usize,
}

// =============================================================================
// Server State
// =============================================================================

/// State shared across health handlers.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    relay: Arc<RelayService>,
}

impl HealthServerState {
    /// Create health server state.
    #[must_use]
    pub fn new(version: String, relay: Arc<RelayService>) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            relay,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let app = Router::new()
            .route("/health", get(health_handler))
            .route("/healthz", get(liveness_handler))
            .route("/readyz", get(readiness_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if state.relay.shutdown_token().is_cancelled() {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    } else {
        (StatusCode::OK, "READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let streams: Vec<StreamInfo> = state
        .relay
        .stream_stats()
        .into_iter()
        .map(StreamInfo::from)
        .collect();

    HealthResponse {
        status: determine_health_status(&streams),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        subscribers: state.relay.subscriber_count(),
        streams,
    }
}

fn determine_health_status(streams: &[StreamInfo]) -> HealthStatus {
    if streams.is_empty() {
        return HealthStatus::Healthy;
    }

    let connected = streams.iter().filter(|s| s.connected).count();
    if connected == streams.len() {
        HealthStatus::Healthy
    } else if connected > 0 {
        HealthStatus::Degraded
    } else {
        HealthStatus::Unhealthy
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn info(connected: bool) -> StreamInfo {
        StreamInfo {
            stream: "btcusdt@forceOrder".to_string(),
            state: if connected { "connected" } else { "backoff" },
            connected,
            subscribers: 1,
            messages_received: 0,
            reconnect_attempts: 0,
            history_len: 0,
        }
    }

    #[test]
    fn no_streams_is_healthy() {
        assert_eq!(determine_health_status(&[]), HealthStatus::Healthy);
    }

    #[test]
    fn all_connected_is_healthy() {
        assert_eq!(
            determine_health_status(&[info(true), info(true)]),
            HealthStatus::Healthy
        );
    }

    #[test]
    fn partially_connected_is_degraded() {
        assert_eq!(
            determine_health_status(&[info(true), info(false)]),
            HealthStatus::Degraded
        );
    }

    #[test]
    fn none_connected_is_unhealthy() {
        assert_eq!(
            determine_health_status(&[info(false)]),
            HealthStatus::Unhealthy
        );
    }
}
