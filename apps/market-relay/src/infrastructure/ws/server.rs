//! Downstream WebSocket Server
//!
//! Axum server exposing the subscription endpoints:
//!
//! - `GET /ws/{stream}/{symbol}` for liquidations, orderbook, and trades
//! - `GET /ws/candles/{symbol}/{timeframe}` for candle streams
//!
//! Path validation that can fail before the subscribe call (unknown stream
//! name, unknown timeframe) still upgrades the socket so the client gets a
//! structured error message instead of a bare HTTP rejection.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::response::Response;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use super::session;
use crate::application::relay::{RelayService, SubscribeRequest};
use crate::domain::event::{StreamKind, Timeframe};
use crate::infrastructure::config::SessionSettings;

/// Shared state for the WebSocket routes.
#[derive(Clone)]
pub struct WsServerState {
    /// The relay service.
    pub relay: Arc<RelayService>,
    /// Session behavior settings.
    pub session: SessionSettings,
}

/// WebSocket server errors.
#[derive(Debug, thiserror::Error)]
pub enum WsServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

/// Build the subscription router.
#[must_use]
pub fn router(state: WsServerState) -> Router {
    Router::new()
        .route("/ws/{stream}/{symbol}", get(stream_handler))
        .route("/ws/candles/{symbol}/{timeframe}", get(candles_handler))
        .with_state(state)
}

/// Run the WebSocket server until cancelled.
///
/// # Errors
///
/// Returns `WsServerError` if binding fails or the HTTP server encounters
/// a fatal error while running.
pub async fn serve(
    port: u16,
    state: WsServerState,
    cancel: CancellationToken,
) -> Result<(), WsServerError> {
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| WsServerError::BindFailed(port, e.to_string()))?;

    tracing::info!(port, "WebSocket server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| WsServerError::ServerFailed(e.to_string()))?;

    tracing::info!("WebSocket server stopped");
    Ok(())
}

async fn stream_handler(
    Path((stream, symbol)): Path<(String, String)>,
    State(state): State<WsServerState>,
    ws: WebSocketUpgrade,
) -> Response {
    match StreamKind::from_wire_name(&stream) {
        Some(kind) => {
            let request = SubscribeRequest {
                kind,
                symbol,
                timeframe: None,
            };
            ws.on_upgrade(move |socket| {
                session::run(socket, state.relay, state.session, request)
            })
        }
        None => {
            let reason = format!("unknown stream type: {stream}");
            ws.on_upgrade(move |socket| session::reject(socket, reason))
        }
    }
}

async fn candles_handler(
    Path((symbol, timeframe)): Path<(String, String)>,
    State(state): State<WsServerState>,
    ws: WebSocketUpgrade,
) -> Response {
    match Timeframe::from_interval(&timeframe) {
        Some(tf) => {
            let request = SubscribeRequest {
                kind: StreamKind::Candles,
                symbol,
                timeframe: Some(tf),
            };
            ws.on_upgrade(move |socket| {
                session::run(socket, state.relay, state.session, request)
            })
        }
        None => {
            let reason = format!("unknown timeframe: {timeframe}");
            ws.on_upgrade(move |socket| session::reject(socket, reason))
        }
    }
}
