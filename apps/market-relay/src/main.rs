//! Market Relay Binary
//!
//! Starts the market data relay.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin market-relay
//! ```
//!
//! # Environment Variables
//!
//! All optional; defaults serve the public futures streams.
//!
//! - `MARKET_RELAY_WS_PORT`: Client WebSocket port (default: 8080)
//! - `MARKET_RELAY_HEALTH_PORT`: Health check HTTP port (default: 8082)
//! - `MARKET_RELAY_UPSTREAM_URL`: Upstream base URL (default: wss://fstream.binance.com/ws)
//! - `MARKET_RELAY_RECEIVE_TIMEOUT_SECS`: Upstream read timeout (default: 30)
//! - `MARKET_RELAY_KEEPALIVE_INTERVAL_SECS`: Upstream ping interval (default: 180)
//! - `MARKET_RELAY_HISTORY_CAPACITY`: Events retained per stream (default: 50)
//! - `MARKET_RELAY_SESSION_QUEUE_CAPACITY`: Per-client queue size (default: 256)
//! - `MARKET_RELAY_HEARTBEAT_INTERVAL_SECS`: Idle session heartbeat (default: 30)
//! - `MARKET_RELAY_SYMBOLS`: Extra symbols, comma separated
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `OTEL_SERVICE_NAME`: Service name (default: market-relay)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use market_relay::infrastructure::telemetry;
use market_relay::infrastructure::ws::server as ws_server;
use market_relay::{
    BinanceFeedConnector, FeedSpawner, HealthServer, HealthServerState, KnownSymbolDirectory,
    RelayConfig, RelayService, SymbolDirectory, WsServerState, init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
#[allow(clippy::expect_used)]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    load_dotenv_from_ancestors();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Market Relay");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics();

    let config = RelayConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Wire the relay: symbol directory + feed connector + registry
    let directory = Arc::new(KnownSymbolDirectory::with_defaults(&config.extra_symbols));
    let connector = Arc::new(BinanceFeedConnector::new(config.upstream.clone()));
    let relay = RelayService::new(
        Arc::clone(&directory) as Arc<dyn SymbolDirectory>,
        connector as Arc<dyn FeedSpawner>,
        config.history_capacity,
    );

    // Spawn health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&relay),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    // Spawn client WebSocket server
    let ws_state = WsServerState {
        relay: Arc::clone(&relay),
        session: config.session.clone(),
    };
    let ws_shutdown = shutdown_token.clone();
    let ws_task = tokio::spawn(async move {
        if let Err(e) = ws_server::serve(config.server.ws_port, ws_state, ws_shutdown).await {
            tracing::error!(error = %e, "WebSocket server error");
        }
    });

    tracing::info!(symbols = directory.len(), "Market relay ready");

    await_shutdown(shutdown_token).await;

    // Stop accepting subscribers, tear down feeds, wait for sessions
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        relay.shutdown().await;
        let _ = ws_task.await;
    })
    .await
    .is_err()
    {
        tracing::warn!("Shutdown timed out, exiting anyway");
    }

    tracing::info!("Market relay stopped");
    Ok(())
}

/// Log the effective configuration at startup.
fn log_config(config: &RelayConfig) {
    tracing::info!(
        ws_port = config.server.ws_port,
        health_port = config.server.health_port,
        upstream = %config.upstream.endpoint,
        history_capacity = config.history_capacity,
        extra_symbols = config.extra_symbols.len(),
        "Configuration loaded"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv_from_ancestors() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
