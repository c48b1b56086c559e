#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Market Relay - Exchange Stream Multiplexer
//!
//! A WebSocket relay service that maintains single connections to the
//! exchange's market data streams and multiplexes normalized events to
//! multiple downstream clients.
//!
//! # Layers (inside -> outside)
//!
//! - **Domain**: Core relay logic and data types
//!   - `event`: Stream identities and the canonical normalized event
//!   - `history`: Bounded per-stream snapshot history
//!   - `registry`: Feed deduplication, fan-out, and lifecycles
//!
//! - **Application**: Ports and the relay composition root
//!   - `ports`: Symbol directory seam
//!   - `relay`: The subscribe/unsubscribe service
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `binance`: Upstream WebSocket feeds and normalization
//!   - `ws`: Downstream WebSocket server and client sessions
//!   - `config`: Configuration loading
//!   - `health`: Health check HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//! exchange stream 1 --+
//!                     |    +--------------+     +------------+--> client 1
//! exchange stream 2 --+--->|    Stream    |---->| WebSocket  |--> client 2
//!                     |    |   Registry   |     |  Sessions  |--> client N
//! exchange stream M --+    +--------------+     +------------+
//! ```
//!
//! One upstream connection exists per distinct stream key regardless of
//! how many clients subscribe to it; the last unsubscribe tears the
//! connection down.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core relay types with no external dependencies.
pub mod domain;

/// Application layer - Ports and the relay composition root.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::event::{NormalizedEvent, Side, StreamKey, StreamKind, Timeframe};
pub use domain::history::{DEFAULT_HISTORY_CAPACITY, HistoryCache};
pub use domain::registry::{
    ConnectionState, DeliveryOutcome, EventPublisher, EventSink, FeedHandle, FeedSpawner,
    FeedStatus, StreamRegistry, StreamStats, SubscriberId,
};

// Application surface
pub use application::ports::SymbolDirectory;
pub use application::relay::{RelayError, RelayService, SubscribeRequest, Subscription};

// Infrastructure config
pub use infrastructure::config::{
    ConfigError, RelayConfig, ServerSettings, SessionSettings, UpstreamSettings,
};

// Provider adapters (for integration tests)
pub use infrastructure::binance::BinanceFeedConnector;
pub use infrastructure::binance::symbols::KnownSymbolDirectory;

// Servers
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};
pub use infrastructure::ws::server::{WsServerError, WsServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
