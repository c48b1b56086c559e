//! Provider Integration
//!
//! Everything that talks to the upstream exchange: raw frame types, the
//! normalizer, the per-stream WebSocket connection with its keepalive and
//! reconnect policy, and the symbol directory.

/// Fixed reconnect schedule.
pub mod backoff;

/// The per-stream WebSocket connection loop.
pub mod connection;

/// Raw provider frame types.
pub mod frames;

/// Periodic upstream ping scheduling.
pub mod keepalive;

/// Frame to normalized-event decoding.
pub mod normalize;

/// Known-symbol directory.
pub mod symbols;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use self::connection::UpstreamFeedConnection;
use crate::domain::event::StreamKey;
use crate::domain::registry::{EventPublisher, FeedHandle, FeedSpawner, FeedStatus};
use crate::infrastructure::config::UpstreamSettings;

/// Spawns one [`UpstreamFeedConnection`] task per stream key.
///
/// The registry guarantees at most one spawn per live key, so the
/// connector itself is stateless.
pub struct BinanceFeedConnector {
    settings: UpstreamSettings,
}

impl BinanceFeedConnector {
    /// Create a connector that dials `settings.endpoint`.
    #[must_use]
    pub const fn new(settings: UpstreamSettings) -> Self {
        Self {
            settings,
        }
    }
}

impl FeedSpawner for BinanceFeedConnector {
    fn spawn(&self, key: &StreamKey, publisher: EventPublisher) -> FeedHandle {
        let cancel = CancellationToken::new();
        let status = Arc::new(FeedStatus::new());

        let connection = UpstreamFeedConnection::new(
            key.clone(),
            self.settings.clone(),
            publisher,
            Arc::clone(&status),
            cancel.clone(),
        );
        let task = tokio::spawn(connection.run());

        FeedHandle::new(cancel, status, Some(task))
    }
}
