//! Upstream Feed Connection
//!
//! Owns one WebSocket connection to a provider stream endpoint and runs it
//! until cancelled: connect, read frames, normalize, publish, and reconnect
//! on the fixed retry schedule after transport failures.
//!
//! One connection serves exactly one stream key; the registry guarantees at
//! most one of these tasks is alive per key.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::backoff::ReconnectPolicy;
use super::keepalive::{KeepaliveEvent, KeepaliveManager};
use super::normalize::Normalizer;
use crate::domain::event::StreamKey;
use crate::domain::registry::{ConnectionState, EventPublisher, FeedStatus};
use crate::infrastructure::config::UpstreamSettings;
use crate::infrastructure::metrics;

/// Transport failures that trigger a reconnect.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The provider closed the connection.
    #[error("connection closed by provider")]
    ConnectionClosed,
}

/// One provider stream connection with its reconnect loop.
pub struct UpstreamFeedConnection {
    key: StreamKey,
    settings: UpstreamSettings,
    normalizer: Normalizer,
    publisher: EventPublisher,
    status: Arc<FeedStatus>,
    cancel: CancellationToken,
}

impl UpstreamFeedConnection {
    /// Create a connection for `key`, publishing through `publisher` and
    /// reporting state through `status`.
    #[must_use]
    pub const fn new(
        key: StreamKey,
        settings: UpstreamSettings,
        publisher: EventPublisher,
        status: Arc<FeedStatus>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            key,
            settings,
            normalizer: Normalizer::new(),
            publisher,
            status,
            cancel,
        }
    }

    /// The endpoint URL for this stream.
    #[must_use]
    pub fn url(&self) -> String {
        format!(
            "{}/{}",
            self.settings.endpoint.trim_end_matches('/'),
            self.key.provider_stream()
        )
    }

    /// Run the connection until the cancellation token fires.
    ///
    /// Transport failures are retried on the fixed schedule; the loop only
    /// returns once cancelled, leaving the status in `Stopped`.
    pub async fn run(self) {
        let mut policy = ReconnectPolicy::new();

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            self.status.set_state(ConnectionState::Connecting);
            match self.connect_and_read(&mut policy).await {
                Ok(()) => break,
                Err(e) => {
                    tracing::warn!(stream = %self.key, error = %e, "Upstream feed error");
                    metrics::record_upstream_reconnect(self.key.kind());

                    let delay = policy.next_delay();
                    self.status.record_reconnect_attempt();
                    self.status.set_state(ConnectionState::Backoff);
                    tracing::info!(
                        stream = %self.key,
                        attempt = policy.failure_count(),
                        delay_ms = delay.as_millis(),
                        "Reconnecting to upstream feed"
                    );

                    tokio::select! {
                        () = self.cancel.cancelled() => break,
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        self.status.set_state(ConnectionState::Stopped);
        tracing::info!(stream = %self.key, "Upstream feed stopped");
    }

    /// Connect and read frames until cancellation (`Ok`) or a transport
    /// failure (`Err`).
    async fn connect_and_read(&self, policy: &mut ReconnectPolicy) -> Result<(), FeedError> {
        let url = self.url();
        tracing::info!(stream = %self.key, url = %url, "Connecting to upstream feed");

        let (ws_stream, _response) = tokio_tungstenite::connect_async(&url).await?;

        policy.reset();
        self.status.set_state(ConnectionState::Connected);
        tracing::info!(stream = %self.key, "Upstream feed connected");

        let (mut write, mut read) = ws_stream.split();

        // Keepalive runs on a child token so stopping the feed stops it too.
        let keepalive_cancel = self.cancel.child_token();
        let (keepalive_tx, mut keepalive_rx) = mpsc::channel::<KeepaliveEvent>(4);
        tokio::spawn(
            KeepaliveManager::new(
                self.settings.keepalive_interval,
                keepalive_tx,
                keepalive_cancel.clone(),
            )
            .run(),
        );

        let result = loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    break Ok(());
                }
                event = keepalive_rx.recv() => {
                    match event {
                        Some(KeepaliveEvent::SendPing) => {
                            if let Err(e) = write.send(Message::Ping(vec![].into())).await {
                                break Err(e.into());
                            }
                        }
                        None => {
                            tracing::debug!(stream = %self.key, "Keepalive channel closed");
                        }
                    }
                }
                msg = tokio::time::timeout(self.settings.receive_timeout, read.next()) => {
                    match msg {
                        // A quiet stream is normal for sparse streams; the
                        // keepalive ping covers connection liveness.
                        Err(_elapsed) => {
                            tracing::trace!(stream = %self.key, "No frames within receive timeout");
                        }
                        Ok(Some(Ok(Message::Text(text)))) => {
                            self.handle_text(&text);
                        }
                        Ok(Some(Ok(Message::Ping(data)))) => {
                            if let Err(e) = write.send(Message::Pong(data)).await {
                                break Err(e.into());
                            }
                        }
                        Ok(Some(Ok(Message::Pong(_)))) => {}
                        Ok(Some(Ok(Message::Close(_)))) => {
                            tracing::info!(stream = %self.key, "Provider sent close frame");
                            break Err(FeedError::ConnectionClosed);
                        }
                        Ok(Some(Ok(_))) => {}
                        Ok(Some(Err(e))) => break Err(e.into()),
                        Ok(None) => {
                            tracing::info!(stream = %self.key, "Upstream stream ended");
                            break Err(FeedError::ConnectionClosed);
                        }
                    }
                }
            }
        };

        keepalive_cancel.cancel();
        result
    }

    /// Normalize and publish one text frame; a frame that fails to
    /// normalize is dropped with a log line.
    fn handle_text(&self, text: &str) {
        self.status.record_message();
        metrics::record_frame_received(self.key.kind());

        match self.normalizer.normalize(&self.key, text) {
            Ok(event) => self.publisher.publish(event),
            Err(e) => {
                tracing::debug!(stream = %self.key, error = %e, "Dropping unparseable frame");
                metrics::record_frame_dropped(self.key.kind());
            }
        }
    }
}
