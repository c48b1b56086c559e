//! Relay Service
//!
//! Explicitly constructed composition root over the stream registry: the
//! single `Subscribe`/`Unsubscribe` surface consumed by downstream session
//! handlers, with a defined init and shutdown instead of ambient global
//! state. Feed tasks publish back through the registry; the service itself
//! holds no per-stream state.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::application::ports::SymbolDirectory;
use crate::domain::event::{NormalizedEvent, StreamKey, StreamKeyError, StreamKind, Timeframe};
use crate::domain::registry::{
    DetachOutcome, EventSink, FeedSpawner, StreamRegistry, StreamStats, SubscriberId,
};

/// How long shutdown waits for feed tasks to finish after cancellation.
const FEED_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors surfaced to subscribe callers.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The requested symbol is not known to the exchange.
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    /// The stream/timeframe combination is malformed.
    #[error(transparent)]
    InvalidStream(#[from] StreamKeyError),

    /// The service is shutting down and not accepting subscribers.
    #[error("relay is shutting down")]
    ShuttingDown,
}

/// A validated subscribe request.
#[derive(Debug, Clone)]
pub struct SubscribeRequest {
    /// Stream kind to relay.
    pub kind: StreamKind,
    /// User-facing symbol (any case, separators allowed).
    pub symbol: String,
    /// Candle timeframe; required iff `kind` is candles.
    pub timeframe: Option<Timeframe>,
}

/// A live subscription: the snapshot taken at attach time plus the
/// identity needed to unsubscribe.
#[derive(Debug)]
pub struct Subscription {
    /// Identifier for the matching `unsubscribe`.
    pub id: SubscriberId,
    /// Resolved stream key.
    pub key: StreamKey,
    /// History snapshot taken atomically with registration.
    pub snapshot: Vec<Arc<NormalizedEvent>>,
    /// Whether this subscription created the upstream feed.
    pub created: bool,
}

/// The relay composition root.
pub struct RelayService {
    registry: Arc<StreamRegistry>,
    directory: Arc<dyn SymbolDirectory>,
    shutdown: CancellationToken,
}

impl RelayService {
    /// Create a service that validates symbols through `directory` and
    /// starts upstream feeds through `spawner`.
    #[must_use]
    pub fn new(
        directory: Arc<dyn SymbolDirectory>,
        spawner: Arc<dyn FeedSpawner>,
        history_capacity: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry: StreamRegistry::new(spawner, history_capacity),
            directory,
            shutdown: CancellationToken::new(),
        })
    }

    /// Validate the request, resolve the stream key, and attach `sink`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::UnknownSymbol`] for symbols the directory
    /// rejects, [`RelayError::InvalidStream`] for malformed keys, and
    /// [`RelayError::ShuttingDown`] once shutdown has begun.
    pub fn subscribe(
        &self,
        request: &SubscribeRequest,
        sink: Arc<dyn EventSink>,
    ) -> Result<Subscription, RelayError> {
        if self.shutdown.is_cancelled() {
            return Err(RelayError::ShuttingDown);
        }

        if !self.directory.exists(&request.symbol) {
            return Err(RelayError::UnknownSymbol(request.symbol.clone()));
        }

        let provider_symbol = self.directory.to_provider_format(&request.symbol);
        let key = StreamKey::new(request.kind, provider_symbol, request.timeframe)?;

        let outcome = self.registry.attach(&key, sink);
        Ok(Subscription {
            id: outcome.subscriber_id,
            key,
            snapshot: outcome.snapshot,
            created: outcome.created,
        })
    }

    /// Detach one subscriber; the last detach for a key stops its feed.
    pub fn unsubscribe(&self, key: &StreamKey, id: SubscriberId) -> DetachOutcome {
        self.registry.detach(key, id)
    }

    /// History snapshot for a key (empty when the stream is not live).
    #[must_use]
    pub fn snapshot(&self, key: &StreamKey) -> Vec<Arc<NormalizedEvent>> {
        self.registry.snapshot(key)
    }

    /// Health-facing view of all live streams.
    #[must_use]
    pub fn stream_stats(&self) -> Vec<StreamStats> {
        self.registry.stats()
    }

    /// Number of live upstream feeds.
    #[must_use]
    pub fn stream_count(&self) -> usize {
        self.registry.stream_count()
    }

    /// Total attached subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.registry.subscriber_count()
    }

    /// Token cancelled when the service begins shutting down; session
    /// handlers observe it to terminate promptly.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop accepting subscribers, cancel every feed, and wait (bounded)
    /// for their tasks to finish.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let handles = self.registry.shutdown();
        tracing::info!(feeds = handles.len(), "Relay shutting down");

        for mut handle in handles {
            if let Some(task) = handle.take_task() {
                if tokio::time::timeout(FEED_SHUTDOWN_TIMEOUT, task).await.is_err() {
                    tracing::warn!("Feed task did not stop within the shutdown timeout");
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::domain::registry::{
        DeliveryOutcome, EventPublisher, FeedHandle, FeedStatus,
    };

    struct FixedDirectory {
        symbols: HashSet<String>,
    }

    impl FixedDirectory {
        fn new(symbols: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                symbols: symbols.iter().map(|s| (*s).to_string()).collect(),
            })
        }
    }

    impl SymbolDirectory for FixedDirectory {
        fn exists(&self, symbol: &str) -> bool {
            self.symbols.contains(&symbol.to_uppercase())
        }

        fn to_provider_format(&self, symbol: &str) -> String {
            symbol.to_lowercase()
        }
    }

    #[derive(Default)]
    struct RecordingSpawner {
        spawned: AtomicUsize,
    }

    impl FeedSpawner for RecordingSpawner {
        fn spawn(&self, _key: &StreamKey, _publisher: EventPublisher) -> FeedHandle {
            self.spawned.fetch_add(1, Ordering::SeqCst);
            FeedHandle::new(CancellationToken::new(), Arc::new(FeedStatus::new()), None)
        }
    }

    struct NullSink;

    impl EventSink for NullSink {
        fn deliver(&self, _event: Arc<NormalizedEvent>) -> DeliveryOutcome {
            DeliveryOutcome::Delivered
        }
    }

    fn service() -> (Arc<RelayService>, Arc<RecordingSpawner>) {
        let spawner = Arc::new(RecordingSpawner::default());
        let relay = RelayService::new(
            FixedDirectory::new(&["BTCUSDT", "ETHUSDT"]),
            Arc::clone(&spawner) as Arc<dyn FeedSpawner>,
            50,
        );
        (relay, spawner)
    }

    fn liq_request(symbol: &str) -> SubscribeRequest {
        SubscribeRequest {
            kind: StreamKind::Liquidations,
            symbol: symbol.to_string(),
            timeframe: None,
        }
    }

    #[test]
    fn subscribe_resolves_provider_symbol() {
        let (relay, spawner) = service();

        let sub = relay.subscribe(&liq_request("BTCUSDT"), Arc::new(NullSink)).unwrap();

        assert!(sub.created);
        assert_eq!(sub.key.symbol(), "btcusdt");
        assert!(sub.snapshot.is_empty());
        assert_eq!(spawner.spawned.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn subscribe_rejects_unknown_symbol() {
        let (relay, spawner) = service();

        let err = relay
            .subscribe(&liq_request("NOPEUSDT"), Arc::new(NullSink))
            .unwrap_err();

        assert!(matches!(err, RelayError::UnknownSymbol(sym) if sym == "NOPEUSDT"));
        assert_eq!(spawner.spawned.load(Ordering::SeqCst), 0);
        assert_eq!(relay.stream_count(), 0);
    }

    #[test]
    fn subscribe_rejects_candles_without_timeframe() {
        let (relay, _) = service();

        let request = SubscribeRequest {
            kind: StreamKind::Candles,
            symbol: "BTCUSDT".to_string(),
            timeframe: None,
        };
        let err = relay.subscribe(&request, Arc::new(NullSink)).unwrap_err();

        assert!(matches!(err, RelayError::InvalidStream(_)));
    }

    #[test]
    fn unsubscribe_last_subscriber_stops_feed() {
        let (relay, _) = service();

        let sub = relay.subscribe(&liq_request("ethusdt"), Arc::new(NullSink)).unwrap();
        let outcome = relay.unsubscribe(&sub.key, sub.id);

        assert!(outcome.removed);
        assert!(outcome.stopped_feed);
        assert_eq!(relay.stream_count(), 0);
    }

    #[tokio::test]
    async fn shutdown_rejects_new_subscribers() {
        let (relay, _) = service();
        relay.subscribe(&liq_request("BTCUSDT"), Arc::new(NullSink)).unwrap();

        relay.shutdown().await;

        assert_eq!(relay.stream_count(), 0);
        let err = relay.subscribe(&liq_request("BTCUSDT"), Arc::new(NullSink)).unwrap_err();
        assert!(matches!(err, RelayError::ShuttingDown));
    }
}
