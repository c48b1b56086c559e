//! Stream Registry
//!
//! Maps each [`StreamKey`] to its single upstream feed, its history cache,
//! and the set of subscriber sinks. The registry is the only shared mutable
//! state in the relay; `attach`, `detach`, and `publish` are each atomic
//! under one lock so callers never observe a half-updated handle set or two
//! live feeds for one key.
//!
//! # Policies
//!
//! - **Teardown**: reference-counted. The last detach for a key cancels the
//!   feed task and removes the entry together with its history.
//! - **Backpressure**: disconnect-on-overflow. A sink reporting `Overflow`
//!   or `Closed` is detached after the fan-out pass; the remaining
//!   subscribers are never stalled or skipped.
//!
//! Sinks must be non-blocking: `deliver` is called while the registry lock
//! is held so per-key publish order matches upstream arrival order.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Weak;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::domain::event::{NormalizedEvent, StreamKey};
use crate::domain::history::HistoryCache;

// =============================================================================
// Subscriber Capability
// =============================================================================

/// Unique identifier for a subscriber sink.
pub type SubscriberId = u64;

/// Result of one delivery attempt to a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The event was accepted by the subscriber's queue.
    Delivered,
    /// The subscriber's bounded queue is full; the client is too slow.
    Overflow,
    /// The subscriber is gone; its queue has been closed.
    Closed,
}

/// The single uniform subscriber capability.
///
/// Every subscriber, regardless of implementation, is invoked through this
/// one method; there is no runtime type inspection and no distinction
/// between sync and async callbacks. Implementations must not block.
pub trait EventSink: Send + Sync {
    /// Deliver one event, reporting the outcome instead of panicking or
    /// propagating errors into the fan-out loop.
    fn deliver(&self, event: Arc<NormalizedEvent>) -> DeliveryOutcome;
}

// =============================================================================
// Feed Lifecycle
// =============================================================================

/// Lifecycle state of one upstream feed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and not currently trying.
    Disconnected,
    /// Dialing the provider.
    Connecting,
    /// Live and reading frames.
    Connected,
    /// Waiting out a retry delay after a transport failure.
    Backoff,
    /// Terminal; only reached via explicit stop.
    Stopped,
}

impl ConnectionState {
    /// Name for logs and the health payload.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Backoff => "backoff",
            Self::Stopped => "stopped",
        }
    }
}

/// Observable status of one upstream feed, shared between the connection
/// task, the registry, and the health endpoint.
#[derive(Debug)]
pub struct FeedStatus {
    state: RwLock<ConnectionState>,
    last_connected_at: RwLock<Option<DateTime<Utc>>>,
    messages_received: AtomicU64,
    reconnect_attempts: AtomicU32,
}

impl FeedStatus {
    /// Create a status handle in the `Disconnected` state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ConnectionState::Disconnected),
            last_connected_at: RwLock::new(None),
            messages_received: AtomicU64::new(0),
            reconnect_attempts: AtomicU32::new(0),
        }
    }

    /// Record a state transition. Entering `Connected` stamps the time and
    /// resets the reconnect-attempt counter.
    pub fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
        if state == ConnectionState::Connected {
            *self.last_connected_at.write() = Some(Utc::now());
            self.reconnect_attempts.store(0, Ordering::Relaxed);
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Time of the most recent successful connect.
    #[must_use]
    pub fn last_connected_at(&self) -> Option<DateTime<Utc>> {
        *self.last_connected_at.read()
    }

    /// Count one received frame.
    pub fn record_message(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Total frames received over the lifetime of this feed.
    #[must_use]
    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    /// Count one reconnect attempt.
    pub fn record_reconnect_attempt(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Consecutive reconnect attempts since the last successful connect.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }
}

impl Default for FeedStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a running upstream feed task.
///
/// Cancelling the token tears the connection down; the connection's
/// keepalive child observes a child token, so stopping a feed always stops
/// its children.
pub struct FeedHandle {
    cancel: CancellationToken,
    status: Arc<FeedStatus>,
    task: Option<JoinHandle<()>>,
}

impl FeedHandle {
    /// Create a handle from its parts. `task` may be `None` for feeds that
    /// run outside the tokio runtime (tests).
    #[must_use]
    pub const fn new(
        cancel: CancellationToken,
        status: Arc<FeedStatus>,
        task: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            cancel,
            status,
            task,
        }
    }

    /// Signal the feed (and, transitively, its keepalive child) to stop.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Whether the feed has been told to stop.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Observable feed status.
    #[must_use]
    pub fn status(&self) -> &Arc<FeedStatus> {
        &self.status
    }

    /// Take the task handle for awaiting completion during shutdown.
    pub fn take_task(&mut self) -> Option<JoinHandle<()>> {
        self.task.take()
    }
}

/// Publishes normalized events from one feed into the registry.
///
/// Holds only a weak reference so a feed task never keeps the registry
/// alive after shutdown.
#[derive(Clone)]
pub struct EventPublisher {
    key: StreamKey,
    registry: Weak<StreamRegistry>,
}

impl EventPublisher {
    /// The key this publisher feeds.
    #[must_use]
    pub const fn key(&self) -> &StreamKey {
        &self.key
    }

    /// Publish one event; a no-op once the registry is gone.
    pub fn publish(&self, event: NormalizedEvent) {
        if let Some(registry) = self.registry.upgrade() {
            registry.publish(&self.key, event);
        }
    }
}

/// Creates the upstream feed task for a stream key.
///
/// The registry calls this exactly once per live key, under its lock, so
/// implementations never see two spawns for the same key racing.
pub trait FeedSpawner: Send + Sync {
    /// Start the feed for `key`, publishing through `publisher`.
    fn spawn(&self, key: &StreamKey, publisher: EventPublisher) -> FeedHandle;
}

// =============================================================================
// Registry
// =============================================================================

/// Outcome of an attach call.
pub struct AttachOutcome {
    /// Identifier to use for the matching detach.
    pub subscriber_id: SubscriberId,
    /// Whether this attach created the upstream feed.
    pub created: bool,
    /// History snapshot taken atomically with registration, so the caller
    /// never misses the causal ordering between its snapshot and the live
    /// events that follow.
    pub snapshot: Vec<Arc<NormalizedEvent>>,
}

/// Outcome of a detach call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetachOutcome {
    /// Whether the subscriber was registered.
    pub removed: bool,
    /// Whether this detach stopped the upstream feed (last subscriber).
    pub stopped_feed: bool,
}

/// Health-facing view of one live stream.
#[derive(Debug, Clone)]
pub struct StreamStats {
    /// Provider stream name (`btcusdt@forceOrder`).
    pub stream: String,
    /// Feed connection state.
    pub state: ConnectionState,
    /// Number of attached subscribers.
    pub subscribers: usize,
    /// Frames received from the provider.
    pub messages_received: u64,
    /// Consecutive reconnect attempts.
    pub reconnect_attempts: u32,
    /// Events currently buffered for snapshots.
    pub history_len: usize,
}

struct StreamEntry {
    feed: FeedHandle,
    history: HistoryCache,
    subscribers: HashMap<SubscriberId, Arc<dyn EventSink>>,
}

/// Thread-safe registry of live streams.
pub struct StreamRegistry {
    streams: Mutex<HashMap<StreamKey, StreamEntry>>,
    spawner: Arc<dyn FeedSpawner>,
    history_capacity: usize,
    next_subscriber_id: AtomicU64,
}

impl StreamRegistry {
    /// Create a registry that starts feeds through `spawner` and retains
    /// `history_capacity` events per key.
    #[must_use]
    pub fn new(spawner: Arc<dyn FeedSpawner>, history_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            streams: Mutex::new(HashMap::new()),
            spawner,
            history_capacity,
            next_subscriber_id: AtomicU64::new(1),
        })
    }

    /// Publisher for `key`. Events published through it reach this
    /// registry for as long as the registry is alive.
    #[must_use]
    pub fn publisher(self: &Arc<Self>, key: &StreamKey) -> EventPublisher {
        EventPublisher {
            key: key.clone(),
            registry: Arc::downgrade(self),
        }
    }

    /// Register a sink for `key`, creating and starting the upstream feed
    /// if this is the first subscriber. Atomic under concurrent attaches
    /// for the same key: exactly one feed is ever created.
    pub fn attach(self: &Arc<Self>, key: &StreamKey, sink: Arc<dyn EventSink>) -> AttachOutcome {
        let subscriber_id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let mut streams = self.streams.lock();

        let created = !streams.contains_key(key);
        let entry = streams.entry(key.clone()).or_insert_with(|| {
            let publisher = self.publisher(key);
            tracing::info!(stream = %key, "Starting upstream feed");
            StreamEntry {
                feed: self.spawner.spawn(key, publisher),
                history: HistoryCache::new(self.history_capacity),
                subscribers: HashMap::new(),
            }
        });

        entry.subscribers.insert(subscriber_id, sink);
        tracing::debug!(
            stream = %key,
            subscriber_id,
            subscribers = entry.subscribers.len(),
            "Subscriber attached"
        );

        AttachOutcome {
            subscriber_id,
            created,
            snapshot: entry.history.snapshot(),
        }
    }

    /// Remove a sink; the last detach for a key stops its feed and drops
    /// the entry (reference-counted teardown).
    pub fn detach(&self, key: &StreamKey, subscriber_id: SubscriberId) -> DetachOutcome {
        let mut streams = self.streams.lock();

        let Some(entry) = streams.get_mut(key) else {
            return DetachOutcome {
                removed: false,
                stopped_feed: false,
            };
        };

        let removed = entry.subscribers.remove(&subscriber_id).is_some();
        if removed {
            tracing::debug!(stream = %key, subscriber_id, "Subscriber detached");
        }

        let mut stopped_feed = false;
        if entry.subscribers.is_empty() {
            if let Some(entry) = streams.remove(key) {
                entry.feed.stop();
                stopped_feed = true;
                tracing::info!(stream = %key, "Last subscriber left, stopping upstream feed");
            }
        }

        DetachOutcome {
            removed,
            stopped_feed,
        }
    }

    /// Push `event` into the key's history, then fan it out to every sink.
    ///
    /// A failing sink is logged and detached after the pass; it never stops
    /// iteration over the remaining sinks. Returns the number of successful
    /// deliveries.
    pub fn publish(&self, key: &StreamKey, event: NormalizedEvent) -> usize {
        let mut streams = self.streams.lock();

        let Some(entry) = streams.get_mut(key) else {
            // Feed torn down while a frame was in flight.
            tracing::trace!(stream = %key, "Dropping event for stopped stream");
            return 0;
        };

        let event = Arc::new(event);
        entry.history.push(Arc::clone(&event));

        let mut delivered = 0usize;
        let mut failed: Vec<(SubscriberId, DeliveryOutcome)> = Vec::new();

        for (&id, sink) in &entry.subscribers {
            match sink.deliver(Arc::clone(&event)) {
                DeliveryOutcome::Delivered => delivered += 1,
                outcome => failed.push((id, outcome)),
            }
        }

        for (id, outcome) in failed {
            match outcome {
                DeliveryOutcome::Overflow => {
                    tracing::warn!(
                        stream = %key,
                        subscriber_id = id,
                        "Subscriber queue overflow, disconnecting slow client"
                    );
                }
                DeliveryOutcome::Closed => {
                    tracing::debug!(stream = %key, subscriber_id = id, "Subscriber gone");
                }
                DeliveryOutcome::Delivered => {}
            }
            entry.subscribers.remove(&id);
        }

        if entry.subscribers.is_empty() {
            if let Some(entry) = streams.remove(key) {
                entry.feed.stop();
                tracing::info!(stream = %key, "All subscribers failed, stopping upstream feed");
            }
        }

        delivered
    }

    /// History snapshot for a key; empty when the stream is not live.
    #[must_use]
    pub fn snapshot(&self, key: &StreamKey) -> Vec<Arc<NormalizedEvent>> {
        self.streams
            .lock()
            .get(key)
            .map(|entry| entry.history.snapshot())
            .unwrap_or_default()
    }

    /// Number of live streams.
    #[must_use]
    pub fn stream_count(&self) -> usize {
        self.streams.lock().len()
    }

    /// Total attached subscribers across all streams.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.streams
            .lock()
            .values()
            .map(|entry| entry.subscribers.len())
            .sum()
    }

    /// Health-facing view of every live stream.
    #[must_use]
    pub fn stats(&self) -> Vec<StreamStats> {
        self.streams
            .lock()
            .iter()
            .map(|(key, entry)| StreamStats {
                stream: key.provider_stream(),
                state: entry.feed.status().state(),
                subscribers: entry.subscribers.len(),
                messages_received: entry.feed.status().messages_received(),
                reconnect_attempts: entry.feed.status().reconnect_attempts(),
                history_len: entry.history.len(),
            })
            .collect()
    }

    /// Stop every feed and drain the registry, returning the handles so
    /// the caller can await task completion.
    pub fn shutdown(&self) -> Vec<FeedHandle> {
        let mut streams = self.streams.lock();
        streams
            .drain()
            .map(|(key, entry)| {
                entry.feed.stop();
                tracing::info!(stream = %key, "Feed stopped during shutdown");
                entry.feed
            })
            .collect()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use rust_decimal::Decimal;

    use super::*;
    use crate::domain::event::{Side, StreamKind};

    /// Spawner that only records spawn counts and hands out tokens.
    #[derive(Default)]
    struct RecordingSpawner {
        spawned: AtomicUsize,
        handles: Mutex<Vec<CancellationToken>>,
    }

    impl FeedSpawner for RecordingSpawner {
        fn spawn(&self, _key: &StreamKey, _publisher: EventPublisher) -> FeedHandle {
            self.spawned.fetch_add(1, Ordering::SeqCst);
            let token = CancellationToken::new();
            self.handles.lock().push(token.clone());
            FeedHandle::new(token, Arc::new(FeedStatus::new()), None)
        }
    }

    /// Sink that records deliveries, optionally failing every call.
    struct TestSink {
        delivered: AtomicUsize,
        outcome: DeliveryOutcome,
    }

    impl TestSink {
        fn ok() -> Arc<Self> {
            Arc::new(Self {
                delivered: AtomicUsize::new(0),
                outcome: DeliveryOutcome::Delivered,
            })
        }

        fn failing(outcome: DeliveryOutcome) -> Arc<Self> {
            Arc::new(Self {
                delivered: AtomicUsize::new(0),
                outcome,
            })
        }

        fn count(&self) -> usize {
            self.delivered.load(Ordering::SeqCst)
        }
    }

    impl EventSink for TestSink {
        fn deliver(&self, _event: Arc<NormalizedEvent>) -> DeliveryOutcome {
            if self.outcome == DeliveryOutcome::Delivered {
                self.delivered.fetch_add(1, Ordering::SeqCst);
            }
            self.outcome
        }
    }

    fn liq_key() -> StreamKey {
        StreamKey::new(StreamKind::Liquidations, "btcusdt", None).unwrap()
    }

    fn sample_event(n: i64) -> NormalizedEvent {
        NormalizedEvent::new("BTCUSDT", Side::Sell, Decimal::from(n), Decimal::TEN, n)
    }

    #[test]
    fn first_attach_creates_feed_second_reuses() {
        let spawner = Arc::new(RecordingSpawner::default());
        let registry = StreamRegistry::new(Arc::clone(&spawner) as Arc<dyn FeedSpawner>, 50);
        let key = liq_key();

        let first = registry.attach(&key, TestSink::ok());
        let second = registry.attach(&key, TestSink::ok());

        assert!(first.created);
        assert!(!second.created);
        assert_ne!(first.subscriber_id, second.subscriber_id);
        assert_eq!(spawner.spawned.load(Ordering::SeqCst), 1);
        assert_eq!(registry.subscriber_count(), 2);
    }

    #[test]
    fn concurrent_attaches_create_one_feed() {
        let spawner = Arc::new(RecordingSpawner::default());
        let registry = StreamRegistry::new(Arc::clone(&spawner) as Arc<dyn FeedSpawner>, 50);
        let key = liq_key();

        let mut threads = Vec::new();
        for _ in 0..16 {
            let registry = Arc::clone(&registry);
            let key = key.clone();
            threads.push(std::thread::spawn(move || {
                registry.attach(&key, TestSink::ok());
            }));
        }
        for thread in threads {
            thread.join().unwrap();
        }

        assert_eq!(spawner.spawned.load(Ordering::SeqCst), 1);
        assert_eq!(registry.stream_count(), 1);
        assert_eq!(registry.subscriber_count(), 16);
    }

    #[test]
    fn publish_reaches_all_sinks_and_fills_history() {
        let registry = StreamRegistry::new(Arc::new(RecordingSpawner::default()), 50);
        let key = liq_key();

        let a = TestSink::ok();
        let b = TestSink::ok();
        registry.attach(&key, Arc::clone(&a) as Arc<dyn EventSink>);
        registry.attach(&key, Arc::clone(&b) as Arc<dyn EventSink>);

        let delivered = registry.publish(&key, sample_event(1));

        assert_eq!(delivered, 2);
        assert_eq!(a.count(), 1);
        assert_eq!(b.count(), 1);
        assert_eq!(registry.snapshot(&key).len(), 1);
    }

    #[test]
    fn failing_sink_does_not_affect_others() {
        let registry = StreamRegistry::new(Arc::new(RecordingSpawner::default()), 50);
        let key = liq_key();

        let healthy: Vec<_> = (0..4).map(|_| TestSink::ok()).collect();
        for sink in &healthy {
            registry.attach(&key, Arc::clone(sink) as Arc<dyn EventSink>);
        }
        registry.attach(&key, TestSink::failing(DeliveryOutcome::Overflow));

        let delivered = registry.publish(&key, sample_event(1));

        assert_eq!(delivered, 4);
        for sink in &healthy {
            assert_eq!(sink.count(), 1);
        }
        // Overflowing sink was disconnected.
        assert_eq!(registry.subscriber_count(), 4);

        // Subsequent publishes still reach the healthy sinks.
        registry.publish(&key, sample_event(2));
        for sink in &healthy {
            assert_eq!(sink.count(), 2);
        }
    }

    #[test]
    fn snapshot_is_atomic_with_attach() {
        let registry = StreamRegistry::new(Arc::new(RecordingSpawner::default()), 50);
        let key = liq_key();

        registry.attach(&key, TestSink::ok());
        registry.publish(&key, sample_event(1));
        registry.publish(&key, sample_event(2));

        let late = TestSink::ok();
        let outcome = registry.attach(&key, Arc::clone(&late) as Arc<dyn EventSink>);
        assert_eq!(outcome.snapshot.len(), 2);

        // The late subscriber only sees events after its snapshot.
        registry.publish(&key, sample_event(3));
        assert_eq!(late.count(), 1);
    }

    #[test]
    fn last_detach_stops_feed_and_removes_entry() {
        let spawner = Arc::new(RecordingSpawner::default());
        let registry = StreamRegistry::new(Arc::clone(&spawner) as Arc<dyn FeedSpawner>, 50);
        let key = liq_key();

        let first = registry.attach(&key, TestSink::ok());
        let second = registry.attach(&key, TestSink::ok());

        let outcome = registry.detach(&key, first.subscriber_id);
        assert!(outcome.removed);
        assert!(!outcome.stopped_feed);

        let outcome = registry.detach(&key, second.subscriber_id);
        assert!(outcome.removed);
        assert!(outcome.stopped_feed);

        assert_eq!(registry.stream_count(), 0);
        assert!(spawner.handles.lock()[0].is_cancelled());
    }

    #[test]
    fn detach_unknown_subscriber_is_noop() {
        let registry = StreamRegistry::new(Arc::new(RecordingSpawner::default()), 50);
        let key = liq_key();

        registry.attach(&key, TestSink::ok());
        let outcome = registry.detach(&key, 9999);

        assert!(!outcome.removed);
        assert!(!outcome.stopped_feed);
        assert_eq!(registry.stream_count(), 1);
    }

    #[test]
    fn attach_detach_storm_leaves_no_leaked_feeds() {
        let spawner = Arc::new(RecordingSpawner::default());
        let registry = StreamRegistry::new(Arc::clone(&spawner) as Arc<dyn FeedSpawner>, 50);
        let key = liq_key();

        for _ in 0..100 {
            let outcome = registry.attach(&key, TestSink::ok());
            registry.detach(&key, outcome.subscriber_id);
        }

        assert_eq!(registry.stream_count(), 0);
        let handles = spawner.handles.lock();
        assert_eq!(handles.len(), 100);
        assert!(handles.iter().all(CancellationToken::is_cancelled));
    }

    #[test]
    fn publish_after_teardown_is_dropped() {
        let registry = StreamRegistry::new(Arc::new(RecordingSpawner::default()), 50);
        let key = liq_key();

        let outcome = registry.attach(&key, TestSink::ok());
        registry.detach(&key, outcome.subscriber_id);

        assert_eq!(registry.publish(&key, sample_event(1)), 0);
        assert!(registry.snapshot(&key).is_empty());
    }

    #[test]
    fn history_respects_capacity_through_publish() {
        let registry = StreamRegistry::new(Arc::new(RecordingSpawner::default()), 50);
        let key = liq_key();
        registry.attach(&key, TestSink::ok());

        for n in 0..80 {
            registry.publish(&key, sample_event(n));
        }

        let snapshot = registry.snapshot(&key);
        assert_eq!(snapshot.len(), 50);
        assert_eq!(snapshot.first().unwrap().timestamp_ms, 30);
        assert_eq!(snapshot.last().unwrap().timestamp_ms, 79);
    }

    #[test]
    fn shutdown_stops_every_feed() {
        let spawner = Arc::new(RecordingSpawner::default());
        let registry = StreamRegistry::new(Arc::clone(&spawner) as Arc<dyn FeedSpawner>, 50);

        registry.attach(&liq_key(), TestSink::ok());
        let trades = StreamKey::new(StreamKind::Trades, "ethusdt", None).unwrap();
        registry.attach(&trades, TestSink::ok());

        let handles = registry.shutdown();

        assert_eq!(handles.len(), 2);
        assert_eq!(registry.stream_count(), 0);
        assert!(spawner.handles.lock().iter().all(CancellationToken::is_cancelled));
    }
}
