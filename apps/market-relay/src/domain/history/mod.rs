//! Per-Stream History Cache
//!
//! Bounded ring buffer of the most recent normalized events for one
//! stream key, used to snapshot newly-connecting clients. Eviction is by
//! size only, oldest first; entries are never expired by time.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::domain::event::NormalizedEvent;

/// Default number of events retained per stream key.
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Bounded deque of recent events in arrival order.
///
/// Not internally synchronized; the registry guards each cache with its
/// own lock so pushes and snapshots are serialized per key.
#[derive(Debug)]
pub struct HistoryCache {
    entries: VecDeque<Arc<NormalizedEvent>>,
    capacity: usize,
}

impl HistoryCache {
    /// Create a cache holding at most `capacity` events.
    ///
    /// A zero capacity is clamped to 1 so the cache always retains the
    /// most recent event.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an event, evicting the oldest entry once at capacity.
    pub fn push(&mut self, event: Arc<NormalizedEvent>) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(event);
    }

    /// Copy of the retained events in arrival order (oldest first).
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<NormalizedEvent>> {
        self.entries.iter().cloned().collect()
    }

    /// Number of retained events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configured capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for HistoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
