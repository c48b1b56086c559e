//! Domain layer - Core relay types and logic with no I/O.

/// Stream identities and the canonical normalized event.
pub mod event;

/// Bounded per-stream history for subscriber snapshots.
pub mod history;

/// Stream registry: feed deduplication, fan-out, and lifecycles.
pub mod registry;
