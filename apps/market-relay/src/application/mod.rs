//! Application layer - Ports and the relay composition root.

/// Interfaces consumed from external collaborators.
pub mod ports;

/// The subscribe/unsubscribe service over the stream registry.
pub mod relay;
