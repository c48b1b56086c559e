//! Downstream WebSocket Surface
//!
//! The wire protocol, the per-client session handler, and the axum server
//! that clients connect to.

/// Wire message types.
pub mod messages;

/// The axum router and server loop.
pub mod server;

/// Per-client session handling.
pub mod session;
