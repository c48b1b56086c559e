//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the seams defined
//! in the domain and application layers.

/// Provider WebSocket feed adapters.
pub mod binance;

/// Configuration loading.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;

/// Downstream WebSocket server and sessions.
pub mod ws;
