//! Port Interfaces
//!
//! Contracts the relay consumes from the outside world. The symbol
//! directory is an external collaborator in production (an exchange-info
//! lookup); the relay only depends on this narrow seam so sessions can be
//! tested against an in-memory implementation.

/// Symbol validation and provider-format translation.
///
/// `exists` answers whether a user-supplied symbol is tradable; invalid
/// symbols are rejected before any upstream feed is created.
pub trait SymbolDirectory: Send + Sync {
    /// Whether the symbol is known to the exchange.
    fn exists(&self, symbol: &str) -> bool;

    /// Translate a user-facing symbol to the provider's stream format
    /// (lowercase, separators stripped): `BTC/USDT` -> `btcusdt`.
    fn to_provider_format(&self, symbol: &str) -> String;
}
