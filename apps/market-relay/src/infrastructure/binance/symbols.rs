//! Known Symbol Directory
//!
//! In-memory implementation of the symbol directory: a fixed set of
//! perpetual markets, optionally extended through configuration. Lookup is
//! tolerant of case and separators so `BTC/USDT`, `btc-usdt`, and
//! `BTCUSDT` all resolve to the same market.

use std::collections::HashSet;

use crate::application::ports::SymbolDirectory;

/// Markets accepted by default.
const DEFAULT_MARKETS: &[&str] = &[
    "BTCUSDT", "ETHUSDT", "BNBUSDT", "SOLUSDT", "XRPUSDT", "ADAUSDT", "DOGEUSDT", "AVAXUSDT",
    "DOTUSDT", "LINKUSDT", "LTCUSDT", "MATICUSDT", "NEARUSDT", "ATOMUSDT", "UNIUSDT", "APTUSDT",
    "ARBUSDT", "OPUSDT", "SUIUSDT", "TRXUSDT",
];

/// Directory backed by a fixed symbol set.
pub struct KnownSymbolDirectory {
    symbols: HashSet<String>,
}

impl KnownSymbolDirectory {
    /// Create a directory over the given symbols (any case/separators).
    pub fn new<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            symbols: symbols
                .into_iter()
                .map(|s| canonicalize(s.as_ref()))
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    /// Directory over the default market set plus `extra` symbols.
    #[must_use]
    pub fn with_defaults(extra: &[String]) -> Self {
        let mut directory = Self::new(DEFAULT_MARKETS.iter().copied());
        directory
            .symbols
            .extend(extra.iter().map(|s| canonicalize(s)).filter(|s| !s.is_empty()));
        directory
    }

    /// Number of known symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Whether the directory is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl SymbolDirectory for KnownSymbolDirectory {
    fn exists(&self, symbol: &str) -> bool {
        self.symbols.contains(&canonicalize(symbol))
    }

    fn to_provider_format(&self, symbol: &str) -> String {
        canonicalize(symbol).to_lowercase()
    }
}

/// Uppercase and strip separators: `btc/usdt` -> `BTCUSDT`.
fn canonicalize(symbol: &str) -> String {
    symbol
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}
