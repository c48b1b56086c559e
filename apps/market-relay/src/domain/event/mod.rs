//! Normalized Market Event Types
//!
//! Core domain types for relayed market data: stream identities and the
//! canonical normalized event. These types are provider-agnostic and
//! represent the internal representation every downstream client sees.
//!
//! # Decimal Discipline
//!
//! All quantities and prices are `rust_decimal::Decimal` and serialize as
//! exact decimal strings. Binary floats never touch financial values.

use chrono::DateTime;
use rust_decimal::Decimal;
use serde::Serialize;

// =============================================================================
// Stream Identity
// =============================================================================

/// The kind of market data stream being relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// Forced-liquidation orders.
    Liquidations,
    /// Order-book delta updates.
    OrderBook,
    /// Aggregated trade prints.
    Trades,
    /// Candle (kline) ticks; requires a timeframe.
    Candles,
}

impl StreamKind {
    /// All stream kinds.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Liquidations,
            Self::OrderBook,
            Self::Trades,
            Self::Candles,
        ]
    }

    /// The event-type discriminator the provider puts in each frame.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Liquidations => "forceOrder",
            Self::OrderBook => "depthUpdate",
            Self::Trades => "aggTrade",
            Self::Candles => "kline",
        }
    }

    /// Name used in downstream wire message types and URL paths.
    #[must_use]
    pub const fn wire_name(&self) -> &'static str {
        match self {
            Self::Liquidations => "liquidations",
            Self::OrderBook => "orderbook",
            Self::Trades => "trades",
            Self::Candles => "candles",
        }
    }

    /// Parse a stream kind from its wire/path name.
    #[must_use]
    pub fn from_wire_name(name: &str) -> Option<Self> {
        match name {
            "liquidations" => Some(Self::Liquidations),
            "orderbook" => Some(Self::OrderBook),
            "trades" => Some(Self::Trades),
            "candles" => Some(Self::Candles),
            _ => None,
        }
    }

    /// Whether this kind is scoped to a candle timeframe.
    #[must_use]
    pub const fn requires_timeframe(&self) -> bool {
        matches!(self, Self::Candles)
    }
}

/// Candle timeframe, in the provider's interval vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Timeframe {
    M1,
    M3,
    M5,
    M15,
    M30,
    H1,
    H2,
    H4,
    H6,
    H12,
    D1,
    W1,
}

impl Timeframe {
    /// Provider interval token (`1m`, `1h`, ...).
    #[must_use]
    pub const fn as_interval(&self) -> &'static str {
        match self {
            Self::M1 => "1m",
            Self::M3 => "3m",
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::M30 => "30m",
            Self::H1 => "1h",
            Self::H2 => "2h",
            Self::H4 => "4h",
            Self::H6 => "6h",
            Self::H12 => "12h",
            Self::D1 => "1d",
            Self::W1 => "1w",
        }
    }

    /// Parse a provider interval token.
    #[must_use]
    pub fn from_interval(s: &str) -> Option<Self> {
        match s {
            "1m" => Some(Self::M1),
            "3m" => Some(Self::M3),
            "5m" => Some(Self::M5),
            "15m" => Some(Self::M15),
            "30m" => Some(Self::M30),
            "1h" => Some(Self::H1),
            "2h" => Some(Self::H2),
            "4h" => Some(Self::H4),
            "6h" => Some(Self::H6),
            "12h" => Some(Self::H12),
            "1d" => Some(Self::D1),
            "1w" => Some(Self::W1),
            _ => None,
        }
    }
}

/// Errors constructing a [`StreamKey`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StreamKeyError {
    /// Candle streams must carry a timeframe.
    #[error("stream kind {0} requires a timeframe")]
    MissingTimeframe(&'static str),
    /// Non-candle streams must not carry a timeframe.
    #[error("stream kind {0} does not take a timeframe")]
    UnexpectedTimeframe(&'static str),
    /// Symbol must be non-empty.
    #[error("empty symbol")]
    EmptySymbol,
}

/// Canonical identity of one upstream feed: `(kind, symbol[, timeframe])`.
///
/// The symbol is stored in provider format (lowercase, no separators),
/// distinct from the user-facing display symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamKey {
    kind: StreamKind,
    symbol: String,
    timeframe: Option<Timeframe>,
}

impl StreamKey {
    /// Create a stream key, enforcing the timeframe rules per kind.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty symbol, a candle key without a
    /// timeframe, or a non-candle key with one.
    pub fn new(
        kind: StreamKind,
        symbol: impl Into<String>,
        timeframe: Option<Timeframe>,
    ) -> Result<Self, StreamKeyError> {
        let symbol = symbol.into().to_lowercase();
        if symbol.is_empty() {
            return Err(StreamKeyError::EmptySymbol);
        }
        match (kind.requires_timeframe(), timeframe) {
            (true, None) => Err(StreamKeyError::MissingTimeframe(kind.wire_name())),
            (false, Some(_)) => Err(StreamKeyError::UnexpectedTimeframe(kind.wire_name())),
            _ => Ok(Self {
                kind,
                symbol,
                timeframe,
            }),
        }
    }

    /// The stream kind.
    #[must_use]
    pub const fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Provider-format symbol (lowercase).
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// User-facing display symbol (uppercase).
    #[must_use]
    pub fn display_symbol(&self) -> String {
        self.symbol.to_uppercase()
    }

    /// Candle timeframe, if any.
    #[must_use]
    pub const fn timeframe(&self) -> Option<Timeframe> {
        self.timeframe
    }

    /// Provider stream name used in the upstream endpoint path
    /// (`btcusdt@forceOrder`, `btcusdt@kline_1m`).
    #[must_use]
    pub fn provider_stream(&self) -> String {
        match (self.kind, self.timeframe) {
            (StreamKind::Candles, Some(tf)) => {
                format!("{}@kline_{}", self.symbol, tf.as_interval())
            }
            (StreamKind::Liquidations, _) => format!("{}@forceOrder", self.symbol),
            (StreamKind::OrderBook, _) => format!("{}@depth", self.symbol),
            (StreamKind::Trades, _) => format!("{}@aggTrade", self.symbol),
            // Unreachable by construction; fall back to the raw symbol.
            (StreamKind::Candles, None) => self.symbol.clone(),
        }
    }
}

impl std::fmt::Display for StreamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.provider_stream())
    }
}

// =============================================================================
// Normalized Event
// =============================================================================

/// Taker side of a market event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buy-side aggression.
    Buy,
    /// Sell-side aggression.
    Sell,
}

impl Side {
    /// Parse the provider's side token.
    #[must_use]
    pub fn from_provider(s: &str) -> Option<Self> {
        match s {
            "BUY" => Some(Self::Buy),
            "SELL" => Some(Self::Sell),
            _ => None,
        }
    }
}

/// The canonical, decimal-safe, display-formatted representation of one
/// raw provider message.
///
/// Created once per raw frame by the normalizer; after fan-out it is only
/// retained inside the per-key history cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedEvent {
    /// Display symbol (uppercase).
    pub symbol: String,
    /// Taker side.
    pub side: Side,
    /// Exact base quantity.
    #[serde(with = "rust_decimal::serde::str")]
    pub quantity: Decimal,
    /// Exact price.
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    /// Notional value (`quantity * price`).
    #[serde(with = "rust_decimal::serde::str")]
    pub notional: Decimal,
    /// Human-readable quantity.
    pub quantity_display: String,
    /// Human-readable price.
    pub price_display: String,
    /// Human-readable notional value.
    pub notional_display: String,
    /// Event timestamp in epoch milliseconds.
    pub timestamp_ms: i64,
    /// Wall-clock `HH:MM:SS` (UTC) derived from `timestamp_ms`.
    pub display_time: String,
}

impl NormalizedEvent {
    /// Build an event from its exact fields, computing the notional value
    /// and all display strings.
    #[must_use]
    pub fn new(
        symbol: impl Into<String>,
        side: Side,
        quantity: Decimal,
        price: Decimal,
        timestamp_ms: i64,
    ) -> Self {
        let notional = quantity * price;
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            price,
            notional,
            quantity_display: format_magnitude(quantity),
            price_display: format_magnitude(price),
            notional_display: format_magnitude(notional),
            timestamp_ms,
            display_time: format_display_time(timestamp_ms),
        }
    }
}

/// Threshold above which values switch to grouped 2-decimal formatting.
const GROUPING_THRESHOLD: Decimal = Decimal::ONE_THOUSAND;

/// Maximum decimal places shown for small values.
const SMALL_VALUE_PRECISION: u32 = 6;

/// Format a value with magnitude-dependent precision.
///
/// Values with absolute magnitude >= 1000 get thousands separators and
/// exactly 2 decimal places; smaller values keep full precision up to
/// 6 decimal places with trailing zeros trimmed. The threshold and
/// precision are part of the output contract and must not change.
#[must_use]
pub fn format_magnitude(value: Decimal) -> String {
    if value.abs() >= GROUPING_THRESHOLD {
        group_thousands(value.round_dp(2))
    } else {
        value.round_dp(SMALL_VALUE_PRECISION).normalize().to_string()
    }
}

/// Render a decimal with 2 fixed decimal places and `,` thousands grouping.
fn group_thousands(value: Decimal) -> String {
    let raw = format!("{value:.2}");
    let (sign, digits) = raw
        .strip_prefix('-')
        .map_or(("", raw.as_str()), |rest| ("-", rest));
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!("{sign}{grouped}.{frac_part}")
}

/// Format an epoch-millisecond timestamp as `HH:MM:SS` (UTC).
///
/// Out-of-range timestamps render as `00:00:00` rather than failing; the
/// exact timestamp is still carried in `timestamp_ms`.
#[must_use]
pub fn format_display_time(timestamp_ms: i64) -> String {
    DateTime::from_timestamp_millis(timestamp_ms)
        .map_or_else(|| "00:00:00".to_string(), |dt| dt.format("%H:%M:%S").to_string())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use test_case::test_case;

    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn stream_key_provider_names() {
        let key = StreamKey::new(StreamKind::Liquidations, "BTCUSDT", None).unwrap();
        assert_eq!(key.provider_stream(), "btcusdt@forceOrder");

        let key = StreamKey::new(StreamKind::Trades, "ethusdt", None).unwrap();
        assert_eq!(key.provider_stream(), "ethusdt@aggTrade");

        let key = StreamKey::new(StreamKind::OrderBook, "solusdt", None).unwrap();
        assert_eq!(key.provider_stream(), "solusdt@depth");

        let key = StreamKey::new(StreamKind::Candles, "BTCUSDT", Some(Timeframe::H1)).unwrap();
        assert_eq!(key.provider_stream(), "btcusdt@kline_1h");
    }

    #[test]
    fn stream_key_symbol_is_provider_format() {
        let key = StreamKey::new(StreamKind::Trades, "BTCUSDT", None).unwrap();
        assert_eq!(key.symbol(), "btcusdt");
        assert_eq!(key.display_symbol(), "BTCUSDT");
    }

    #[test]
    fn stream_key_timeframe_rules() {
        assert_eq!(
            StreamKey::new(StreamKind::Candles, "btcusdt", None),
            Err(StreamKeyError::MissingTimeframe("candles"))
        );
        assert_eq!(
            StreamKey::new(StreamKind::Trades, "btcusdt", Some(Timeframe::M1)),
            Err(StreamKeyError::UnexpectedTimeframe("trades"))
        );
        assert_eq!(
            StreamKey::new(StreamKind::Trades, "", None),
            Err(StreamKeyError::EmptySymbol)
        );
    }

    #[test]
    fn stream_kind_wire_round_trip() {
        for kind in StreamKind::all() {
            assert_eq!(StreamKind::from_wire_name(kind.wire_name()), Some(*kind));
        }
        assert_eq!(StreamKind::from_wire_name("quotes"), None);
    }

    #[test_case("1m", Timeframe::M1)]
    #[test_case("15m", Timeframe::M15)]
    #[test_case("1h", Timeframe::H1)]
    #[test_case("1d", Timeframe::D1)]
    fn timeframe_round_trip(token: &str, tf: Timeframe) {
        assert_eq!(Timeframe::from_interval(token), Some(tf));
        assert_eq!(tf.as_interval(), token);
    }

    #[test]
    fn timeframe_rejects_unknown() {
        assert_eq!(Timeframe::from_interval("7m"), None);
    }

    #[test]
    fn format_small_values_keep_precision() {
        assert_eq!(format_magnitude(dec("0.014")), "0.014");
        assert_eq!(format_magnitude(dec("138.740")), "138.74");
        assert_eq!(format_magnitude(dec("999.999999")), "999.999999");
    }

    #[test]
    fn format_small_values_cap_at_six_places() {
        assert_eq!(format_magnitude(dec("0.12345678")), "0.123457");
    }

    #[test]
    fn format_large_values_group_thousands() {
        assert_eq!(format_magnitude(dec("9910")), "9,910.00");
        assert_eq!(format_magnitude(dec("1234567.891")), "1,234,567.89");
        assert_eq!(format_magnitude(dec("1000")), "1,000.00");
    }

    #[test]
    fn format_threshold_boundary() {
        // 999.x stays in full precision, 1000 switches to grouping.
        assert_eq!(format_magnitude(dec("999.99")), "999.99");
        assert_eq!(format_magnitude(dec("1000.5")), "1,000.50");
    }

    #[test]
    fn format_negative_values() {
        assert_eq!(format_magnitude(dec("-1234.5")), "-1,234.50");
        assert_eq!(format_magnitude(dec("-0.5")), "-0.5");
    }

    #[test]
    fn display_time_from_epoch_millis() {
        // 2019-09-09T08:54:20.893Z
        assert_eq!(format_display_time(1_568_014_460_893), "08:54:20");
    }

    #[test]
    fn normalized_event_computes_notional() {
        let event = NormalizedEvent::new(
            "BTCUSDT",
            Side::Sell,
            dec("0.014"),
            dec("9910"),
            1_568_014_460_893,
        );
        assert_eq!(event.notional, dec("138.740"));
        assert_eq!(event.notional_display, "138.74");
        assert_eq!(event.price_display, "9,910.00");
        assert_eq!(event.display_time, "08:54:20");
    }

    #[test]
    fn normalized_event_serializes_decimals_as_strings() {
        let event = NormalizedEvent::new(
            "BTCUSDT",
            Side::Buy,
            dec("0.5"),
            dec("20000"),
            1_568_014_460_893,
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["quantity"], "0.5");
        assert_eq!(json["price"], "20000");
        assert_eq!(json["notional"], "10000.0");
        assert_eq!(json["side"], "BUY");
    }
}
