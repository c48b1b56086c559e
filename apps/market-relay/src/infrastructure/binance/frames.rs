//! Provider Frame Types
//!
//! Raw JSON payloads as the futures stream endpoints emit them, one type
//! per stream. All numeric fields arrive as strings and stay strings here;
//! decimal parsing happens in the normalizer so a malformed field is a
//! per-frame drop, not a deserialization panic.
//!
//! Each frame carries an `e` discriminator (`forceOrder`, `depthUpdate`,
//! `aggTrade`, `kline`) checked against the stream it arrived on.

use serde::Deserialize;

/// Envelope read first to route a frame by its discriminator.
#[derive(Debug, Deserialize)]
pub struct FrameEnvelope {
    /// Event-type discriminator.
    #[serde(rename = "e")]
    pub event_type: String,
}

/// Forced-liquidation order frame (`forceOrder`).
#[derive(Debug, Deserialize)]
pub struct LiquidationFrame {
    /// Event time in epoch milliseconds.
    #[serde(rename = "E")]
    pub event_time: i64,
    /// The liquidated order.
    #[serde(rename = "o")]
    pub order: LiquidationOrder,
}

/// Order payload nested inside a liquidation frame.
#[derive(Debug, Deserialize)]
pub struct LiquidationOrder {
    /// Symbol; some payload variants omit it at the order level.
    #[serde(rename = "s", default)]
    pub symbol: Option<String>,
    /// Order side token (`BUY`/`SELL`).
    #[serde(rename = "S")]
    pub side: String,
    /// Original order quantity, as a decimal string.
    #[serde(rename = "q")]
    pub quantity: String,
    /// Average fill price, as a decimal string.
    #[serde(rename = "ap")]
    pub avg_price: String,
}

/// Aggregated trade frame (`aggTrade`).
#[derive(Debug, Deserialize)]
pub struct AggTradeFrame {
    /// Symbol.
    #[serde(rename = "s")]
    pub symbol: String,
    /// Trade price, as a decimal string.
    #[serde(rename = "p")]
    pub price: String,
    /// Trade quantity, as a decimal string.
    #[serde(rename = "q")]
    pub quantity: String,
    /// Trade time in epoch milliseconds.
    #[serde(rename = "T")]
    pub trade_time: i64,
    /// Whether the buyer was the maker (true means sell-side aggression).
    #[serde(rename = "m")]
    pub buyer_is_maker: bool,
}

/// Candle tick frame (`kline`).
#[derive(Debug, Deserialize)]
pub struct KlineFrame {
    /// Event time in epoch milliseconds.
    #[serde(rename = "E")]
    pub event_time: i64,
    /// Symbol.
    #[serde(rename = "s")]
    pub symbol: String,
    /// The candle payload.
    #[serde(rename = "k")]
    pub kline: KlinePayload,
}

/// Candle payload nested inside a kline frame.
#[derive(Debug, Deserialize)]
pub struct KlinePayload {
    /// Open price, as a decimal string.
    #[serde(rename = "o")]
    pub open: String,
    /// Close price so far, as a decimal string.
    #[serde(rename = "c")]
    pub close: String,
    /// Base-asset volume so far, as a decimal string.
    #[serde(rename = "v")]
    pub volume: String,
}

/// Order-book delta frame (`depthUpdate`).
#[derive(Debug, Deserialize)]
pub struct DepthFrame {
    /// Event time in epoch milliseconds.
    #[serde(rename = "E")]
    pub event_time: i64,
    /// Symbol.
    #[serde(rename = "s")]
    pub symbol: String,
    /// Updated bids as `[price, quantity]` string pairs.
    #[serde(rename = "b")]
    pub bids: Vec<[String; 2]>,
    /// Updated asks as `[price, quantity]` string pairs.
    #[serde(rename = "a")]
    pub asks: Vec<[String; 2]>,
}
