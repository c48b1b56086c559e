//! Frame Normalizer
//!
//! Decodes one raw provider frame into the canonical [`NormalizedEvent`].
//! Every stream kind collapses into the same event shape: a side, an exact
//! quantity, an exact price, and the timestamp.
//!
//! A frame that fails here is dropped by the connection loop with a log
//! line; one bad frame never tears down the feed or reaches subscribers.

use std::str::FromStr;

use rust_decimal::Decimal;

use super::frames::{AggTradeFrame, DepthFrame, FrameEnvelope, KlineFrame, LiquidationFrame};
use crate::domain::event::{NormalizedEvent, Side, StreamKey, StreamKind};

/// Why a frame could not be normalized.
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    /// The payload is not valid JSON for the expected frame shape.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The frame's discriminator does not match the stream it arrived on.
    #[error("unexpected event type: expected {expected}, got {actual}")]
    UnexpectedEventType {
        /// Discriminator the stream key implies.
        expected: &'static str,
        /// Discriminator carried by the frame.
        actual: String,
    },

    /// A side token other than `BUY`/`SELL`.
    #[error("invalid side token: {0}")]
    InvalidSide(String),

    /// A numeric field that does not parse as a decimal.
    #[error("invalid decimal in field {field}: {value}")]
    InvalidDecimal {
        /// Frame field name.
        field: &'static str,
        /// Offending value.
        value: String,
    },

    /// A depth update carrying neither bids nor asks.
    #[error("depth update with no levels")]
    EmptyDepth,
}

/// Stateless decoder from provider frames to normalized events.
#[derive(Debug, Default, Clone, Copy)]
pub struct Normalizer;

impl Normalizer {
    /// Create a normalizer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Normalize one text frame received on the stream identified by `key`.
    ///
    /// # Errors
    ///
    /// Returns [`NormalizeError`] when the frame is malformed, carries the
    /// wrong discriminator, or has an unparseable field. The caller drops
    /// the frame and keeps reading.
    pub fn normalize(
        &self,
        key: &StreamKey,
        text: &str,
    ) -> Result<NormalizedEvent, NormalizeError> {
        let envelope: FrameEnvelope = serde_json::from_str(text)?;
        let expected = key.kind().event_name();
        if envelope.event_type != expected {
            return Err(NormalizeError::UnexpectedEventType {
                expected,
                actual: envelope.event_type,
            });
        }

        match key.kind() {
            StreamKind::Liquidations => self.normalize_liquidation(key, text),
            StreamKind::Trades => self.normalize_trade(text),
            StreamKind::Candles => self.normalize_candle(text),
            StreamKind::OrderBook => self.normalize_depth(text),
        }
    }

    fn normalize_liquidation(
        &self,
        key: &StreamKey,
        text: &str,
    ) -> Result<NormalizedEvent, NormalizeError> {
        let frame: LiquidationFrame = serde_json::from_str(text)?;

        let side = Side::from_provider(&frame.order.side)
            .ok_or_else(|| NormalizeError::InvalidSide(frame.order.side.clone()))?;
        let quantity = parse_decimal("q", &frame.order.quantity)?;
        let price = parse_decimal("ap", &frame.order.avg_price)?;
        let symbol = frame
            .order
            .symbol
            .map_or_else(|| key.display_symbol(), |s| s.to_uppercase());

        Ok(NormalizedEvent::new(
            symbol,
            side,
            quantity,
            price,
            frame.event_time,
        ))
    }

    fn normalize_trade(&self, text: &str) -> Result<NormalizedEvent, NormalizeError> {
        let frame: AggTradeFrame = serde_json::from_str(text)?;

        // Buyer-as-maker means the aggressor sold into the book.
        let side = if frame.buyer_is_maker {
            Side::Sell
        } else {
            Side::Buy
        };
        let quantity = parse_decimal("q", &frame.quantity)?;
        let price = parse_decimal("p", &frame.price)?;

        Ok(NormalizedEvent::new(
            frame.symbol.to_uppercase(),
            side,
            quantity,
            price,
            frame.trade_time,
        ))
    }

    fn normalize_candle(&self, text: &str) -> Result<NormalizedEvent, NormalizeError> {
        let frame: KlineFrame = serde_json::from_str(text)?;

        let open = parse_decimal("k.o", &frame.kline.open)?;
        let close = parse_decimal("k.c", &frame.kline.close)?;
        let volume = parse_decimal("k.v", &frame.kline.volume)?;

        // A candle closing at or above its open reads as buy pressure.
        let side = if close >= open {
            Side::Buy
        } else {
            Side::Sell
        };

        Ok(NormalizedEvent::new(
            frame.symbol.to_uppercase(),
            side,
            volume,
            close,
            frame.event_time,
        ))
    }

    fn normalize_depth(&self, text: &str) -> Result<NormalizedEvent, NormalizeError> {
        let frame: DepthFrame = serde_json::from_str(text)?;

        // Prefer the first updated bid; fall back to the first ask.
        let (side, level) = frame
            .bids
            .first()
            .map(|level| (Side::Buy, level))
            .or_else(|| frame.asks.first().map(|level| (Side::Sell, level)))
            .ok_or(NormalizeError::EmptyDepth)?;

        let price = parse_decimal("price", &level[0])?;
        let quantity = parse_decimal("quantity", &level[1])?;

        Ok(NormalizedEvent::new(
            frame.symbol.to_uppercase(),
            side,
            quantity,
            price,
            frame.event_time,
        ))
    }
}

fn parse_decimal(field: &'static str, value: &str) -> Result<Decimal, NormalizeError> {
    Decimal::from_str(value).map_err(|_| NormalizeError::InvalidDecimal {
        field,
        value: value.to_string(),
    })
}
