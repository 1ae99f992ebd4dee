use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order side as understood by the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directional bias committed (or proposed) by the signal engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalSide {
    #[default]
    Flat,
    Long,
    Short,
}

impl SignalSide {
    /// Spot translation: LONG buys, SHORT liquidates, FLAT does nothing.
    pub fn order_side(&self) -> Option<Side> {
        match self {
            SignalSide::Flat => None,
            SignalSide::Long => Some(Side::Buy),
            SignalSide::Short => Some(Side::Sell),
        }
    }
}

impl fmt::Display for SignalSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignalSide::Flat => "FLAT",
            SignalSide::Long => "LONG",
            SignalSide::Short => "SHORT",
        };
        f.write_str(s)
    }
}

/// Closed OHLC bar. Upstream guarantees high/low bracket open/close.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
}

impl Candle {
    pub fn new(open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Self {
        Self { open, high, low, close }
    }

    /// Degenerate bar where every field equals `price`
    pub fn flat(price: Decimal) -> Self {
        Self::new(price, price, price, price)
    }
}

/// Single trade print from the live stream
#[derive(Debug, Clone, PartialEq)]
pub struct TradePrint {
    pub symbol: String,
    pub price: Decimal,
    pub timestamp_ms: i64,
}
