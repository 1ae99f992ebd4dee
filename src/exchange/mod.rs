//! Collaborator contracts consumed by the engine, and the Binance spot
//! client that fulfils them.

pub mod binance;

use crate::data::{Candle, OrderStatus, Side};
use crate::error::EngineResult;
use crate::risk::{Admitted, OrderType, TradingRules};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;

pub use binance::{BinanceRestClient, TradeStream};

/// Closed candles, oldest first, on demand
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn closed_candles(&self, symbol: &str, interval: &str, limit: u32) -> EngineResult<Vec<Candle>>;
}

/// Total (free + locked) holdings per asset
#[async_trait]
pub trait AccountSource: Send + Sync {
    async fn balances(&self) -> EngineResult<HashMap<String, Decimal>>;
}

/// Lot/tick/notional rules for the requested symbols. Symbols the exchange
/// does not list are simply absent from the result.
#[async_trait]
pub trait RulesSource: Send + Sync {
    async fn trading_rules(&self, symbols: &[String]) -> EngineResult<HashMap<String, TradingRules>>;
}

/// An order that already passed admission
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub order_type: OrderType,
}

impl OrderRequest {
    pub fn new(symbol: &str, side: Side, admitted: Admitted, order_type: OrderType) -> Self {
        Self {
            symbol: symbol.to_uppercase(),
            side,
            quantity: admitted.quantity,
            // Market orders carry no price even if one was admitted
            price: match order_type {
                OrderType::Market => None,
                _ => admitted.price,
            },
            order_type,
        }
    }
}

/// Exchange confirmation of an accepted order
#[derive(Debug, Clone, PartialEq)]
pub struct OrderAck {
    pub exchange_order_id: u64,
    pub symbol: String,
    pub side: Side,
    pub status: OrderStatus,
    pub price: Decimal,
    pub quantity: Decimal,
    pub executed_quantity: Decimal,
    pub cumulative_quote_quantity: Decimal,
}

/// Order submission. Exchange-side refusals come back as
/// [`crate::error::EngineError::ExchangeRejection`].
#[async_trait]
pub trait OrderSink: Send + Sync {
    async fn submit(&self, order: &OrderRequest) -> EngineResult<OrderAck>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_market_request_drops_price() {
        let admitted = Admitted {
            quantity: dec!(0.5),
            price: Some(dec!(10)),
        };
        let req = OrderRequest::new("ethusdc", Side::Sell, admitted, OrderType::Market);
        assert_eq!(req.symbol, "ETHUSDC");
        assert_eq!(req.price, None);

        let req = OrderRequest::new("ethusdc", Side::Sell, admitted, OrderType::LimitMaker);
        assert_eq!(req.price, Some(dec!(10)));
    }
}
