use crate::data::{Candle, TradePrint};
use crate::risk::TradingRules;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;

/// One kline row: [openTime, open, high, low, close, volume, closeTime, ...]
#[derive(Debug, Clone, PartialEq)]
pub struct Kline {
    pub open_time: i64,
    pub close_time: i64,
    pub candle: Candle,
}

impl Kline {
    /// Parse a raw REST row. Malformed rows yield `None`.
    pub fn from_row(row: &[serde_json::Value]) -> Option<Self> {
        let dec = |i: usize| -> Option<Decimal> { Decimal::from_str(row.get(i)?.as_str()?).ok() };
        Some(Self {
            open_time: row.first()?.as_i64()?,
            close_time: row.get(6)?.as_i64()?,
            candle: Candle::new(dec(1)?, dec(2)?, dec(3)?, dec(4)?),
        })
    }

    pub fn is_closed(&self, now_ms: i64) -> bool {
        self.close_time < now_ms
    }
}

/// Subset of `GET /api/v3/exchangeInfo`
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeInfo {
    pub symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SymbolInfo {
    pub symbol: String,
    #[serde(default)]
    pub filters: Vec<SymbolFilter>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "filterType")]
pub enum SymbolFilter {
    #[serde(rename = "LOT_SIZE")]
    LotSize {
        #[serde(rename = "stepSize")]
        step_size: Decimal,
        #[serde(rename = "minQty")]
        min_qty: Decimal,
        #[serde(rename = "maxQty")]
        max_qty: Decimal,
    },
    #[serde(rename = "PRICE_FILTER")]
    PriceFilter {
        #[serde(rename = "tickSize")]
        tick_size: Decimal,
    },
    #[serde(rename = "MIN_NOTIONAL")]
    MinNotional {
        #[serde(rename = "minNotional")]
        min_notional: Decimal,
    },
    #[serde(rename = "NOTIONAL")]
    Notional {
        #[serde(rename = "minNotional")]
        min_notional: Decimal,
    },
    #[serde(other)]
    Other,
}

impl SymbolInfo {
    /// Fold the filter list into trading rules; missing filters keep defaults
    pub fn trading_rules(&self) -> TradingRules {
        let mut rules = TradingRules::default();
        for filter in &self.filters {
            match filter {
                SymbolFilter::LotSize { step_size, min_qty, max_qty } => {
                    rules.quantity_step = *step_size;
                    rules.min_quantity = *min_qty;
                    rules.max_quantity = *max_qty;
                }
                SymbolFilter::PriceFilter { tick_size } => rules.price_step = *tick_size,
                SymbolFilter::MinNotional { min_notional } | SymbolFilter::Notional { min_notional } => {
                    rules.min_notional = *min_notional
                }
                SymbolFilter::Other => {}
            }
        }
        rules
    }
}

/// Subset of `GET /api/v3/account`
#[derive(Debug, Clone, Deserialize)]
pub struct AccountInfo {
    pub balances: Vec<AssetBalance>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetBalance {
    pub asset: String,
    pub free: Decimal,
    pub locked: Decimal,
}

/// Fields read from an order response (`newOrderRespType=RESULT`)
#[derive(Debug, Clone, Deserialize)]
pub struct OrderResponse {
    #[serde(rename = "orderId")]
    pub order_id: u64,

    pub symbol: String,

    #[serde(default)]
    pub price: Decimal,

    #[serde(rename = "origQty", default)]
    pub orig_qty: Decimal,

    #[serde(rename = "executedQty", default)]
    pub executed_qty: Decimal,

    #[serde(rename = "cummulativeQuoteQty", default)]
    pub cumulative_quote_qty: Decimal,

    pub status: String,  // "NEW", "FILLED", etc.

    pub side: String,  // "BUY" or "SELL"
}

/// Error body returned by the API, e.g. {"code":-1013,"msg":"Filter failure: NOTIONAL"}
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    pub code: i64,
    pub msg: String,
}

/// Raw trade stream event
#[derive(Debug, Clone, Deserialize)]
pub struct TradeEvent {
    #[serde(rename = "s")]
    pub symbol: String,

    #[serde(rename = "p")]
    pub price: Decimal,

    #[serde(rename = "T")]
    pub trade_time: i64,
}

impl TradeEvent {
    pub fn to_print(&self) -> TradePrint {
        TradePrint {
            symbol: self.symbol.clone(),
            price: self.price,
            timestamp_ms: self.trade_time,
        }
    }
}

/// Combined-stream envelope: {"stream": "...", "data": {...}}
#[derive(Debug, Clone, Deserialize)]
pub struct StreamWrapper {
    pub stream: String,
    pub data: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_kline_row() {
        let row: Vec<serde_json::Value> = serde_json::from_str(
            r#"[1499040000000, "0.01634790", "0.80000000", "0.01575800", "0.01577100",
                "148976.11427815", 1499644799999, "2434.19055334", 308, "1756.87402397",
                "28.46694368", "0"]"#,
        )
        .unwrap();

        let k = Kline::from_row(&row).unwrap();
        assert_eq!(k.open_time, 1499040000000);
        assert_eq!(k.candle.high, dec!(0.8));
        assert_eq!(k.candle.close, dec!(0.015771));
        assert!(k.is_closed(1499644800000));
        assert!(!k.is_closed(1499644799999));
    }

    #[test]
    fn test_malformed_kline_row() {
        let row: Vec<serde_json::Value> = serde_json::from_str(r#"[1, "x", "1", "1", "1"]"#).unwrap();
        assert!(Kline::from_row(&row).is_none());
    }

    #[test]
    fn test_symbol_filters_to_rules() {
        let json = r#"{
            "symbol": "BTCUSDC",
            "filters": [
                {"filterType": "PRICE_FILTER", "minPrice": "0.01", "maxPrice": "1000000.00", "tickSize": "0.01000000"},
                {"filterType": "LOT_SIZE", "minQty": "0.00001000", "maxQty": "9000.00000000", "stepSize": "0.00001000"},
                {"filterType": "ICEBERG_PARTS", "limit": 10},
                {"filterType": "NOTIONAL", "minNotional": "5.00000000", "applyMinToMarket": true}
            ]
        }"#;

        let info: SymbolInfo = serde_json::from_str(json).unwrap();
        let rules = info.trading_rules();
        assert_eq!(rules.quantity_step, dec!(0.00001));
        assert_eq!(rules.min_quantity, dec!(0.00001));
        assert_eq!(rules.max_quantity, dec!(9000));
        assert_eq!(rules.price_step, dec!(0.01));
        assert_eq!(rules.min_notional, dec!(5));
    }

    #[test]
    fn test_missing_filters_keep_defaults() {
        let info: SymbolInfo = serde_json::from_str(r#"{"symbol": "XLMUSDC"}"#).unwrap();
        assert_eq!(info.trading_rules(), TradingRules::default());
    }

    #[test]
    fn test_parse_order_response() {
        let json = r#"{
            "symbol": "BTCUSDC", "orderId": 28, "orderListId": -1,
            "clientOrderId": "6gCrw2kRUAF9CvJDGP16IP", "transactTime": 1507725176595,
            "price": "50000.00000000", "origQty": "0.00700000", "executedQty": "0.00000000",
            "cummulativeQuoteQty": "0.00000000", "status": "NEW", "timeInForce": "GTC",
            "type": "LIMIT_MAKER", "side": "BUY"
        }"#;
        let resp: OrderResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.order_id, 28);
        assert_eq!(resp.orig_qty, dec!(0.007));
        assert_eq!(resp.status, "NEW");
    }

    #[test]
    fn test_parse_trade_event() {
        let json = r#"{
            "stream": "btcusdc@trade",
            "data": {"e": "trade", "E": 1672515782136, "s": "BTCUSDC", "t": 12345,
                     "p": "50010.12", "q": "0.01", "T": 1672515782136, "m": true, "M": true}
        }"#;
        let wrapper: StreamWrapper = serde_json::from_str(json).unwrap();
        let event: TradeEvent = serde_json::from_value(wrapper.data).unwrap();
        let print = event.to_print();
        assert_eq!(print.symbol, "BTCUSDC");
        assert_eq!(print.price, dec!(50010.12));
        assert_eq!(print.timestamp_ms, 1672515782136);
    }
}
