use crate::error::{EngineError, EngineResult};
use crate::risk::sizing::floor_to_step;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Exchange lot/tick/notional constraints for one symbol
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradingRules {
    pub quantity_step: Decimal,
    pub min_quantity: Decimal,
    pub max_quantity: Decimal,
    pub price_step: Decimal,
    pub min_notional: Decimal,
}

impl Default for TradingRules {
    /// Conservative fallback used when a symbol has no cached rules
    fn default() -> Self {
        Self {
            quantity_step: dec!(0.000001),
            min_quantity: Decimal::ZERO,
            max_quantity: dec!(1000000000000),
            price_step: dec!(0.01),
            min_notional: Decimal::ZERO,
        }
    }
}

/// How an admitted order should rest on the book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    Gtc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    /// Post-only limit; rejected by the exchange instead of taking liquidity
    LimitMaker,
    Limit { time_in_force: TimeInForce },
    Market,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::LimitMaker => "LIMIT_MAKER",
            OrderType::Limit { .. } => "LIMIT",
            OrderType::Market => "MARKET",
        }
    }
}

/// Quantity and price after snapping and validation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Admitted {
    pub quantity: Decimal,
    pub price: Option<Decimal>,
}

/// Post-only limit with a price and maker preference, GTC limit with a price,
/// otherwise market. A non-positive price counts as absent.
pub fn select_order_type(prefer_maker: bool, price: Option<Decimal>) -> OrderType {
    match price.filter(|p| *p > Decimal::ZERO) {
        Some(_) if prefer_maker => OrderType::LimitMaker,
        Some(_) => OrderType::Limit {
            time_in_force: TimeInForce::Gtc,
        },
        None => OrderType::Market,
    }
}

/// Cached trading rules plus the pure admission checks built on them.
///
/// The cache is swapped wholesale on refresh; readers always see either the
/// old or the new snapshot, never a mix. No method here touches the network.
#[derive(Default)]
pub struct RulesBook {
    rules: RwLock<Arc<HashMap<String, TradingRules>>>,
}

impl RulesBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rules(rules: HashMap<String, TradingRules>) -> Self {
        let book = Self::new();
        book.replace_all(rules);
        book
    }

    /// Install a fresh snapshot from exchange metadata
    pub fn replace_all(&self, rules: HashMap<String, TradingRules>) {
        let normalized: HashMap<String, TradingRules> = rules
            .into_iter()
            .map(|(sym, r)| (sym.to_uppercase(), r))
            .collect();
        *self.rules.write().unwrap_or_else(|p| p.into_inner()) = Arc::new(normalized);
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Rules for a symbol, falling back to conservative defaults
    pub fn rules_for(&self, symbol: &str) -> TradingRules {
        self.snapshot()
            .get(&symbol.to_uppercase())
            .copied()
            .unwrap_or_default()
    }

    /// Floor to the symbol's lot step; negative input clamps to zero
    pub fn snap_quantity(&self, symbol: &str, qty: Decimal) -> EngineResult<Decimal> {
        snap(symbol, "qty", qty, self.rules_for(symbol).quantity_step)
    }

    /// Floor to the symbol's tick size
    pub fn snap_price(&self, symbol: &str, price: Decimal) -> EngineResult<Decimal> {
        snap(symbol, "price", price, self.rules_for(symbol).price_step)
    }

    /// Snap quantity and price, then check LOT_SIZE bounds and minimum notional.
    ///
    /// Must run before any submission. Without a price (market orders) the
    /// notional check cannot be made and is skipped.
    pub fn enforce(&self, symbol: &str, qty: Decimal, price: Option<Decimal>) -> EngineResult<Admitted> {
        let rules = self.rules_for(symbol);

        let quantity = snap(symbol, "qty", qty, rules.quantity_step)?;
        let price = price
            .map(|p| snap(symbol, "price", p, rules.price_step))
            .transpose()?;

        if quantity < rules.min_quantity {
            return Err(EngineError::filter(
                symbol,
                format!("qty {} < minQty {} (LOT_SIZE)", quantity, rules.min_quantity),
            ));
        }
        if quantity > rules.max_quantity {
            return Err(EngineError::filter(
                symbol,
                format!("qty {} > maxQty {} (LOT_SIZE)", quantity, rules.max_quantity),
            ));
        }

        if let Some(px) = price {
            let notional = quantity
                .checked_mul(px)
                .ok_or_else(|| EngineError::filter(symbol, format!("notional of {} x {} out of range", quantity, px)))?;
            if notional < rules.min_notional {
                return Err(EngineError::filter(
                    symbol,
                    format!("notional {} < minNotional {}", notional, rules.min_notional),
                ));
            }
        }

        debug!(symbol = %symbol, qty = %quantity, price = ?price, "order admitted");
        Ok(Admitted { quantity, price })
    }

    fn snapshot(&self) -> Arc<HashMap<String, TradingRules>> {
        Arc::clone(&self.rules.read().unwrap_or_else(|p| p.into_inner()))
    }
}

fn snap(symbol: &str, what: &str, value: Decimal, step: Decimal) -> EngineResult<Decimal> {
    floor_to_step(value, step)
        .ok_or_else(|| EngineError::filter(symbol, format!("{} {} out of range for step {}", what, value, step)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn btc_rules() -> TradingRules {
        TradingRules {
            quantity_step: dec!(0.001),
            min_quantity: dec!(0.001),
            max_quantity: dec!(100),
            price_step: dec!(0.01),
            min_notional: dec!(10),
        }
    }

    fn book() -> RulesBook {
        RulesBook::from_rules(HashMap::from([("btcusdc".to_string(), btc_rules())]))
    }

    #[test]
    fn test_unknown_symbol_uses_defaults() {
        let book = book();
        assert_eq!(book.rules_for("DOGEUSDC"), TradingRules::default());
        assert_eq!(book.rules_for("BTCUSDC"), btc_rules());
        assert_eq!(book.snap_quantity("DOGEUSDC", dec!(1.23456789)).unwrap(), dec!(1.234567));
    }

    #[test]
    fn test_snap_is_exact_at_step_boundaries() {
        let book = RulesBook::from_rules(HashMap::from([(
            "XLMUSDC".to_string(),
            TradingRules {
                quantity_step: dec!(0.1),
                price_step: dec!(0.0001),
                ..TradingRules::default()
            },
        )]));

        // 0.3 / 0.1 is exactly 3 in decimal; a binary float would floor to 2
        assert_eq!(book.snap_quantity("XLMUSDC", dec!(0.3)).unwrap(), dec!(0.3));
        assert_eq!(book.snap_quantity("XLMUSDC", dec!(0.29999)).unwrap(), dec!(0.2));
        assert_eq!(book.snap_price("XLMUSDC", dec!(0.123456)).unwrap(), dec!(0.1234));
        assert_eq!(book.snap_quantity("XLMUSDC", dec!(-1)).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_rejects_quantity_that_snaps_below_minimum() {
        let err = book().enforce("BTCUSDC", dec!(0.0009), Some(dec!(100))).unwrap_err();
        match err {
            EngineError::FilterViolation { symbol, reason } => {
                assert_eq!(symbol, "BTCUSDC");
                assert!(reason.contains("minQty"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_rejects_above_max_quantity() {
        let err = book().enforce("BTCUSDC", dec!(101), None).unwrap_err();
        assert!(err.to_string().contains("maxQty"));
    }

    #[test]
    fn test_min_notional_boundary_is_accepted() {
        let book = book();
        let ok = book.enforce("BTCUSDC", dec!(0.1), Some(dec!(100))).unwrap();
        assert_eq!(ok.quantity, dec!(0.1));
        assert_eq!(ok.price, Some(dec!(100)));

        let err = book.enforce("BTCUSDC", dec!(0.099), Some(dec!(100))).unwrap_err();
        assert!(err.to_string().contains("minNotional"));
    }

    #[test]
    fn test_price_is_snapped_before_notional_check() {
        // Both legs are floored first; the snapped notional lands exactly on the minimum
        let ok = book().enforce("BTCUSDC", dec!(0.1009), Some(dec!(100.009))).unwrap();
        assert_eq!(ok.quantity, dec!(0.1));
        assert_eq!(ok.price, Some(dec!(100)));
    }

    #[test]
    fn test_market_order_skips_notional_check() {
        // Known gap: without a price the minNotional rule cannot be evaluated
        let ok = book().enforce("BTCUSDC", dec!(0.001), None).unwrap();
        assert_eq!(ok.quantity, dec!(0.001));
        assert_eq!(ok.price, None);
    }

    #[test]
    fn test_out_of_range_inputs_are_filter_violations() {
        let book = RulesBook::new();

        // Quantity too large to divide by the default lot step
        let err = book
            .enforce("BTCUSDC", dec!(100000000000000000000000), None)
            .unwrap_err();
        assert!(err.is_client_side());
        assert!(err.to_string().contains("out of range"));

        // Price too large for the tick step
        let err = book
            .enforce("BTCUSDC", dec!(1), Some(dec!(1000000000000000000000000000)))
            .unwrap_err();
        assert!(err.is_client_side());

        // Snapped legs fit, but their product does not
        let err = book
            .enforce("BTCUSDC", dec!(100000), Some(dec!(10000000000000000000000000)))
            .unwrap_err();
        assert!(err.to_string().contains("notional"));
    }

    #[test]
    fn test_select_order_type() {
        assert_eq!(select_order_type(true, Some(dec!(1))), OrderType::LimitMaker);
        assert_eq!(
            select_order_type(false, Some(dec!(1))),
            OrderType::Limit { time_in_force: TimeInForce::Gtc }
        );
        assert_eq!(select_order_type(true, None), OrderType::Market);
        assert_eq!(select_order_type(true, Some(Decimal::ZERO)), OrderType::Market);
    }

    fn decimal() -> impl Strategy<Value = Decimal> {
        (0i64..1_000_000_000_000, 0u32..12).prop_map(|(m, s)| Decimal::new(m, s))
    }

    fn step() -> impl Strategy<Value = Decimal> {
        prop_oneof![
            Just(dec!(1)),
            Just(dec!(0.1)),
            Just(dec!(0.01)),
            Just(dec!(0.001)),
            Just(dec!(0.00001)),
            Just(dec!(0.05)),
            Just(dec!(0.25)),
        ]
    }

    proptest! {
        #[test]
        fn prop_snap_quantity_is_idempotent(q in decimal(), step in step()) {
            let book = RulesBook::from_rules(HashMap::from([(
                "ANY".to_string(),
                TradingRules { quantity_step: step, ..TradingRules::default() },
            )]));
            let once = book.snap_quantity("ANY", q).unwrap();
            prop_assert_eq!(book.snap_quantity("ANY", once).unwrap(), once);
            prop_assert!(once <= q);
            prop_assert!(q - once < step);
        }

        #[test]
        fn prop_notional_below_minimum_is_rejected(
            lots in 1i64..100_000,
            ticks in 1i64..10_000_000,
        ) {
            let book = book();
            let qty = Decimal::new(lots, 3);
            let price = Decimal::new(ticks, 2);
            let result = book.enforce("BTCUSDC", qty, Some(price));
            if qty * price < dec!(10) || qty > dec!(100) {
                prop_assert!(result.is_err());
            } else {
                prop_assert!(result.is_ok());
            }
        }
    }
}
