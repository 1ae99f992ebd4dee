use crate::data::{BalanceCache, InstrumentLedger, SignalSide};
use crate::risk::{PositionSizer, RiskBudget};
use crate::strategy::signals::{SignalDecision, SignalEngine};
use crate::utils::config::StrategyConfig;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One labelled figure behind a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reason {
    pub label: String,
    pub value: Decimal,
}

impl Reason {
    fn new(label: &str, value: Decimal) -> Self {
        Self {
            label: label.to_string(),
            value,
        }
    }
}

/// Decision plus sizing for one symbol, as presented to operators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalReport {
    pub symbol: String,
    pub side: SignalSide,
    pub confidence: f64,
    pub explanation: String,
    pub reasons: Vec<Reason>,
    pub price: Decimal,
    pub stop_price: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub target_exposure_usd: Decimal,
    pub suggested_qty_base: Decimal,
}

/// Evaluates a symbol and sizes the result against held balances
#[derive(Debug, Clone, Default)]
pub struct SignalReporter {
    engine: SignalEngine,
    sizer: PositionSizer,
}

impl SignalReporter {
    pub fn new(engine: SignalEngine) -> Self {
        Self {
            engine,
            sizer: PositionSizer::new(),
        }
    }

    pub fn engine(&self) -> &SignalEngine {
        &self.engine
    }

    /// Advances the symbol's hysteresis state. `None` for unregistered symbols.
    pub fn compute_signal(
        &self,
        ledger: &InstrumentLedger,
        balances: &BalanceCache,
        symbol: &str,
        cfg: &StrategyConfig,
        budget: &RiskBudget,
        now_epoch_secs: i64,
    ) -> Option<SignalReport> {
        let symbol = symbol.trim().to_uppercase();
        let decision = self.engine.evaluate_symbol(ledger, &symbol, cfg, now_epoch_secs)?;

        // Latest close first, streamed price while still warming up
        let price = Some(decision.price())
            .filter(|p| *p > Decimal::ZERO)
            .or_else(|| ledger.last_price(&symbol))
            .unwrap_or(Decimal::ZERO);

        let (base_held, quote_held) = balances.for_symbol(&symbol);
        let plan = self.sizer.size(&decision, price, base_held, quote_held, budget, cfg);

        Some(SignalReport {
            reasons: reasons(&decision, price, base_held, quote_held, budget),
            symbol,
            side: decision.side,
            confidence: decision.confidence,
            explanation: decision.explanation,
            price,
            stop_price: plan.stop_price,
            take_profit: plan.take_profit,
            target_exposure_usd: plan.target_exposure_usd,
            suggested_qty_base: plan.suggested_qty,
        })
    }
}

fn reasons(
    decision: &SignalDecision,
    price: Decimal,
    base_held: Decimal,
    quote_held: Decimal,
    budget: &RiskBudget,
) -> Vec<Reason> {
    let d = &decision.diagnostics;
    let or_zero = |v: Option<Decimal>| v.unwrap_or(Decimal::ZERO).round_dp(6);
    vec![
        Reason::new("Price", price.round_dp(6)),
        Reason::new("Base held", base_held.round_dp(6)),
        Reason::new("Quote held", quote_held.round_dp(2)),
        Reason::new("Risk level", budget.risk_level),
        Reason::new("Max exposure", budget.max_exposure_usd),
        Reason::new("EMA_FAST", or_zero(d.fast_ema)),
        Reason::new("EMA_SLOW", or_zero(d.slow_ema)),
        Reason::new("ATR_PCT", or_zero(d.atr_percent)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Candle;
    use crate::utils::config::IndicatorConfig;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn rising_ledger() -> InstrumentLedger {
        let ledger = InstrumentLedger::with_symbols(&["BTCUSDC"], 300);
        let candles = (0..=50)
            .map(|i| {
                let c = dec!(100) + Decimal::from(i);
                Candle::new(c, c + dec!(1), c - dec!(1), c)
            })
            .collect();
        ledger.upsert_candles("BTCUSDC", candles);
        ledger
    }

    fn balances() -> BalanceCache {
        let cache = BalanceCache::new();
        cache.replace(HashMap::from([("USDC".to_string(), dec!(1000))]));
        cache
    }

    #[test]
    fn test_report_on_commit_carries_sizing() {
        let reporter = SignalReporter::new(SignalEngine::new(&IndicatorConfig::default()));
        let ledger = rising_ledger();
        let cfg = StrategyConfig::default();
        let budget = RiskBudget::new(dec!(0.35), dec!(2000));

        let first = reporter
            .compute_signal(&ledger, &balances(), "btcusdc", &cfg, &budget, 1_000_000)
            .unwrap();
        assert_eq!(first.side, SignalSide::Flat);
        assert_eq!(first.suggested_qty_base, Decimal::ZERO);

        let second = reporter
            .compute_signal(&ledger, &balances(), "BTCUSDC", &cfg, &budget, 1_000_001)
            .unwrap();
        assert_eq!(second.symbol, "BTCUSDC");
        assert_eq!(second.side, SignalSide::Long);
        assert_eq!(second.price, dec!(150));
        assert_eq!(second.target_exposure_usd, dec!(350));
        assert_eq!(second.suggested_qty_base, dec!(2.333333));
        assert!(second.stop_price.unwrap() < dec!(150));
        assert!(second.take_profit.unwrap() > dec!(150));
    }

    #[test]
    fn test_reasons_are_labelled_in_order() {
        let reporter = SignalReporter::default();
        let ledger = rising_ledger();
        let budget = RiskBudget::new(dec!(0.35), dec!(2000));

        let report = reporter
            .compute_signal(&ledger, &balances(), "BTCUSDC", &StrategyConfig::default(), &budget, 0)
            .unwrap();
        let labels: Vec<&str> = report.reasons.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(
            labels,
            ["Price", "Base held", "Quote held", "Risk level", "Max exposure", "EMA_FAST", "EMA_SLOW", "ATR_PCT"]
        );
        assert_eq!(report.reasons[2].value, dec!(1000));
    }

    #[test]
    fn test_warming_up_falls_back_to_streamed_price() {
        let reporter = SignalReporter::default();
        let ledger = InstrumentLedger::with_symbols(&["ETHUSDC"], 300);
        ledger.record_price("ETHUSDC", dec!(2500), 1);

        let report = reporter
            .compute_signal(
                &ledger,
                &BalanceCache::new(),
                "ETHUSDC",
                &StrategyConfig::default(),
                &RiskBudget::new(dec!(0.35), dec!(2000)),
                0,
            )
            .unwrap();
        assert_eq!(report.price, dec!(2500));
        assert_eq!(report.confidence, 0.2);
    }

    #[test]
    fn test_unknown_symbol_has_no_report() {
        let reporter = SignalReporter::default();
        let ledger = InstrumentLedger::new(300);
        let report = reporter.compute_signal(
            &ledger,
            &BalanceCache::new(),
            "NOPE",
            &StrategyConfig::default(),
            &RiskBudget::new(dec!(0.35), dec!(2000)),
            0,
        );
        assert!(report.is_none());
    }
}
