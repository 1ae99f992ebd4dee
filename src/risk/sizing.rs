use crate::data::SignalSide;
use crate::strategy::signals::SignalDecision;
use crate::utils::config::StrategyConfig;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Coarse quantisation applied before the exchange's own lot step
pub const DEFAULT_QTY_STEP: Decimal = dec!(0.000001);

/// Lowest stop a LONG may be given
const STOP_FLOOR: Decimal = dec!(0.01);

/// Risk budget applied to a decision
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskBudget {
    /// Fraction of spendable quote to deploy, in [0, 1]
    pub risk_level: Decimal,
    pub max_exposure_usd: Decimal,
}

impl RiskBudget {
    pub fn new(risk_level: Decimal, max_exposure_usd: Decimal) -> Self {
        Self {
            risk_level: risk_level.clamp(Decimal::ZERO, Decimal::ONE),
            max_exposure_usd: max_exposure_usd.max(Decimal::ZERO),
        }
    }
}

/// Proposed trade for one decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizingPlan {
    pub side: SignalSide,
    pub price: Decimal,
    pub base_held: Decimal,
    pub quote_held: Decimal,
    /// Base quantity to trade, floor-quantised to [`DEFAULT_QTY_STEP`]
    pub suggested_qty: Decimal,
    pub stop_price: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    /// Independent exposure figure used by the fallback sizing path
    pub target_exposure_usd: Decimal,
}

/// Sizes toward a target exposure rather than by fixed increments, so
/// repeated BUY decisions near the target produce near-zero deltas.
#[derive(Debug, Clone)]
pub struct PositionSizer {
    step: Decimal,
}

impl PositionSizer {
    pub fn new() -> Self {
        Self {
            step: DEFAULT_QTY_STEP,
        }
    }

    pub fn size(
        &self,
        decision: &SignalDecision,
        price: Decimal,
        base_held: Decimal,
        quote_held: Decimal,
        budget: &RiskBudget,
        cfg: &StrategyConfig,
    ) -> SizingPlan {
        let base_held = base_held.max(Decimal::ZERO);
        let quote_held = quote_held.max(Decimal::ZERO);
        let exposure = quote_held.min(budget.max_exposure_usd) * budget.risk_level;

        let delta = match decision.side {
            SignalSide::Long if price > Decimal::ZERO => match exposure.checked_div(price) {
                Some(target_base) => (target_base - base_held).max(Decimal::ZERO),
                None => Decimal::ZERO,
            },
            SignalSide::Long => Decimal::ZERO,
            // Spot only: SHORT means sell down to a flat base position
            SignalSide::Short => base_held,
            SignalSide::Flat => Decimal::ZERO,
        };

        let (stop_price, take_profit) = protective_levels(decision.side, price, decision.atr_absolute(), cfg)
            .map_or((None, None), |(s, t)| (Some(s), Some(t)));

        SizingPlan {
            side: decision.side,
            price,
            base_held,
            quote_held,
            // A delta too large to quantise is not a tradeable size
            suggested_qty: floor_to_step(delta, self.step).unwrap_or(Decimal::ZERO),
            stop_price,
            take_profit,
            target_exposure_usd: if decision.side == SignalSide::Long {
                exposure
            } else {
                Decimal::ZERO
            },
        }
    }
}

impl Default for PositionSizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Stop and take-profit at a fixed reward:risk ratio.
///
/// Only defined for a directional side with a positive price and ATR.
pub fn protective_levels(
    side: SignalSide,
    price: Decimal,
    atr_absolute: Decimal,
    cfg: &StrategyConfig,
) -> Option<(Decimal, Decimal)> {
    if price <= Decimal::ZERO || atr_absolute <= Decimal::ZERO {
        return None;
    }
    let risk = cfg.stop_atr_multiple * atr_absolute;
    match side {
        SignalSide::Long => {
            let stop = (price - risk).max(STOP_FLOOR);
            Some((stop, price + cfg.take_profit_risk_multiple * (price - stop)))
        }
        SignalSide::Short => {
            let stop = price + risk;
            Some((stop, price - cfg.take_profit_risk_multiple * (stop - price)))
        }
        SignalSide::Flat => None,
    }
}

/// Floor `value` to a multiple of `step`; negative input clamps to zero.
///
/// `None` when `value / step` does not fit in a `Decimal`.
pub fn floor_to_step(value: Decimal, step: Decimal) -> Option<Decimal> {
    let value = value.max(Decimal::ZERO);
    if step <= Decimal::ZERO {
        return Some(value);
    }
    let lots = value.checked_div(step)?.floor();
    lots.checked_mul(step).map(|v| v.normalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::signals::SignalDiagnostics;

    fn decision(side: SignalSide, price: Decimal, atr: Decimal) -> SignalDecision {
        SignalDecision {
            side,
            confidence: 0.7,
            explanation: String::new(),
            diagnostics: SignalDiagnostics {
                price: Some(price),
                atr_absolute: Some(atr),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_long_sizes_toward_target_exposure() {
        let sizer = PositionSizer::new();
        let budget = RiskBudget::new(dec!(0.35), dec!(2000));
        let d = decision(SignalSide::Long, dec!(50000), dec!(100));

        let plan = sizer.size(&d, dec!(50000), Decimal::ZERO, dec!(1000), &budget, &StrategyConfig::default());

        assert_eq!(plan.target_exposure_usd, dec!(350));
        assert_eq!(plan.suggested_qty, dec!(0.007));
    }

    #[test]
    fn test_long_near_target_is_self_damping() {
        let sizer = PositionSizer::new();
        let budget = RiskBudget::new(dec!(0.35), dec!(2000));
        let d = decision(SignalSide::Long, dec!(50000), dec!(100));

        let plan = sizer.size(&d, dec!(50000), dec!(0.0069995), dec!(1000), &budget, &StrategyConfig::default());
        assert_eq!(plan.suggested_qty, Decimal::ZERO);

        let plan = sizer.size(&d, dec!(50000), dec!(0.01), dec!(1000), &budget, &StrategyConfig::default());
        assert_eq!(plan.suggested_qty, Decimal::ZERO);
    }

    #[test]
    fn test_exposure_capped_by_max() {
        let sizer = PositionSizer::new();
        let budget = RiskBudget::new(dec!(0.5), dec!(2000));
        let d = decision(SignalSide::Long, dec!(100), dec!(2));

        let plan = sizer.size(&d, dec!(100), Decimal::ZERO, dec!(10000), &budget, &StrategyConfig::default());
        assert_eq!(plan.target_exposure_usd, dec!(1000));
        assert_eq!(plan.suggested_qty, dec!(10));
    }

    #[test]
    fn test_short_liquidates_base() {
        let sizer = PositionSizer::new();
        let budget = RiskBudget::new(dec!(0.35), dec!(2000));
        let d = decision(SignalSide::Short, dec!(100), dec!(2));

        let plan = sizer.size(&d, dec!(100), dec!(1.23456789), dec!(500), &budget, &StrategyConfig::default());
        assert_eq!(plan.suggested_qty, dec!(1.234567));
        assert_eq!(plan.target_exposure_usd, Decimal::ZERO);
    }

    #[test]
    fn test_flat_sizes_nothing() {
        let sizer = PositionSizer::new();
        let budget = RiskBudget::new(dec!(0.35), dec!(2000));
        let d = decision(SignalSide::Flat, dec!(100), dec!(2));

        let plan = sizer.size(&d, dec!(100), dec!(3), dec!(500), &budget, &StrategyConfig::default());
        assert_eq!(plan.suggested_qty, Decimal::ZERO);
        assert_eq!(plan.stop_price, None);
        assert_eq!(plan.take_profit, None);
    }

    #[test]
    fn test_long_stop_and_take_profit() {
        let cfg = StrategyConfig {
            stop_atr_multiple: dec!(1.5),
            take_profit_risk_multiple: dec!(2.0),
            ..StrategyConfig::default()
        };
        assert_eq!(
            protective_levels(SignalSide::Long, dec!(100), dec!(2), &cfg),
            Some((dec!(97), dec!(106)))
        );
        assert_eq!(
            protective_levels(SignalSide::Short, dec!(100), dec!(2), &cfg),
            Some((dec!(103), dec!(94)))
        );
    }

    #[test]
    fn test_long_stop_is_floored() {
        let cfg = StrategyConfig::default();
        let (stop, tp) = protective_levels(SignalSide::Long, dec!(1), dec!(10), &cfg).unwrap();
        assert_eq!(stop, dec!(0.01));
        assert_eq!(tp, dec!(1) + dec!(2) * dec!(0.99));
    }

    #[test]
    fn test_no_levels_without_atr() {
        let cfg = StrategyConfig::default();
        assert_eq!(protective_levels(SignalSide::Long, dec!(100), Decimal::ZERO, &cfg), None);
        assert_eq!(protective_levels(SignalSide::Flat, dec!(100), dec!(2), &cfg), None);
    }

    #[test]
    fn test_floor_to_step() {
        assert_eq!(floor_to_step(dec!(0.0079999), dec!(0.000001)), Some(dec!(0.007999)));
        assert_eq!(floor_to_step(dec!(-5), dec!(0.1)), Some(Decimal::ZERO));
        assert_eq!(floor_to_step(dec!(3.3), Decimal::ZERO), Some(dec!(3.3)));
    }

    #[test]
    fn test_floor_to_step_out_of_range() {
        // 1e23 / 1e-6 exceeds Decimal::MAX
        assert_eq!(floor_to_step(dec!(100000000000000000000000), dec!(0.000001)), None);
        assert_eq!(floor_to_step(Decimal::MAX, dec!(1)), Some(Decimal::MAX));
    }

    #[test]
    fn test_huge_short_balance_sizes_nothing() {
        let sizer = PositionSizer::new();
        let budget = RiskBudget::new(dec!(0.35), dec!(2000));
        let d = decision(SignalSide::Short, dec!(100), dec!(2));

        let plan = sizer.size(
            &d,
            dec!(100),
            dec!(100000000000000000000000),
            dec!(500),
            &budget,
            &StrategyConfig::default(),
        );
        assert_eq!(plan.suggested_qty, Decimal::ZERO);
    }
}
