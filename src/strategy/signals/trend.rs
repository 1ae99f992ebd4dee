use crate::data::{CandleBuffer, HysteresisState, InstrumentLedger, SignalSide};
use crate::error::EngineError;
use crate::strategy::signals::indicators::{atr, ema};
use crate::utils::config::{IndicatorConfig, StrategyConfig};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

// Confidence buckets. Callers must not assume anything finer.
const WARMUP_CONFIDENCE: f64 = 0.2;
const NO_EDGE_CONFIDENCE: f64 = 0.3;
const PENDING_CONFIDENCE: f64 = 0.4;
const HOLDING_CONFIDENCE: f64 = 0.6;
const COMMIT_CONFIDENCE: f64 = 0.7;

/// Indicator readings and state-machine details behind a decision
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalDiagnostics {
    pub bars: usize,
    pub fast_ema: Option<Decimal>,
    pub slow_ema: Option<Decimal>,
    pub atr_percent: Option<Decimal>,
    pub atr_absolute: Option<Decimal>,
    pub price: Option<Decimal>,
    pub streak: Option<u32>,
    pub target_side: Option<SignalSide>,
    pub cooldown_remaining_secs: Option<i64>,
}

/// Transient result of one evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalDecision {
    pub side: SignalSide,
    pub confidence: f64,
    pub explanation: String,
    pub diagnostics: SignalDiagnostics,
}

impl SignalDecision {
    fn new(side: SignalSide, confidence: f64, explanation: String, diagnostics: SignalDiagnostics) -> Self {
        Self {
            side,
            confidence,
            explanation,
            diagnostics,
        }
    }

    /// ATR in price units, zero when unavailable
    pub fn atr_absolute(&self) -> Decimal {
        self.diagnostics.atr_absolute.unwrap_or(Decimal::ZERO)
    }

    /// Reference price (latest close), zero when unavailable
    pub fn price(&self) -> Decimal {
        self.diagnostics.price.unwrap_or(Decimal::ZERO)
    }
}

struct Readings {
    fast: Decimal,
    slow: Decimal,
    atr_abs: Decimal,
    atr_pct: Decimal,
    price: Decimal,
}

/// Trend signal engine: EMA crossover filtered by an ATR gate, with a
/// confirmation streak and flip cooldown for hysteresis.
///
/// The engine itself is stateless; all per-symbol state lives in the
/// [`HysteresisState`] handed to [`SignalEngine::evaluate`].
#[derive(Debug, Clone)]
pub struct SignalEngine {
    fast_len: usize,
    slow_len: usize,
    atr_len: usize,
}

impl SignalEngine {
    pub fn new(indicators: &IndicatorConfig) -> Self {
        Self {
            fast_len: indicators.fast_ema,
            slow_len: indicators.slow_ema,
            atr_len: indicators.atr_length,
        }
    }

    /// Closed bars required before any decision other than "warming up"
    pub fn warmup_bars(&self) -> usize {
        (self.slow_len + 1).max(self.atr_len + 1)
    }

    /// Evaluate one symbol from its ledger entry, holding that entry exclusively.
    ///
    /// Returns `None` for unregistered symbols.
    pub fn evaluate_symbol(
        &self,
        ledger: &InstrumentLedger,
        symbol: &str,
        cfg: &StrategyConfig,
        now_epoch_secs: i64,
    ) -> Option<SignalDecision> {
        let decision = ledger.with_instrument_mut(symbol, |inst| {
            self.evaluate(&inst.candles, &mut inst.hysteresis, cfg, now_epoch_secs)
        })?;

        debug!(
            symbol = %symbol,
            side = %decision.side,
            confidence = decision.confidence,
            reason = %decision.explanation,
            "signal evaluated"
        );
        Some(decision)
    }

    /// Run the state machine once over closed candles.
    ///
    /// Mutates `state` only to track the confirmation streak and to commit a flip.
    pub fn evaluate(
        &self,
        candles: &CandleBuffer,
        state: &mut HysteresisState,
        cfg: &StrategyConfig,
        now_epoch_secs: i64,
    ) -> SignalDecision {
        let mut diag = SignalDiagnostics {
            bars: candles.len(),
            ..Default::default()
        };

        // 1. Warm-up
        if candles.len() < self.warmup_bars() {
            return SignalDecision::new(
                SignalSide::Flat,
                WARMUP_CONFIDENCE,
                "Warming up: not enough closed bars".into(),
                diag,
            );
        }

        // 2. Indicators
        let r = match self.readings(candles) {
            Ok(r) => r,
            Err(e) => {
                debug!(error = %e, "indicator readings unavailable");
                return SignalDecision::new(
                    SignalSide::Flat,
                    WARMUP_CONFIDENCE,
                    "Insufficient data for indicators".into(),
                    diag,
                );
            }
        };
        diag.fast_ema = Some(r.fast);
        diag.slow_ema = Some(r.slow);
        diag.atr_absolute = Some(r.atr_abs);
        diag.atr_percent = Some(r.atr_pct);
        diag.price = Some(r.price);

        // 3. Raw crossover side
        let raw = if r.fast > r.slow {
            SignalSide::Long
        } else if r.fast < r.slow {
            SignalSide::Short
        } else {
            SignalSide::Flat
        };

        // 4. Volatility gate: both thresholds must fail
        if r.atr_pct < cfg.min_atr_percent && r.atr_abs < cfg.min_atr_absolute {
            return SignalDecision::new(
                SignalSide::Flat,
                NO_EDGE_CONFIDENCE,
                "ATR below thresholds".into(),
                diag,
            );
        }

        // 5. No crossover edge
        if raw == SignalSide::Flat {
            state.reset_streak();
            return SignalDecision::new(
                SignalSide::Flat,
                NO_EDGE_CONFIDENCE,
                "EMAs equal, no edge".into(),
                diag,
            );
        }

        // 6. Already committed to this side
        if raw == state.committed {
            state.reset_streak();
            return SignalDecision::new(
                state.committed,
                HOLDING_CONFIDENCE,
                format!("Holding {} (EMAs agree)", state.committed),
                diag,
            );
        }

        // 7. Opposing side: accumulate confirmation, restarting when the target changes
        if state.pending != Some(raw) {
            state.reset_streak();
            state.pending = Some(raw);
        }
        state.confirm_streak += 1;
        diag.streak = Some(state.confirm_streak);
        diag.target_side = Some(raw);
        if state.confirm_streak < cfg.confirm_streak {
            let needed = cfg.confirm_streak - state.confirm_streak;
            return SignalDecision::new(
                SignalSide::Flat,
                PENDING_CONFIDENCE,
                format!("Transition to {} needs {} more bar(s)", raw, needed),
                diag,
            );
        }

        // 8. Cooldown since the last flip; the streak must be rebuilt afterwards
        let since_flip = now_epoch_secs - state.last_flip_epoch_secs;
        if since_flip < cfg.flip_cooldown_secs {
            let remaining = cfg.flip_cooldown_secs - since_flip;
            state.reset_streak();
            diag.streak = Some(0);
            diag.cooldown_remaining_secs = Some(remaining);
            return SignalDecision::new(
                SignalSide::Flat,
                PENDING_CONFIDENCE,
                format!("Cooldown active: {}s", remaining),
                diag,
            );
        }

        // 9. Commit
        let previous = state.committed;
        state.committed = raw;
        state.last_flip_epoch_secs = now_epoch_secs;
        state.reset_streak();
        diag.streak = Some(0);

        let relation = if raw == SignalSide::Long { "above" } else { "below" };
        info!(from = %previous, to = %raw, "signal flip committed");
        SignalDecision::new(
            raw,
            COMMIT_CONFIDENCE,
            format!(
                "{} confirmed: EMA{} crossed {} EMA{}",
                raw, self.fast_len, relation, self.slow_len
            ),
            diag,
        )
    }

    fn readings(&self, candles: &CandleBuffer) -> Result<Readings, EngineError> {
        let closes = candles.closes();
        let highs = candles.highs();
        let lows = candles.lows();

        let fast = ema(&closes, self.fast_len);
        let slow = ema(&closes, self.slow_len);
        let atr_abs = atr(&highs, &lows, &closes, self.atr_len);
        let price = closes.last().copied().unwrap_or(Decimal::ZERO);

        let atr_pct = atr_abs
            .filter(|_| price > Decimal::ZERO)
            .and_then(|a| a.checked_div(price))
            .and_then(|r| r.checked_mul(Decimal::ONE_HUNDRED));

        match (fast, slow, atr_abs, atr_pct) {
            (Some(fast), Some(slow), Some(atr_abs), Some(atr_pct)) => Ok(Readings {
                fast,
                slow,
                atr_abs,
                atr_pct,
                price,
            }),
            _ => Err(EngineError::InsufficientData(format!(
                "{} bars, price {}",
                closes.len(),
                price
            ))),
        }
    }
}

impl Default for SignalEngine {
    fn default() -> Self {
        Self::new(&IndicatorConfig::default())
    }
}
