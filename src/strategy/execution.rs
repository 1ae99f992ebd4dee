use crate::data::{OrderRecord, Side, TradeMode};
use crate::error::{EngineError, EngineResult};
use crate::exchange::{OrderRequest, OrderSink};
use crate::risk::{select_order_type, Admitted, RiskBudget};
use crate::state::SharedState;
use crate::strategy::report::{SignalReport, SignalReporter};
use crate::utils::config::{AutotradeConfig, StrategyConfig};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const BPS: Decimal = dec!(10000);

/// Autotrade parameters fixed at startup
#[derive(Debug, Clone)]
pub struct ExecutionSettings {
    pub budget: RiskBudget,
    pub prefer_maker: bool,
    pub slippage_bps: Decimal,
    pub fallback_notional_usd: Decimal,
    pub tick: Duration,
}

impl From<&AutotradeConfig> for ExecutionSettings {
    fn from(cfg: &AutotradeConfig) -> Self {
        Self {
            budget: RiskBudget::new(cfg.risk_level, cfg.max_exposure_usd),
            prefer_maker: cfg.prefer_maker,
            slippage_bps: cfg.slippage_bps.max(Decimal::ZERO),
            fallback_notional_usd: cfg.fallback_notional_usd.max(Decimal::ZERO),
            tick: Duration::from_millis(cfg.tick_ms.max(100)),
        }
    }
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self::from(&AutotradeConfig::default())
    }
}

/// Manually requested order, bypassing the signal engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    pub limit_price: Option<Decimal>,
    pub prefer_maker: bool,
    /// Record only, even when a live sink is configured
    #[serde(default)]
    pub paper: bool,
}

/// Counts from one execution tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TradingStats {
    pub evaluated: usize,
    pub orders: usize,
    pub skipped: usize,
    pub filtered: usize,
    pub failed: usize,
}

enum SymbolOutcome {
    Skipped(&'static str),
    Recorded,
}

/// Autotrade orchestrator.
///
/// Each tick walks the armed symbols one at a time: evaluate, size, derive a
/// maker price, admit, then submit live or record a paper entry. A failure on
/// one symbol is logged and never stops the others. Without an order sink the
/// engine trades on paper only.
pub struct ExecutionEngine {
    state: SharedState,
    reporter: SignalReporter,
    sink: Option<Arc<dyn OrderSink>>,
    settings: ExecutionSettings,
}

impl ExecutionEngine {
    pub fn new(
        state: SharedState,
        reporter: SignalReporter,
        sink: Option<Arc<dyn OrderSink>>,
        settings: ExecutionSettings,
    ) -> Self {
        Self {
            state,
            reporter,
            sink,
            settings,
        }
    }

    pub fn mode(&self) -> TradeMode {
        if self.sink.is_some() {
            TradeMode::Live
        } else {
            TradeMode::Paper
        }
    }

    /// Tick until shutdown. Idle ticks cost nothing when autotrade is off.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(mode = ?self.mode(), tick_ms = self.settings.tick.as_millis() as u64, "execution loop started");
        let mut interval = tokio::time::interval(self.settings.tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            let symbols = self.state.controls.active_symbols();
            if symbols.is_empty() {
                continue;
            }
            let stats = self.tick(&symbols, chrono::Utc::now().timestamp()).await;
            debug!(?stats, "execution tick");
        }
        info!("execution loop stopped");
    }

    /// One pass over `symbols`
    pub async fn tick(&self, symbols: &[String], now_epoch_secs: i64) -> TradingStats {
        let cfg = self.state.strategy.get();
        let mut stats = TradingStats::default();

        for symbol in symbols {
            stats.evaluated += 1;
            match self.process_symbol(symbol, &cfg, now_epoch_secs).await {
                Ok(SymbolOutcome::Recorded) => stats.orders += 1,
                Ok(SymbolOutcome::Skipped(why)) => {
                    debug!(symbol = %symbol, reason = why, "skip");
                    stats.skipped += 1;
                }
                Err(EngineError::FilterViolation { reason, .. }) => {
                    warn!(symbol = %symbol, reason = %reason, "order refused by admission");
                    self.state.metrics.filter_violations.with_label_values(&[symbol.as_str()]).inc();
                    stats.filtered += 1;
                }
                Err(e) => {
                    error!(symbol = %symbol, error = %e, "symbol execution failed");
                    self.state.metrics.symbol_failures.with_label_values(&[symbol.as_str()]).inc();
                    stats.failed += 1;
                }
            }
        }
        stats
    }

    /// Evaluate and size without trading. Advances the symbol's hysteresis.
    pub fn compute_signal(&self, symbol: &str, now_epoch_secs: i64) -> Option<SignalReport> {
        self.reporter.compute_signal(
            &self.state.ledger,
            &self.state.balances,
            symbol,
            &self.state.strategy.get(),
            &self.settings.budget,
            now_epoch_secs,
        )
    }

    async fn process_symbol(&self, symbol: &str, cfg: &StrategyConfig, now: i64) -> EngineResult<SymbolOutcome> {
        let report = self
            .reporter
            .compute_signal(&self.state.ledger, &self.state.balances, symbol, cfg, &self.settings.budget, now)
            .ok_or_else(|| EngineError::MarketDataUnavailable(format!("{} is not a watched symbol", symbol)))?;

        self.state
            .metrics
            .signal_evaluations
            .with_label_values(&[report.symbol.as_str(), &report.side.to_string()])
            .inc();

        let Some(side) = report.side.order_side() else {
            return Ok(SymbolOutcome::Skipped("no directional signal"));
        };
        let price = self
            .state
            .ledger
            .last_price(&report.symbol)
            .filter(|p| *p > Decimal::ZERO)
            .unwrap_or(report.price);
        if price <= Decimal::ZERO {
            return Ok(SymbolOutcome::Skipped("no price"));
        }

        let quantity = self.quantity_for(&report, price);
        if quantity <= Decimal::ZERO {
            return Ok(SymbolOutcome::Skipped("nothing to trade"));
        }

        let limit_price = maker_price(side, price, self.settings.slippage_bps);
        let admitted = self.admit(&report.symbol, quantity, Some(limit_price))?;

        info!(
            symbol = %report.symbol,
            side = %side,
            qty = %admitted.quantity,
            price = ?admitted.price,
            confidence = report.confidence,
            reason = %report.explanation,
            "autotrade order"
        );
        self.place(&report.symbol, side, admitted, self.settings.prefer_maker, self.sink.as_deref())
            .await?;
        Ok(SymbolOutcome::Recorded)
    }

    /// Sizer suggestion, or the capped exposure fallback when it is zero
    fn quantity_for(&self, report: &SignalReport, price: Decimal) -> Decimal {
        if report.suggested_qty_base > Decimal::ZERO {
            return report.suggested_qty_base;
        }
        let usd = report.target_exposure_usd.min(self.settings.fallback_notional_usd);
        if usd <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        usd.checked_div(price).unwrap_or(Decimal::ZERO)
    }

    /// Admit and record a manual order.
    ///
    /// Admission failures are returned without touching the log. Exchange
    /// rejections are logged with status ERROR and returned.
    pub async fn submit_intent(&self, intent: OrderIntent) -> EngineResult<OrderRecord> {
        let symbol = intent.symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(EngineError::filter(&intent.symbol, "empty symbol"));
        }
        let price = intent.limit_price.filter(|p| *p > Decimal::ZERO);
        let admitted = self.admit(&symbol, intent.quantity, price)?;

        let sink = if intent.paper { None } else { self.sink.as_deref() };
        self.place(&symbol, intent.side, admitted, intent.prefer_maker, sink).await
    }

    fn admit(&self, symbol: &str, quantity: Decimal, price: Option<Decimal>) -> EngineResult<Admitted> {
        let admitted = self.state.rules.enforce(symbol, quantity, price)?;
        if admitted.quantity <= Decimal::ZERO {
            return Err(EngineError::filter(symbol, "quantity rounds to zero"));
        }
        Ok(admitted)
    }

    async fn place(
        &self,
        symbol: &str,
        side: Side,
        admitted: Admitted,
        prefer_maker: bool,
        sink: Option<&dyn OrderSink>,
    ) -> EngineResult<OrderRecord> {
        let order_type = select_order_type(prefer_maker, admitted.price);
        let request = OrderRequest::new(symbol, side, admitted, order_type);

        let Some(sink) = sink else {
            let record = OrderRecord::paper(&request.symbol, side, request.quantity, request.price);
            info!(symbol = %record.symbol, side = %side, qty = %record.quantity, price = ?record.price, "paper order");
            self.record(record.clone());
            return Ok(record);
        };

        match sink.submit(&request).await {
            Ok(ack) => {
                let record = OrderRecord {
                    mode: TradeMode::Live,
                    status: ack.status,
                    exchange_order_id: Some(ack.exchange_order_id),
                    executed_quantity: ack.executed_quantity,
                    cumulative_quote_quantity: ack.cumulative_quote_quantity,
                    ..OrderRecord::paper(&request.symbol, side, request.quantity, request.price)
                };
                info!(symbol = %record.symbol, order_id = ack.exchange_order_id, status = ?ack.status, "live order accepted");
                self.record(record.clone());
                Ok(record)
            }
            Err(e) => {
                error!(symbol = %request.symbol, error = %e, "live order failed");
                self.record(OrderRecord::live_error(
                    &request.symbol,
                    side,
                    request.quantity,
                    request.price,
                    e.to_string(),
                ));
                Err(e)
            }
        }
    }

    fn record(&self, record: OrderRecord) {
        self.state
            .metrics
            .orders
            .with_label_values(&[record.symbol.as_str(), record.mode.as_str(), record.status.as_str()])
            .inc();
        self.state.order_log.append(record);
    }
}

/// Limit price a little inside the last trade: below for BUY, above for SELL
pub fn maker_price(side: Side, price: Decimal, slippage_bps: Decimal) -> Decimal {
    let offset = slippage_bps / BPS;
    match side {
        Side::Buy => price * (Decimal::ONE - offset),
        Side::Sell => price * (Decimal::ONE + offset),
    }
}
