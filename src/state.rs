use crate::data::{BalanceCache, InstrumentLedger, OrderLog};
use crate::risk::RulesBook;
use crate::utils::config::{AutotradeControls, Config, StrategyConfigStore};
use crate::utils::Metrics;
use std::sync::Arc;

/// Handles shared by the execution loop and the refreshers.
///
/// Loops communicate only through these last-writer-wins stores.
#[derive(Clone)]
pub struct SharedState {
    pub ledger: Arc<InstrumentLedger>,
    pub balances: Arc<BalanceCache>,
    pub rules: Arc<RulesBook>,
    pub strategy: Arc<StrategyConfigStore>,
    pub controls: Arc<AutotradeControls>,
    pub order_log: Arc<OrderLog>,
    pub metrics: Arc<Metrics>,
}

impl SharedState {
    pub fn from_config(config: &Config) -> prometheus::Result<Self> {
        let symbols = &config.general.symbols;
        let ledger = Arc::new(InstrumentLedger::with_symbols(symbols, config.indicators.candle_capacity));
        let strategy = Arc::new(StrategyConfigStore::new(config.strategy.clone(), Arc::clone(&ledger)));

        let controls = Arc::new(AutotradeControls::new(symbols));
        controls.set_symbols(&config.autotrade.symbols);
        controls.set_enabled(config.autotrade.enabled);

        Ok(Self {
            ledger,
            balances: Arc::new(BalanceCache::new()),
            rules: Arc::new(RulesBook::new()),
            strategy,
            controls,
            order_log: Arc::new(OrderLog::new(config.order_log.capacity)),
            metrics: Arc::new(Metrics::new()?),
        })
    }

    /// Watched symbols, uppercase
    pub fn symbols(&self) -> Vec<String> {
        self.ledger.symbols()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_arms_only_watched_symbols() {
        let mut config = Config::default();
        config.general.symbols = vec!["BTCUSDC".into(), "ETHUSDC".into()];
        config.autotrade.enabled = true;
        config.autotrade.symbols = vec!["ethusdc".into(), "PEPEUSDC".into()];

        let state = SharedState::from_config(&config).unwrap();
        assert_eq!(state.symbols().len(), 2);
        assert_eq!(state.controls.active_symbols(), vec!["ETHUSDC".to_string()]);
        assert!(state.order_log.is_empty());
    }
}
