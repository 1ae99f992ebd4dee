pub mod data;
pub mod error;
pub mod exchange;
pub mod refresh;
pub mod risk;
pub mod state;
pub mod strategy;
pub mod utils;

// Re-export commonly used types
pub use data::{BalanceCache, Candle, InstrumentLedger, OrderLog, OrderRecord, Side, SignalSide};
pub use error::{EngineError, EngineResult};
pub use exchange::{BinanceRestClient, OrderSink, TradeStream};
pub use risk::{PositionSizer, RiskBudget, RulesBook, TradingRules};
pub use state::SharedState;
pub use strategy::{
    ExecutionEngine, ExecutionSettings, OrderIntent, SignalDecision, SignalEngine, SignalReport, SignalReporter,
};
pub use utils::{Config, Metrics};
