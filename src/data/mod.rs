pub mod types;
pub mod ledger;
pub mod balances;
pub mod order_log;

pub use types::{Candle, Side, SignalSide, TradePrint};
pub use ledger::{CandleBuffer, HysteresisState, Instrument, InstrumentLedger};
pub use balances::{base_quote, BalanceCache};
pub use order_log::{OrderLog, OrderRecord, OrderStatus, TradeMode};
