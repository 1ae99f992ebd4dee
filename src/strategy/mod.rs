pub mod execution;
pub mod report;
pub mod signals;

pub use execution::{maker_price, ExecutionEngine, ExecutionSettings, OrderIntent, TradingStats};
pub use report::{Reason, SignalReport, SignalReporter};
pub use signals::{SignalDecision, SignalDiagnostics, SignalEngine};
