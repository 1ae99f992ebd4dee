pub mod indicators;
pub mod trend;

pub use indicators::{atr, ema};
pub use trend::{SignalDecision, SignalDiagnostics, SignalEngine};
