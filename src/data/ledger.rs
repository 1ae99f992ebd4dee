use crate::data::types::{Candle, SignalSide};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default ring capacity (~5h of 1m bars)
pub const DEFAULT_CANDLE_CAPACITY: usize = 300;

/// Fixed-capacity, insertion-ordered candle ring. Oldest bar is evicted on overflow.
#[derive(Debug, Clone)]
pub struct CandleBuffer {
    bars: VecDeque<Candle>,
    capacity: usize,
}

impl CandleBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            bars: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, candle: Candle) {
        if self.bars.len() == self.capacity {
            self.bars.pop_front();
        }
        self.bars.push_back(candle);
    }

    /// Replace the whole buffer, keeping only the newest `capacity` bars
    pub fn replace<I: IntoIterator<Item = Candle>>(&mut self, candles: I) {
        self.bars.clear();
        for candle in candles {
            self.push(candle);
        }
    }

    pub fn clear(&mut self) {
        self.bars.clear();
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn latest(&self) -> Option<&Candle> {
        self.bars.back()
    }

    pub fn closes(&self) -> Vec<Decimal> {
        self.bars.iter().map(|c| c.close).collect()
    }

    pub fn highs(&self) -> Vec<Decimal> {
        self.bars.iter().map(|c| c.high).collect()
    }

    pub fn lows(&self) -> Vec<Decimal> {
        self.bars.iter().map(|c| c.low).collect()
    }
}

/// Per-symbol anti-whipsaw state. Only the signal engine mutates it.
///
/// `confirm_streak` counts consecutive bars agreeing on `pending`; it is zero
/// whenever `pending` is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HysteresisState {
    pub committed: SignalSide,
    pub last_flip_epoch_secs: i64,
    pub confirm_streak: u32,
    /// Side the streak is confirming
    pub pending: Option<SignalSide>,
}

impl HysteresisState {
    /// Drop any confirmation in progress
    pub fn reset_streak(&mut self) {
        self.confirm_streak = 0;
        self.pending = None;
    }
}

/// Everything the ledger tracks for one symbol
#[derive(Debug, Clone)]
pub struct Instrument {
    pub candles: CandleBuffer,
    pub hysteresis: HysteresisState,
    pub last_price: Option<Decimal>,
    pub last_trade_ms: i64,
}

impl Instrument {
    pub fn new(capacity: usize) -> Self {
        Self {
            candles: CandleBuffer::new(capacity),
            hysteresis: HysteresisState::default(),
            last_price: None,
            last_trade_ms: 0,
        }
    }
}

/// Registry owning all mutable per-symbol signal state.
///
/// Backed by a `DashMap`, so each symbol is guarded independently: a closure
/// passed to [`InstrumentLedger::with_instrument_mut`] holds that symbol's
/// write guard for its whole duration, which serialises evaluations per symbol
/// without blocking the others.
pub struct InstrumentLedger {
    entries: DashMap<String, Instrument>,
    capacity: usize,
}

impl InstrumentLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity,
        }
    }

    pub fn with_symbols<S: AsRef<str>>(symbols: &[S], capacity: usize) -> Self {
        let ledger = Self::new(capacity);
        for s in symbols {
            ledger.register(s.as_ref());
        }
        ledger
    }

    /// Register a symbol with FLAT hysteresis. Returns false if already known.
    pub fn register(&self, symbol: &str) -> bool {
        let key = normalize(symbol);
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, Instrument::new(self.capacity));
        true
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.entries.contains_key(&normalize(symbol))
    }

    /// Registered symbols, sorted
    pub fn symbols(&self) -> Vec<String> {
        let mut out: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        out.sort();
        out
    }

    /// Snapshot of one symbol's state
    pub fn get(&self, symbol: &str) -> Option<Instrument> {
        self.entries.get(&normalize(symbol)).map(|e| e.value().clone())
    }

    /// Replace a symbol's candle buffer wholesale, registering it if needed
    pub fn upsert_candles(&self, symbol: &str, candles: Vec<Candle>) {
        let capacity = self.capacity;
        let mut entry = self
            .entries
            .entry(normalize(symbol))
            .or_insert_with(|| Instrument::new(capacity));
        entry.candles.replace(candles);
    }

    pub fn push_candle(&self, symbol: &str, candle: Candle) {
        let capacity = self.capacity;
        let mut entry = self
            .entries
            .entry(normalize(symbol))
            .or_insert_with(|| Instrument::new(capacity));
        entry.candles.push(candle);
    }

    /// Drop every symbol's bars. Hysteresis and prices are kept.
    pub fn clear_candles(&self) {
        for mut entry in self.entries.iter_mut() {
            entry.candles.clear();
        }
    }

    /// Last-writer-wins price update. Unknown symbols are ignored.
    pub fn record_price(&self, symbol: &str, price: Decimal, timestamp_ms: i64) {
        if let Some(mut entry) = self.entries.get_mut(&normalize(symbol)) {
            entry.last_price = Some(price);
            entry.last_trade_ms = timestamp_ms;
        }
    }

    pub fn last_price(&self, symbol: &str) -> Option<Decimal> {
        self.entries
            .get(&normalize(symbol))
            .and_then(|e| e.last_price)
    }

    pub fn hysteresis(&self, symbol: &str) -> Option<HysteresisState> {
        self.entries.get(&normalize(symbol)).map(|e| e.hysteresis)
    }

    pub fn candle_count(&self, symbol: &str) -> usize {
        self.entries
            .get(&normalize(symbol))
            .map(|e| e.candles.len())
            .unwrap_or(0)
    }

    /// Run `f` with exclusive access to one symbol's state
    pub fn with_instrument_mut<R>(
        &self,
        symbol: &str,
        f: impl FnOnce(&mut Instrument) -> R,
    ) -> Option<R> {
        self.entries
            .get_mut(&normalize(symbol))
            .map(|mut entry| f(entry.value_mut()))
    }
}

fn normalize(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_buffer_evicts_oldest() {
        let mut buf = CandleBuffer::new(3);
        for p in [dec!(1), dec!(2), dec!(3), dec!(4)] {
            buf.push(Candle::flat(p));
        }
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.closes(), vec![dec!(2), dec!(3), dec!(4)]);
        assert_eq!(buf.latest().unwrap().close, dec!(4));
    }

    #[test]
    fn test_replace_keeps_newest_bars() {
        let mut buf = CandleBuffer::new(2);
        buf.replace((1..=5).map(|i| Candle::flat(Decimal::from(i))));
        assert_eq!(buf.closes(), vec![dec!(4), dec!(5)]);
    }

    #[test]
    fn test_register_starts_flat() {
        let ledger = InstrumentLedger::with_symbols(&["btcusdc"], 10);
        assert!(ledger.contains("BTCUSDC"));
        assert!(!ledger.register("BTCUSDC"));

        let h = ledger.hysteresis("BTCUSDC").unwrap();
        assert_eq!(h.committed, SignalSide::Flat);
        assert_eq!(h.confirm_streak, 0);
        assert_eq!(h.pending, None);
        assert_eq!(h.last_flip_epoch_secs, 0);
    }

    #[test]
    fn test_clear_candles_keeps_hysteresis() {
        let ledger = InstrumentLedger::with_symbols(&["ETHUSDC", "SOLUSDC"], 10);
        ledger.upsert_candles("ETHUSDC", vec![Candle::flat(dec!(10)); 4]);
        ledger.push_candle("SOLUSDC", Candle::flat(dec!(5)));
        ledger.with_instrument_mut("ETHUSDC", |i| {
            i.hysteresis.committed = SignalSide::Long;
        });

        ledger.clear_candles();

        assert_eq!(ledger.candle_count("ETHUSDC"), 0);
        assert_eq!(ledger.candle_count("SOLUSDC"), 0);
        assert_eq!(
            ledger.hysteresis("ETHUSDC").unwrap().committed,
            SignalSide::Long
        );
    }

    #[test]
    fn test_record_price_ignores_unknown_symbols() {
        let ledger = InstrumentLedger::with_symbols(&["BTCUSDC"], 10);
        ledger.record_price("BTCUSDC", dec!(50000), 1_000);
        ledger.record_price("XYZUSDC", dec!(1), 1_000);

        assert_eq!(ledger.last_price("btcusdc"), Some(dec!(50000)));
        assert_eq!(ledger.last_price("XYZUSDC"), None);
        assert!(!ledger.contains("XYZUSDC"));
    }
}
