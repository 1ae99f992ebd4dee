use crate::data::types::Side;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Default number of retained entries
pub const DEFAULT_ORDER_LOG_CAPACITY: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeMode {
    Paper,
    Live,
}

impl TradeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeMode::Paper => "paper",
            TradeMode::Live => "live",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Paper,
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
    Error,
}

impl OrderStatus {
    /// Map an exchange status string. Unknown values are treated as NEW.
    pub fn from_exchange(status: &str) -> Self {
        match status {
            "FILLED" => OrderStatus::Filled,
            "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
            "CANCELED" | "PENDING_CANCEL" => OrderStatus::Canceled,
            "REJECTED" => OrderStatus::Rejected,
            "EXPIRED" | "EXPIRED_IN_MATCH" => OrderStatus::Expired,
            _ => OrderStatus::New,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Paper => "PAPER",
            OrderStatus::New => "NEW",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Canceled => "CANCELED",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::Expired => "EXPIRED",
            OrderStatus::Error => "ERROR",
        }
    }
}

/// One recorded order attempt, paper or live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub mode: TradeMode,
    pub status: OrderStatus,
    pub exchange_order_id: Option<u64>,
    pub executed_quantity: Decimal,
    pub cumulative_quote_quantity: Decimal,
    pub error: Option<String>,
}

impl OrderRecord {
    pub fn paper(symbol: &str, side: Side, quantity: Decimal, price: Option<Decimal>) -> Self {
        Self {
            timestamp: Utc::now(),
            symbol: symbol.to_string(),
            side,
            quantity,
            price,
            mode: TradeMode::Paper,
            status: OrderStatus::Paper,
            exchange_order_id: None,
            executed_quantity: Decimal::ZERO,
            cumulative_quote_quantity: Decimal::ZERO,
            error: None,
        }
    }

    pub fn live_error(
        symbol: &str,
        side: Side,
        quantity: Decimal,
        price: Option<Decimal>,
        error: String,
    ) -> Self {
        Self {
            mode: TradeMode::Live,
            status: OrderStatus::Error,
            error: Some(error),
            ..Self::paper(symbol, side, quantity, price)
        }
    }
}

/// Append-only ring of recent orders; the oldest entries are trimmed past capacity.
///
/// Appends are serialised by the inner mutex so several loops may log concurrently.
pub struct OrderLog {
    entries: Mutex<VecDeque<OrderRecord>>,
    capacity: usize,
}

impl OrderLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn append(&self, record: OrderRecord) {
        let mut entries = self.lock();
        entries.push_back(record);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    /// Newest-first view; `limit` is clamped to [1, 200]
    pub fn recent(&self, limit: usize) -> Vec<OrderRecord> {
        let limit = limit.clamp(1, 200);
        self.lock().iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<OrderRecord>> {
        // A panicked writer leaves the ring structurally valid
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for OrderLog {
    fn default() -> Self {
        Self::new(DEFAULT_ORDER_LOG_CAPACITY)
    }
}
