pub mod sizing;
pub mod admission;

pub use sizing::{floor_to_step, protective_levels, PositionSizer, RiskBudget, SizingPlan};
pub use admission::{select_order_type, Admitted, OrderType, RulesBook, TimeInForce, TradingRules};
