pub mod config;
pub mod logger;
pub mod metrics;
pub mod supervisor;

pub use config::{AutotradeControls, Config, StrategyConfig, StrategyConfigStore, StrategyUpdate};
pub use logger::{init_from_config, init_logger};
pub use metrics::Metrics;
pub use supervisor::{run_periodic, Backoff};
