use crate::data::InstrumentLedger;
use crate::error::{EngineError, EngineResult};
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub strategy: StrategyConfig,
    pub indicators: IndicatorConfig,
    pub autotrade: AutotradeConfig,
    pub refresh: RefreshConfig,
    pub exchange: ExchangeConfig,
    pub logging: LoggingConfig,
    pub order_log: OrderLogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Symbols watched for market data and eligible for autotrading
    pub symbols: Vec<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            symbols: [
                "BTCUSDC", "ETHUSDC", "BNBUSDC", "DOGEUSDC", "HBARUSDC", "XLMUSDC", "SOLUSDC",
                "XRPUSDC",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Strategy parameters, mutable at runtime through [`StrategyConfigStore`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub timeframe: String,
    pub min_atr_percent: Decimal,
    pub min_atr_absolute: Decimal,
    pub confirm_streak: u32,
    pub flip_cooldown_secs: i64,
    pub stop_atr_multiple: Decimal,
    pub take_profit_risk_multiple: Decimal,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            timeframe: "1m".to_string(),
            min_atr_percent: dec!(0.02),
            min_atr_absolute: dec!(8.0),
            confirm_streak: 2,
            flip_cooldown_secs: 120,
            stop_atr_multiple: dec!(1.5),
            take_profit_risk_multiple: dec!(2.0),
        }
    }
}

impl StrategyConfig {
    /// Pull every field into its valid range
    pub fn clamped(mut self) -> Self {
        self.min_atr_percent = self.min_atr_percent.max(Decimal::ZERO);
        self.min_atr_absolute = self.min_atr_absolute.max(Decimal::ZERO);
        self.confirm_streak = self.confirm_streak.max(1);
        self.flip_cooldown_secs = self.flip_cooldown_secs.max(0);
        self.stop_atr_multiple = self.stop_atr_multiple.max(MIN_MULTIPLE);
        self.take_profit_risk_multiple = self.take_profit_risk_multiple.max(MIN_MULTIPLE);
        self
    }
}

const MIN_MULTIPLE: Decimal = dec!(0.1);

/// Fixed indicator lengths and buffer sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub fast_ema: usize,
    pub slow_ema: usize,
    pub atr_length: usize,
    pub candle_capacity: usize,
    pub kline_limit: u32,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            fast_ema: 20,
            slow_ema: 50,
            atr_length: 14,
            candle_capacity: 300,
            kline_limit: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutotradeConfig {
    pub enabled: bool,
    pub symbols: Vec<String>,
    pub risk_level: Decimal,
    pub max_exposure_usd: Decimal,
    pub prefer_maker: bool,
    pub slippage_bps: Decimal,
    /// Cap on the exposure-based fallback sizing path
    pub fallback_notional_usd: Decimal,
    pub tick_ms: u64,
}

impl Default for AutotradeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            symbols: Vec::new(),
            risk_level: dec!(0.35),
            max_exposure_usd: dec!(2000),
            prefer_maker: true,
            slippage_bps: dec!(10),
            fallback_notional_usd: dec!(200),
            tick_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub candles_secs: u64,
    pub balances_secs: u64,
    pub rules_secs: u64,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            candles_secs: 5,
            balances_secs: 10,
            rules_secs: 3600,
            backoff_initial_ms: 1000,
            backoff_max_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    pub testnet: bool,
    pub api_endpoint: String,
    pub ws_endpoint: String,
    pub recv_window_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            testnet: true,
            api_endpoint: "https://testnet.binance.vision".to_string(),
            ws_endpoint: "wss://testnet.binance.vision".to_string(),
            recv_window_ms: 5000,
            request_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub output: String,
    pub file_path: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            output: "pretty".to_string(),
            file_path: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderLogConfig {
    pub capacity: usize,
}

impl Default for OrderLogConfig {
    fn default() -> Self {
        Self {
            capacity: crate::data::order_log::DEFAULT_ORDER_LOG_CAPACITY,
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("parsing config")?;
        Ok(config.normalized())
    }

    /// Load from environment variable or default path
    pub fn load() -> Result<Self> {
        let path = std::env::var("CONFIG_FILE")
            .unwrap_or_else(|_| "config/default.toml".to_string());
        Self::from_file(path)
    }

    /// Uppercase symbols and clamp out-of-range values
    fn normalized(mut self) -> Self {
        self.general.symbols = self
            .general
            .symbols
            .iter()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        self.strategy = self.strategy.clamped();
        self.autotrade.risk_level = self.autotrade.risk_level.clamp(Decimal::ZERO, Decimal::ONE);
        self.autotrade.max_exposure_usd = self.autotrade.max_exposure_usd.max(Decimal::ZERO);
        self.autotrade.slippage_bps = self.autotrade.slippage_bps.max(Decimal::ZERO);
        self.autotrade.fallback_notional_usd = self.autotrade.fallback_notional_usd.max(Decimal::ZERO);
        self.indicators.fast_ema = self.indicators.fast_ema.max(1);
        self.indicators.slow_ema = self.indicators.slow_ema.max(1);
        self.indicators.atr_length = self.indicators.atr_length.max(1);
        self
    }
}

/// Partial strategy update. Absent fields are left untouched.
///
/// Accepts the snake_case field names as well as the legacy camelCase ones.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrategyUpdate {
    pub timeframe: Option<String>,
    #[serde(alias = "minAtrPct")]
    pub min_atr_percent: Option<Decimal>,
    #[serde(alias = "minAtrUsd")]
    pub min_atr_absolute: Option<Decimal>,
    #[serde(alias = "confirmStreak")]
    pub confirm_streak: Option<i64>,
    #[serde(alias = "flipCooldownSec")]
    pub flip_cooldown_secs: Option<i64>,
    #[serde(alias = "stopAtrMult")]
    pub stop_atr_multiple: Option<Decimal>,
    #[serde(alias = "tpRiskMultiple")]
    pub take_profit_risk_multiple: Option<Decimal>,
}

/// Process-wide strategy configuration with the timeframe side effect.
///
/// Changing the timeframe clears every candle buffer in the ledger and bumps
/// a generation counter so in-flight refreshes for the old timeframe can
/// discard their results.
pub struct StrategyConfigStore {
    current: RwLock<StrategyConfig>,
    ledger: Arc<InstrumentLedger>,
    generation: AtomicU64,
}

impl StrategyConfigStore {
    pub fn new(initial: StrategyConfig, ledger: Arc<InstrumentLedger>) -> Self {
        Self {
            current: RwLock::new(initial.clamped()),
            ledger,
            generation: AtomicU64::new(0),
        }
    }

    pub fn get(&self) -> StrategyConfig {
        self.read().clone()
    }

    /// (timeframe, generation) pair for refreshers
    pub fn timeframe(&self) -> (String, u64) {
        let cfg = self.read();
        (cfg.timeframe.clone(), self.generation.load(Ordering::SeqCst))
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Apply a typed update, clamping out-of-range values
    pub fn apply(&self, update: StrategyUpdate) -> StrategyConfig {
        let mut cfg = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut timeframe_changed = false;
        if let Some(tf) = update.timeframe.map(|t| t.trim().to_string()) {
            if !tf.is_empty() && tf != cfg.timeframe {
                cfg.timeframe = tf;
                timeframe_changed = true;
            }
        }
        if let Some(v) = update.min_atr_percent {
            cfg.min_atr_percent = v;
        }
        if let Some(v) = update.min_atr_absolute {
            cfg.min_atr_absolute = v;
        }
        if let Some(v) = update.confirm_streak {
            cfg.confirm_streak = v.clamp(1, u32::MAX as i64) as u32;
        }
        if let Some(v) = update.flip_cooldown_secs {
            cfg.flip_cooldown_secs = v;
        }
        if let Some(v) = update.stop_atr_multiple {
            cfg.stop_atr_multiple = v;
        }
        if let Some(v) = update.take_profit_risk_multiple {
            cfg.take_profit_risk_multiple = v;
        }
        *cfg = cfg.clone().clamped();

        if timeframe_changed {
            // Still under the write lock: no refresher can observe the new
            // timeframe before the old bars are gone
            self.generation.fetch_add(1, Ordering::SeqCst);
            self.ledger.clear_candles();
            info!(timeframe = %cfg.timeframe, "timeframe changed, candle buffers cleared");
        }
        cfg.clone()
    }

    /// Apply an untyped update. Malformed types fail and change nothing.
    pub fn apply_json(&self, value: serde_json::Value) -> EngineResult<StrategyConfig> {
        let update: StrategyUpdate = serde_json::from_value(value)
            .map_err(|e| EngineError::ConfigurationInvalid(e.to_string()))?;
        Ok(self.apply(update))
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, StrategyConfig> {
        self.current.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Autotrade master switch and armed symbol set
pub struct AutotradeControls {
    enabled: AtomicBool,
    armed: RwLock<BTreeSet<String>>,
    watched: BTreeSet<String>,
}

impl AutotradeControls {
    pub fn new<S: AsRef<str>>(watched: &[S]) -> Self {
        Self {
            enabled: AtomicBool::new(false),
            armed: RwLock::new(BTreeSet::new()),
            watched: watched.iter().map(|s| s.as_ref().to_uppercase()).collect(),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        info!(enabled, "autotrade toggled");
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Arm a set of symbols. Unwatched symbols are silently dropped.
    pub fn set_symbols<I, S>(&self, symbols: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let next: BTreeSet<String> = symbols
            .into_iter()
            .map(|s| s.as_ref().trim().to_uppercase())
            .filter(|s| self.watched.contains(s))
            .collect();
        let armed: Vec<String> = next.iter().cloned().collect();
        *self.armed.write().unwrap_or_else(|p| p.into_inner()) = next;
        armed
    }

    /// Armed symbols, sorted
    pub fn symbols(&self) -> Vec<String> {
        self.armed
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /// Symbols to trade this tick: empty unless enabled
    pub fn active_symbols(&self) -> Vec<String> {
        if !self.is_enabled() {
            return Vec::new();
        }
        self.symbols()
    }
}
