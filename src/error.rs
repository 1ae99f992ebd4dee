use thiserror::Error;

/// Failure taxonomy shared by the engine, the admission layer and the exchange client.
///
/// `InsufficientData` never escapes the signal engine: it is recovered locally
/// as a FLAT decision. Everything else is surfaced to the orchestrator, which
/// logs it against the symbol and moves on.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("filter check failed for {symbol}: {reason}")]
    FilterViolation { symbol: String, reason: String },

    #[error("market data unavailable: {0}")]
    MarketDataUnavailable(String),

    #[error("exchange rejected order: {code} {message}")]
    ExchangeRejection { code: i64, message: String },

    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl EngineError {
    pub fn filter(symbol: &str, reason: impl Into<String>) -> Self {
        EngineError::FilterViolation {
            symbol: symbol.to_string(),
            reason: reason.into(),
        }
    }

    /// Errors raised locally before any side effect reached the exchange.
    pub fn is_client_side(&self) -> bool {
        matches!(
            self,
            EngineError::FilterViolation { .. } | EngineError::ConfigurationInvalid(_)
        )
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        EngineError::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Transport(format!("decode: {}", e))
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
