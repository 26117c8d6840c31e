use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StrategyError {
    #[error("Strategy received invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Insufficient data for {symbol}: need {needed} bars, have {available}")]
    InsufficientData {
        symbol: String,
        needed: usize,
        available: usize,
    },

    #[error("No market data has been seen for symbol: {0}")]
    UnknownSymbol(String),

    #[error("An error occurred during indicator calculation: {0}")]
    IndicatorError(String),
}

impl From<risk::RiskError> for StrategyError {
    fn from(err: risk::RiskError) -> Self {
        StrategyError::InvalidParameters(err.to_string())
    }
}
