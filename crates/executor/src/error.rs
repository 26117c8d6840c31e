use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutorError {
    /// The order's trigger condition was not met by the bar. Recoverable.
    #[error("Order for {symbol} not fillable: {reason}")]
    OrderNotFillable { symbol: String, reason: String },

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Bar for {bar_symbol} cannot fill an order for {order_symbol}")]
    SymbolMismatch {
        order_symbol: String,
        bar_symbol: String,
    },

    #[error("Not enough cash available to execute trade. Required: {required}, Available: {available}")]
    InsufficientCash { required: Decimal, available: Decimal },

    #[error("Position not found for symbol: {0}")]
    PositionNotFound(String),

    #[error("Invalid trade: {0}")]
    InvalidTrade(String),
}

impl From<core_types::CoreError> for ExecutorError {
    fn from(err: core_types::CoreError) -> Self {
        ExecutorError::InvalidOrder(err.to_string())
    }
}
