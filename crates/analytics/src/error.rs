use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalyticsError {
    #[error("Trade {trade_id} cannot be matched: {reason}")]
    InvalidTrade { trade_id: u64, reason: String },

    #[error("Error in calculation: {0}")]
    Calculation(String),
}
