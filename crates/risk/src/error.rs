use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RiskError {
    #[error("Allocation parameters from configuration are invalid: {0}")]
    InvalidParameters(String),
}
