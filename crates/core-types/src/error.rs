use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Invalid input for {0}: {1}")]
    InvalidInput(String, String),

    #[error("Unknown strategy identifier: {0}")]
    UnknownStrategy(String),

    #[error("Calculation error: {0}")]
    Calculation(String),
}
