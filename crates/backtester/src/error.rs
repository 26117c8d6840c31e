use crate::EngineState;
use std::path::PathBuf;
use thiserror::Error;

/// Failures from loading or replaying market data.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("I/O error reading market data: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Invalid bar in {path} at row {row}: {reason}")]
    InvalidBar {
        path: PathBuf,
        row: usize,
        reason: String,
    },

    #[error("No market data available for symbol: {0}")]
    MissingSymbol(String),

    #[error("The data source has not been initialized.")]
    NotInitialized,
}

#[derive(Error, Debug)]
pub enum BacktestError {
    #[error("Strategy failed to initialize: {0}")]
    StrategyInitialization(#[source] strategies::StrategyError),

    #[error("Market data source failed: {0}")]
    DataSource(#[from] DataError),

    #[error("The market data source produced no data.")]
    NoData,

    #[error("Cannot run a backtest from the {0:?} state.")]
    InvalidState(EngineState),

    #[error("Execution simulation error: {0}")]
    Executor(#[from] executor::ExecutorError),

    #[error("Analytics calculation error: {0}")]
    Analytics(#[from] analytics::AnalyticsError),

    #[error("Failed to export results: {0}")]
    Export(#[from] serde_json::Error),

    #[error("Failed to export the event journal: {0}")]
    Journal(#[from] events::EventsError),

    #[error("Progress bar template error: {0}")]
    ProgressBarTemplate(String),
}

impl From<indicatif::style::TemplateError> for BacktestError {
    fn from(error: indicatif::style::TemplateError) -> Self {
        BacktestError::ProgressBarTemplate(error.to_string())
    }
}
