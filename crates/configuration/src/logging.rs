use crate::error::ConfigError;
use crate::settings::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// Installs the global `tracing` subscriber.
///
/// Console output is always enabled. When `config.directory` is set, a
/// non-blocking daily rolling file layer is added and its guard is returned;
/// the caller must keep the guard alive for buffered lines to be flushed.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>, ConfigError> {
    let filter = || {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&config.level))
            .map_err(|e| ConfigError::Logging(e.to_string()))
    };

    let console = fmt::layer()
        .with_target(true)
        .with_timer(LocalTime::rfc_3339())
        .with_filter(filter()?);

    match &config.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file = fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(filter()?);
            tracing_subscriber::registry()
                .with(console)
                .with(file)
                .try_init()
                .map_err(|e| ConfigError::Logging(e.to_string()))?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(console)
                .try_init()
                .map_err(|e| ConfigError::Logging(e.to_string()))?;
            Ok(None)
        }
    }
}
