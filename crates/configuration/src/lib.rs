//! Layered configuration for backtest runs.
//!
//! A TOML file supplies the base values, `APP__`-prefixed environment
//! variables override them, and every section falls back to defaults when
//! omitted. Configuration is validated as soon as it is loaded.

use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod logging;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use error::ConfigError;
pub use logging::init_logging;
pub use settings::{
    AllocationConfig, AllocationMethod, Backtest, BuyAndHoldParams, CommissionConfig,
    CommissionModel, Config, LoggingConfig, MACrossoverParams, RsiReversionParams, Simulation,
    SlippageMode, Strategies,
};

/// Loads the application configuration from a TOML file.
///
/// Values can be overridden with `APP__`-prefixed environment variables, e.g.
/// `APP__BACKTEST__INITIAL_CAPITAL=25000`. The result is validated before it
/// is returned.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    tracing::debug!(path = %path.as_ref().display(), "Loading configuration");
    let builder = config::Config::builder()
        .add_source(config::File::from(path.as_ref()))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("backtest.symbols")
                .try_parsing(true),
        )
        .build()?;

    // Attempt to deserialize the entire configuration into our `Config` struct
    let config = builder.try_deserialize::<Config>()?;
    config.validate()?;

    Ok(config)
}

/// Parses and validates configuration from an in-memory TOML document.
pub fn parse_config(toml: &str) -> Result<Config, ConfigError> {
    let config = config::Config::builder()
        .add_source(config::File::from_str(toml, config::FileFormat::Toml))
        .build()?
        .try_deserialize::<Config>()?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn partial_documents_fall_back_to_defaults() {
        let config = parse_config(
            r#"
            [backtest]
            symbols = ["AAPL", "MSFT"]
            initial_capital = 25000

            [allocation]
            method = "confidence"
            max_positions = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.backtest.symbols, vec!["AAPL", "MSFT"]);
        assert_eq!(config.backtest.initial_capital, dec!(25000));
        assert_eq!(config.allocation.method, AllocationMethod::Confidence);
        assert_eq!(config.allocation.max_positions, 2);
        assert_eq!(config.allocation.position_size, dec!(0.95));
        assert_eq!(config.simulation.activity_fee_cap, dec!(7.27));
    }

    #[test]
    fn invalid_documents_are_rejected_eagerly() {
        let err = parse_config(
            r#"
            [strategies.ma_crossover]
            short_period = 30
            long_period = 10
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn slippage_modes_deserialize() {
        let config = parse_config(
            r#"
            [simulation]
            slippage_mode = "noisy"
            seed = 42
            "#,
        )
        .unwrap();
        assert_eq!(config.simulation.slippage_mode, SlippageMode::Noisy);
        assert_eq!(config.simulation.seed, Some(42));
    }

    #[test]
    fn shipped_example_config_is_valid() {
        let config = parse_config(include_str!("../../../config.toml")).unwrap();
        assert_eq!(config.backtest.symbols, vec!["AAPL", "MSFT"]);
        assert_eq!(config.simulation.commission.model, CommissionModel::Percentage);
        assert_eq!(config.strategies.rsi_reversion.period, 14);
    }
}
