use crate::Strategy;
use crate::buy_and_hold::BuyAndHold;
use crate::error::StrategyError;
use crate::ma_crossover::MACrossover;
use crate::rsi_reversion::RsiReversion;
use configuration::Config;
use core_types::StrategyId;

/// Creates a new strategy instance based on the provided ID and configuration.
///
/// Parameters come from the matching `[strategies.*]` section; signal-driven
/// strategies also receive the `[allocation]` section for their capital allocator.
/// An empty `symbols` slice means "every symbol in each data point".
pub fn create_strategy(
    id: StrategyId,
    config: &Config,
    symbols: &[String],
) -> Result<Box<dyn Strategy>, StrategyError> {
    // The compiler will error if a new StrategyId is added but not handled here.
    let strategy: Box<dyn Strategy> = match id {
        StrategyId::BuyAndHold => Box::new(BuyAndHold::new(
            config.strategies.buy_and_hold.clone(),
            symbols,
        )?),
        StrategyId::MACrossover => Box::new(MACrossover::new(
            config.strategies.ma_crossover.clone(),
            config.allocation.clone(),
            symbols,
        )?),
        StrategyId::RsiReversion => Box::new(RsiReversion::new(
            config.strategies.rsi_reversion.clone(),
            config.allocation.clone(),
            symbols,
        )?),
    };
    tracing::debug!(strategy = %strategy.name(), parameters = %strategy.parameters(), "Strategy created");
    Ok(strategy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_every_strategy_from_defaults() {
        let config = Config::default();
        for id in StrategyId::ALL {
            let strategy = create_strategy(id, &config, &["AAPL".to_string()]).unwrap();
            assert_eq!(strategy.name(), id.as_str());
            assert_eq!(strategy.base().symbols(), ["AAPL".to_string()]);
        }
    }

    #[test]
    fn surfaces_invalid_parameters() {
        let mut config = Config::default();
        config.strategies.ma_crossover.short_period = 50;
        let err = create_strategy(StrategyId::MACrossover, &config, &[]);
        assert!(matches!(err, Err(StrategyError::InvalidParameters(_))));
    }
}
