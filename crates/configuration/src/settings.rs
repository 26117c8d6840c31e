use crate::error::ConfigError;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::PathBuf;

/// The root configuration structure for the entire application.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backtest: Backtest,
    #[serde(default)]
    pub simulation: Simulation,
    #[serde(default)]
    pub allocation: AllocationConfig,
    #[serde(default)]
    pub strategies: Strategies,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Contains parameters for a single backtest run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Backtest {
    /// The symbols to replay together, one bar each per tick.
    pub symbols: Vec<String>,
    /// The timeframe label of the bars (e.g., "1d").
    pub timeframe: String,
    /// The initial starting capital for the simulation.
    pub initial_capital: Decimal,
    /// Optional lower bound on bar timestamps (inclusive).
    pub start_date: Option<NaiveDate>,
    /// Optional upper bound on bar timestamps (inclusive of the whole day).
    pub end_date: Option<NaiveDate>,
    /// Directory holding one `<SYMBOL>.csv` per symbol.
    pub data_dir: PathBuf,
    /// Only emit ticks that carry a bar for every symbol.
    pub require_complete_data_points: bool,
    /// Number of bars of history the indicator store keeps per symbol.
    pub indicator_window: usize,
    pub show_progress: bool,
    /// Keep a journal of engine events in the results.
    pub record_events: bool,
}

impl Default for Backtest {
    fn default() -> Self {
        Self {
            symbols: vec!["AAPL".to_string()],
            timeframe: "1d".to_string(),
            initial_capital: dec!(10000),
            start_date: None,
            end_date: None,
            data_dir: PathBuf::from("data"),
            require_complete_data_points: true,
            indicator_window: 200,
            show_progress: false,
            record_events: false,
        }
    }
}

/// How commission is charged on each fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionModel {
    /// `rate` is a fraction of notional (0.001 = 0.1 %).
    Percentage,
    /// `rate` is a flat amount per trade.
    Fixed,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CommissionConfig {
    pub model: CommissionModel,
    pub rate: Decimal,
}

impl Default for CommissionConfig {
    fn default() -> Self {
        Self {
            model: CommissionModel::Percentage,
            rate: dec!(0.001),
        }
    }
}

impl CommissionConfig {
    pub fn calculate(&self, notional: Decimal) -> Decimal {
        match self.model {
            CommissionModel::Percentage => notional * self.rate,
            CommissionModel::Fixed => self.rate,
        }
    }
}

/// Whether market and stop fills carry a random slippage component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum SlippageMode {
    /// Base slippage only; identical inputs always produce identical fills.
    #[default]
    Deterministic,
    /// Base slippage plus a uniform draw in `[0, max_slippage)`.
    Noisy,
}

/// Contains parameters for the broker execution simulator.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Simulation {
    pub commission: CommissionConfig,
    /// Base slippage as a fraction of the reference price (0.001 = 0.1 %).
    pub slippage: Decimal,
    /// Upper bound of the random slippage component, as a fraction.
    pub max_slippage: Decimal,
    pub slippage_mode: SlippageMode,
    /// Seed for the noisy slippage generator. Drawn from entropy when absent.
    pub seed: Option<u64>,
    /// Fee on sell notional (0.0000278 = $27.80 per million).
    pub regulatory_fee_rate: Decimal,
    /// Fee per share traded, on both sides.
    pub activity_fee_per_share: Decimal,
    /// Ceiling on the activity fee for a single trade.
    pub activity_fee_cap: Decimal,
}

impl Default for Simulation {
    fn default() -> Self {
        Self {
            commission: CommissionConfig::default(),
            slippage: dec!(0.001),
            max_slippage: dec!(0.001),
            slippage_mode: SlippageMode::Deterministic,
            seed: None,
            regulatory_fee_rate: dec!(0.0000278),
            activity_fee_per_share: dec!(0.000145),
            activity_fee_cap: dec!(7.27),
        }
    }
}

/// How the capital allocator divides cash among competing signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum AllocationMethod {
    /// Even split across the selected signals.
    Equal,
    /// Proportional to signal confidence.
    Confidence,
    /// Proportional to signal priority.
    Priority,
    /// Best-ranked first until cash runs out.
    #[default]
    Sequential,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AllocationConfig {
    pub method: AllocationMethod,
    /// Maximum number of signals funded per tick. Zero means unlimited.
    pub max_positions: usize,
    /// Fraction of tradable cash to deploy (0.95 = 95 %).
    pub position_size: Decimal,
    /// Cash at or below this amount is never allocated.
    pub min_cash_buffer: Decimal,
    /// Fraction of cash held back for fees and slippage.
    pub slippage_buffer: Decimal,
    pub allow_fractional: bool,
    /// Scale quantities down when realised volatility is high.
    pub volatility_adjust: bool,
    /// Volatility above which quantities are scaled by 0.7.
    pub high_volatility_threshold: Decimal,
    /// Volatility above which quantities are scaled by 0.85.
    pub medium_volatility_threshold: Decimal,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            method: AllocationMethod::Sequential,
            max_positions: 3,
            position_size: dec!(0.95),
            min_cash_buffer: dec!(100),
            slippage_buffer: dec!(0.02),
            allow_fractional: false,
            volatility_adjust: false,
            high_volatility_threshold: dec!(0.03),
            medium_volatility_threshold: dec!(0.02),
        }
    }
}

/// Contains the parameter sets for all available strategies.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Strategies {
    #[serde(default)]
    pub buy_and_hold: BuyAndHoldParams,
    #[serde(default)]
    pub ma_crossover: MACrossoverParams,
    #[serde(default)]
    pub rsi_reversion: RsiReversionParams,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BuyAndHoldParams {
    /// Fraction of cash spent on the first tick.
    pub cash_fraction: Decimal,
}

impl Default for BuyAndHoldParams {
    fn default() -> Self {
        Self {
            cash_fraction: dec!(0.95),
        }
    }
}

/// Parameters for the simple moving average crossover strategy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MACrossoverParams {
    pub short_period: usize,
    pub long_period: usize,
}

impl Default for MACrossoverParams {
    fn default() -> Self {
        Self {
            short_period: 5,
            long_period: 20,
        }
    }
}

/// Parameters for the RSI mean-reversion strategy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RsiReversionParams {
    pub period: usize,
    pub oversold: Decimal,
    pub overbought: Decimal,
}

impl Default for RsiReversionParams {
    fn default() -> Self {
        Self {
            period: 14,
            oversold: dec!(30),
            overbought: dec!(70),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// An `EnvFilter` directive such as `info` or `backtester=debug`.
    pub level: String,
    /// When set, logs are also written to a daily rolling file here.
    pub directory: Option<PathBuf>,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
            file_prefix: "backtest.log".to_string(),
        }
    }
}

fn ensure(condition: bool, message: impl Into<String>) -> Result<(), ConfigError> {
    if condition {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(message.into()))
    }
}

fn ensure_fraction(value: Decimal, name: &str) -> Result<(), ConfigError> {
    ensure(
        value >= Decimal::ZERO && value <= Decimal::ONE,
        format!("{name} must be between 0 and 1, got {value}"),
    )
}

impl Config {
    /// Rejects configurations that cannot describe a meaningful run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let bt = &self.backtest;
        ensure(!bt.symbols.is_empty(), "backtest.symbols must not be empty")?;
        ensure(
            bt.initial_capital > Decimal::ZERO,
            format!("backtest.initial_capital must be positive, got {}", bt.initial_capital),
        )?;
        ensure(bt.indicator_window > 0, "backtest.indicator_window must be positive")?;
        if let (Some(start), Some(end)) = (bt.start_date, bt.end_date) {
            ensure(start <= end, format!("backtest.start_date {start} is after end_date {end}"))?;
        }

        let sim = &self.simulation;
        ensure(sim.commission.rate >= Decimal::ZERO, "simulation.commission.rate must not be negative")?;
        ensure_fraction(sim.slippage, "simulation.slippage")?;
        ensure_fraction(sim.max_slippage, "simulation.max_slippage")?;
        ensure(sim.regulatory_fee_rate >= Decimal::ZERO, "simulation.regulatory_fee_rate must not be negative")?;
        ensure(sim.activity_fee_per_share >= Decimal::ZERO, "simulation.activity_fee_per_share must not be negative")?;
        ensure(sim.activity_fee_cap >= Decimal::ZERO, "simulation.activity_fee_cap must not be negative")?;

        let alloc = &self.allocation;
        ensure(
            alloc.position_size > Decimal::ZERO && alloc.position_size <= Decimal::ONE,
            format!("allocation.position_size must be in (0, 1], got {}", alloc.position_size),
        )?;
        ensure_fraction(alloc.slippage_buffer, "allocation.slippage_buffer")?;
        ensure(alloc.min_cash_buffer >= Decimal::ZERO, "allocation.min_cash_buffer must not be negative")?;
        ensure(
            alloc.medium_volatility_threshold <= alloc.high_volatility_threshold,
            "allocation.medium_volatility_threshold must not exceed high_volatility_threshold",
        )?;

        let strategies = &self.strategies;
        let bh = &strategies.buy_and_hold;
        ensure(
            bh.cash_fraction > Decimal::ZERO && bh.cash_fraction <= Decimal::ONE,
            "strategies.buy_and_hold.cash_fraction must be in (0, 1]",
        )?;
        let ma = &strategies.ma_crossover;
        ensure(ma.short_period > 0, "strategies.ma_crossover.short_period must be positive")?;
        ensure(
            ma.short_period < ma.long_period,
            format!(
                "strategies.ma_crossover.short_period ({}) must be less than long_period ({})",
                ma.short_period, ma.long_period
            ),
        )?;
        let rsi = &strategies.rsi_reversion;
        ensure(rsi.period > 0, "strategies.rsi_reversion.period must be positive")?;
        ensure(
            rsi.oversold < rsi.overbought,
            "strategies.rsi_reversion.oversold must be below overbought",
        )?;

        Ok(())
    }
}
