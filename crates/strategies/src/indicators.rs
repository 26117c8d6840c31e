use crate::error::StrategyError;
use core_types::{Bar, DataPoint};
use risk::VolatilitySource;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use std::collections::{HashMap, VecDeque};
use ta::Next;
use ta::indicators::{
    ExponentialMovingAverage as Ema, MovingAverageConvergenceDivergence as Macd,
    RelativeStrengthIndex as Rsi, SimpleMovingAverage as Sma, StandardDeviation,
};

/// Default number of bars kept per symbol.
pub const DEFAULT_WINDOW: usize = 200;

/// Lookback used when the allocator asks for volatility.
pub const VOLATILITY_PERIOD: usize = 20;

/// The three lines of a MACD reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdValue {
    pub macd: Decimal,
    pub signal: Decimal,
    pub histogram: Decimal,
}

/// Rolling per-symbol bar history with technical-indicator lookups.
///
/// The engine feeds every `DataPoint` in before the strategy runs. Histories
/// are created the first time a symbol appears and hold at most `window`
/// bars. Every lookup with too little history fails with
/// `StrategyError::InsufficientData` instead of returning a default.
#[derive(Debug, Clone)]
pub struct IndicatorStore {
    window: usize,
    history: HashMap<String, VecDeque<Bar>>,
}

impl Default for IndicatorStore {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl IndicatorStore {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            history: HashMap::new(),
        }
    }

    /// Appends every bar in the data point to its symbol's history.
    pub fn update(&mut self, data_point: &DataPoint) {
        for bar in data_point.bars.values() {
            let bars = self.history.entry(bar.symbol.clone()).or_default();
            bars.push_back(bar.clone());
            if bars.len() > self.window {
                bars.pop_front();
            }
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Number of bars currently held for `symbol`.
    pub fn len(&self, symbol: &str) -> usize {
        self.history.get(symbol).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Up to `limit` most recent bars, oldest first.
    pub fn bars(&self, symbol: &str, limit: usize) -> Result<Vec<&Bar>, StrategyError> {
        let bars = self.history(symbol)?;
        let skip = bars.len().saturating_sub(limit);
        Ok(bars.iter().skip(skip).collect())
    }

    pub fn last_bar(&self, symbol: &str) -> Result<&Bar, StrategyError> {
        self.history(symbol)?
            .back()
            .ok_or_else(|| StrategyError::UnknownSymbol(symbol.to_string()))
    }

    /// Simple moving average of the last `period` closes.
    pub fn sma(&self, symbol: &str, period: usize) -> Result<Decimal, StrategyError> {
        let closes = self.closes(symbol, period)?;
        let mut sma = Sma::new(period).map_err(indicator_error)?;
        let value = closes[closes.len() - period..]
            .iter()
            .fold(0.0, |_, c| sma.next(*c));
        to_decimal(value)
    }

    /// Exponential moving average over the whole window.
    pub fn ema(&self, symbol: &str, period: usize) -> Result<Decimal, StrategyError> {
        let closes = self.closes(symbol, period)?;
        let mut ema = Ema::new(period).map_err(indicator_error)?;
        to_decimal(closes.iter().fold(0.0, |_, c| ema.next(*c)))
    }

    /// Relative strength index in `[0, 100]`. Needs `period + 1` closes.
    pub fn rsi(&self, symbol: &str, period: usize) -> Result<Decimal, StrategyError> {
        let closes = self.closes(symbol, period + 1)?;
        let mut rsi = Rsi::new(period).map_err(indicator_error)?;
        to_decimal(closes.iter().fold(0.0, |_, c| rsi.next(*c)))
    }

    pub fn macd(
        &self,
        symbol: &str,
        fast: usize,
        slow: usize,
        signal: usize,
    ) -> Result<MacdValue, StrategyError> {
        if fast >= slow {
            return Err(StrategyError::InvalidParameters(format!(
                "MACD fast period ({fast}) must be less than slow period ({slow})"
            )));
        }
        let closes = self.closes(symbol, slow)?;
        let mut macd = Macd::new(fast, slow, signal).map_err(indicator_error)?;
        let mut last = None;
        for close in &closes {
            last = Some(macd.next(*close));
        }
        let out = last.ok_or_else(|| StrategyError::UnknownSymbol(symbol.to_string()))?;
        Ok(MacdValue {
            macd: to_decimal(out.macd)?,
            signal: to_decimal(out.signal)?,
            histogram: to_decimal(out.histogram)?,
        })
    }

    /// Sample standard deviation of the last `period` close-to-close returns.
    pub fn volatility(&self, symbol: &str, period: usize) -> Result<Decimal, StrategyError> {
        if period < 2 {
            return Err(StrategyError::InvalidParameters(
                "volatility needs a period of at least 2".to_string(),
            ));
        }
        let closes = self.closes(symbol, period + 1)?;
        let tail = &closes[closes.len() - (period + 1)..];
        let mut sd = StandardDeviation::new(period).map_err(indicator_error)?;
        let mut population = 0.0;
        for pair in tail.windows(2) {
            let ret = if pair[0] > 0.0 { (pair[1] - pair[0]) / pair[0] } else { 0.0 };
            population = sd.next(ret);
        }
        // Bessel's correction on top of the population figure.
        let n = period as f64;
        to_decimal(population * (n / (n - 1.0)).sqrt())
    }

    fn history(&self, symbol: &str) -> Result<&VecDeque<Bar>, StrategyError> {
        self.history
            .get(symbol)
            .ok_or_else(|| StrategyError::UnknownSymbol(symbol.to_string()))
    }

    /// All closes in the window as `f64`, after checking at least `needed` exist.
    fn closes(&self, symbol: &str, needed: usize) -> Result<Vec<f64>, StrategyError> {
        if needed == 0 {
            return Err(StrategyError::InvalidParameters(
                "indicator period must be positive".to_string(),
            ));
        }
        let bars = self.history(symbol)?;
        if bars.len() < needed {
            return Err(StrategyError::InsufficientData {
                symbol: symbol.to_string(),
                needed,
                available: bars.len(),
            });
        }
        bars.iter()
            .map(|b| {
                b.close
                    .to_f64()
                    .ok_or_else(|| StrategyError::IndicatorError(format!("close {} is not representable", b.close)))
            })
            .collect()
    }
}

impl VolatilitySource for IndicatorStore {
    fn volatility(&self, symbol: &str) -> Option<Decimal> {
        IndicatorStore::volatility(self, symbol, VOLATILITY_PERIOD).ok()
    }
}

fn to_decimal(value: f64) -> Result<Decimal, StrategyError> {
    Decimal::from_f64(value)
        .ok_or_else(|| StrategyError::IndicatorError(format!("indicator produced {value}")))
}

fn indicator_error(err: ta::errors::TaError) -> StrategyError {
    StrategyError::IndicatorError(format!("{err:?}"))
}
