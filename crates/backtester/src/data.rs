use crate::error::DataError;
use chrono::{DateTime, NaiveDate, Utc};
use configuration::Backtest;
use core_types::{Bar, DataPoint};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

/// A replayable stream of ticks in non-decreasing timestamp order.
pub trait MarketDataSource: Send {
    fn initialize(&mut self) -> Result<(), DataError>;

    fn close(&mut self) -> Result<(), DataError>;

    fn has_more_data(&self) -> bool;

    /// The next tick, or `None` at end of stream.
    fn next_data_point(&mut self) -> Result<Option<DataPoint>, DataError>;

    /// Rewinds to the first tick.
    fn reset(&mut self) -> Result<(), DataError>;

    /// Total number of ticks, when known.
    fn size_hint(&self) -> Option<usize> {
        None
    }
}

/// Where historical bars come from.
pub trait HistoricalDataProvider: Send {
    /// Bars for one symbol within the inclusive range, oldest first.
    fn get_bars(
        &self,
        symbol: &str,
        timeframe: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<Bar>, DataError>;
}

fn in_range(ts: DateTime<Utc>, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> bool {
    start.is_none_or(|s| ts >= s) && end.is_none_or(|e| ts <= e)
}

/// Bars held in memory, keyed by symbol.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProvider {
    bars: HashMap<String, Vec<Bar>>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bars(mut self, bars: impl IntoIterator<Item = Bar>) -> Self {
        for bar in bars {
            self.bars.entry(bar.symbol.clone()).or_default().push(bar);
        }
        self
    }
}

impl HistoricalDataProvider for InMemoryProvider {
    fn get_bars(
        &self,
        symbol: &str,
        _timeframe: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<Bar>, DataError> {
        let bars = self
            .bars
            .get(symbol)
            .ok_or_else(|| DataError::MissingSymbol(symbol.to_string()))?;
        let mut selected: Vec<Bar> = bars
            .iter()
            .filter(|b| in_range(b.timestamp, start, end))
            .cloned()
            .collect();
        selected.sort_by_key(|b| b.timestamp);
        Ok(selected)
    }
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    timestamp: String,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: Decimal,
}

/// Reads `<directory>/<SYMBOL>.csv` with a
/// `timestamp,open,high,low,close,volume` header.
///
/// Timestamps are RFC 3339; a bare `YYYY-MM-DD` date is read as midnight UTC.
#[derive(Debug, Clone)]
pub struct CsvDataProvider {
    directory: PathBuf,
}

impl CsvDataProvider {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn path_for(&self, symbol: &str) -> PathBuf {
        self.directory.join(format!("{symbol}.csv"))
    }

    fn read_file(path: &Path, symbol: &str, timeframe: &str) -> Result<Vec<Bar>, DataError> {
        let csv_error = |source| DataError::Csv {
            path: path.to_path_buf(),
            source,
        };
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(csv_error)?;

        let mut bars = Vec::new();
        for (index, row) in reader.deserialize::<CsvRow>().enumerate() {
            // Row 1 is the header.
            let row_number = index + 2;
            let row = row.map_err(csv_error)?;
            let invalid = |reason: String| DataError::InvalidBar {
                path: path.to_path_buf(),
                row: row_number,
                reason,
            };

            let timestamp = parse_timestamp(&row.timestamp).map_err(invalid)?;
            if row.high < row.low {
                return Err(invalid(format!("high {} is below low {}", row.high, row.low)));
            }
            if row.close <= Decimal::ZERO {
                return Err(invalid(format!("non-positive close {}", row.close)));
            }
            bars.push(Bar {
                symbol: symbol.to_string(),
                timestamp,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
                timeframe: timeframe.to_string(),
            });
        }
        Ok(bars)
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("unparseable timestamp '{raw}'"))
}

impl HistoricalDataProvider for CsvDataProvider {
    fn get_bars(
        &self,
        symbol: &str,
        timeframe: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<Bar>, DataError> {
        let path = self.path_for(symbol);
        if !path.exists() {
            return Err(DataError::MissingSymbol(symbol.to_string()));
        }
        let mut bars = Self::read_file(&path, symbol, timeframe)?;
        bars.retain(|b| in_range(b.timestamp, start, end));
        bars.sort_by_key(|b| b.timestamp);
        tracing::debug!(%symbol, path = %path.display(), bars = bars.len(), "Loaded bars from CSV");
        Ok(bars)
    }
}

/// A `MarketDataSource` that loads every symbol up front and replays the
/// bars grouped by timestamp.
pub struct HistoricalFeed {
    provider: Box<dyn HistoricalDataProvider>,
    symbols: Vec<String>,
    timeframe: String,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    require_complete: bool,
    points: Vec<DataPoint>,
    cursor: usize,
    initialized: bool,
}

impl HistoricalFeed {
    /// Repeated symbols are loaded once.
    pub fn new(provider: Box<dyn HistoricalDataProvider>, mut symbols: Vec<String>, timeframe: impl Into<String>) -> Self {
        let mut seen = HashSet::new();
        symbols.retain(|s| seen.insert(s.clone()));
        Self {
            provider,
            symbols,
            timeframe: timeframe.into(),
            start: None,
            end: None,
            require_complete: true,
            points: Vec::new(),
            cursor: 0,
            initialized: false,
        }
    }

    /// A feed over the configured symbols, timeframe and date range. The end
    /// date covers its whole day.
    pub fn from_config(provider: Box<dyn HistoricalDataProvider>, params: &Backtest) -> Self {
        let start = params
            .start_date
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|d| d.and_utc());
        let end = params
            .end_date
            .and_then(|d| d.and_hms_opt(23, 59, 59))
            .map(|d| d.and_utc());
        Self::new(provider, params.symbols.clone(), params.timeframe.clone())
            .with_range(start, end)
            .require_complete(params.require_complete_data_points)
    }

    pub fn with_range(mut self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    /// When set (the default), only timestamps carrying a bar for every
    /// symbol are replayed.
    pub fn require_complete(mut self, require: bool) -> Self {
        self.require_complete = require;
        self
    }

    /// Percentage of ticks already replayed.
    pub fn progress(&self) -> f64 {
        if self.points.is_empty() {
            return 0.0;
        }
        self.cursor as f64 / self.points.len() as f64 * 100.0
    }

    /// First and last timestamps that will be replayed.
    pub fn date_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        Some((self.points.first()?.timestamp, self.points.last()?.timestamp))
    }
}

impl MarketDataSource for HistoricalFeed {
    fn initialize(&mut self) -> Result<(), DataError> {
        let mut grouped: BTreeMap<DateTime<Utc>, DataPoint> = BTreeMap::new();
        for symbol in &self.symbols {
            let bars = self.provider.get_bars(symbol, &self.timeframe, self.start, self.end)?;
            for bar in bars {
                grouped
                    .entry(bar.timestamp)
                    .or_insert_with(|| DataPoint::new(bar.timestamp))
                    .bars
                    .insert(bar.symbol.clone(), bar);
            }
        }

        let expected = self.symbols.len();
        let total = grouped.len();
        self.points = grouped
            .into_values()
            .filter(|dp| {
                let complete = dp.bars.len() == expected;
                if !complete && self.require_complete {
                    tracing::debug!(timestamp = %dp.timestamp, bars = dp.bars.len(), expected, "Skipping incomplete data point");
                }
                complete || !self.require_complete
            })
            .collect();
        self.cursor = 0;
        self.initialized = true;

        tracing::info!(
            symbols = ?self.symbols,
            data_points = self.points.len(),
            skipped = total - self.points.len(),
            "Historical feed initialized"
        );
        Ok(())
    }

    fn close(&mut self) -> Result<(), DataError> {
        self.points.clear();
        self.cursor = 0;
        self.initialized = false;
        Ok(())
    }

    fn has_more_data(&self) -> bool {
        !self.initialized || self.cursor < self.points.len()
    }

    fn next_data_point(&mut self) -> Result<Option<DataPoint>, DataError> {
        if !self.initialized {
            return Err(DataError::NotInitialized);
        }
        let point = self.points.get(self.cursor).cloned();
        if point.is_some() {
            self.cursor += 1;
        }
        Ok(point)
    }

    fn reset(&mut self) -> Result<(), DataError> {
        if !self.initialized {
            return Err(DataError::NotInitialized);
        }
        self.cursor = 0;
        Ok(())
    }

    fn size_hint(&self) -> Option<usize> {
        self.initialized.then_some(self.points.len())
    }
}
