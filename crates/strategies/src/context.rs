use crate::indicators::IndicatorStore;
use chrono::{DateTime, Utc};
use core_types::{PortfolioView, Position};
use rust_decimal::Decimal;

/// Everything a strategy may look at while deciding, and nothing it may change.
#[derive(Clone, Copy)]
pub struct StrategyContext<'a> {
    portfolio: &'a dyn PortfolioView,
    indicators: &'a IndicatorStore,
    timestamp: Option<DateTime<Utc>>,
}

impl<'a> StrategyContext<'a> {
    pub fn new(portfolio: &'a dyn PortfolioView, indicators: &'a IndicatorStore) -> Self {
        Self {
            portfolio,
            indicators,
            timestamp: None,
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn portfolio(&self) -> &'a dyn PortfolioView {
        self.portfolio
    }

    pub fn indicators(&self) -> &'a IndicatorStore {
        self.indicators
    }

    /// Timestamp of the tick being processed; `None` outside the main loop.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    pub fn cash(&self) -> Decimal {
        self.portfolio.cash()
    }

    pub fn position(&self, symbol: &str) -> Option<&'a Position> {
        self.portfolio.position(symbol)
    }

    /// Signed quantity held, zero when flat.
    pub fn quantity(&self, symbol: &str) -> Decimal {
        self.portfolio.quantity(symbol)
    }
}
