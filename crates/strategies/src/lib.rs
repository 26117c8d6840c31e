//! # Strategy Library
//!
//! This crate contains the trading logic that the backtester drives. It defines a
//! universal `Strategy` trait and provides several concrete implementations.
//!
//! ## Architectural Principles
//!
//! - **Layer 2 Logic:** This is a pure logic crate. It has no knowledge of data files,
//!   fills or the ledger's internals. Strategies see the portfolio only through the
//!   read-only `PortfolioView` carried by `StrategyContext`.
//! - **Composition over inheritance:** Every strategy owns a `BaseStrategy` holding its
//!   name, parameters and symbols. The trait's default methods delegate to it, so a
//!   concrete strategy only has to implement `base` and `on_data_point`.
//! - **Enrichment context:** Indicators come from the `IndicatorStore`, which the engine
//!   updates before each tick. A lookup with too little history is an explicit error,
//!   which strategies treat as "not warmed up yet".
//! - **Extensibility:** Adding a new strategy involves creating a new module, implementing
//!   the `Strategy` trait, and adding it to the `StrategyId` enum and `factory`.
//!
//! ## Public API
//!
//! The primary public components are:
//! - `Strategy`: The core trait all strategies implement.
//! - `StrategyContext` / `IndicatorStore`: What a strategy may read while deciding.
//! - `create_strategy`: The factory function to construct a strategy instance.
//! - The concrete strategy structs themselves (e.g., `MACrossover`).

pub mod base;
pub mod buy_and_hold;
pub mod context;
pub mod error;
pub mod factory;
pub mod indicators;
pub mod ma_crossover;
pub mod rsi_reversion;

pub use base::BaseStrategy;
pub use buy_and_hold::BuyAndHold;
pub use context::StrategyContext;
pub use error::StrategyError;
pub use factory::create_strategy;
pub use indicators::{IndicatorStore, MacdValue};
pub use ma_crossover::MACrossover;
pub use rsi_reversion::RsiReversion;

// Re-export StrategyId from core_types
pub use core_types::StrategyId;

use core_types::{DataPoint, Order, Trade};
use serde_json::Value;

/// The contract between the simulation engine and a trading strategy.
///
/// `on_data_point` takes `&mut self` because most strategies carry state
/// between ticks (previous indicator values, whether they have entered yet).
/// The `Send` bound lets independent backtests run on separate threads.
pub trait Strategy: Send {
    /// The composed default implementation.
    fn base(&self) -> &BaseStrategy;

    /// Decides on the orders for one tick.
    ///
    /// Returning an error discards this tick's orders; the run continues.
    fn on_data_point(
        &mut self,
        ctx: &StrategyContext<'_>,
        data_point: &DataPoint,
    ) -> Result<Vec<Order>, StrategyError>;

    fn name(&self) -> &str {
        self.base().name()
    }

    fn parameters(&self) -> &Value {
        self.base().parameters()
    }

    /// Called once before the first tick. An error aborts the run.
    fn initialize(&mut self, _ctx: &StrategyContext<'_>) -> Result<(), StrategyError> {
        self.base().log_initialize();
        Ok(())
    }

    /// Called after each of this strategy's orders is filled and booked.
    fn on_trade(&mut self, _ctx: &StrategyContext<'_>, trade: &Trade) -> Result<(), StrategyError> {
        self.base().log_trade(trade);
        Ok(())
    }

    /// Called once after liquidation.
    fn cleanup(&mut self, _ctx: &StrategyContext<'_>) -> Result<(), StrategyError> {
        self.base().log_cleanup();
        Ok(())
    }
}

/// Symbols a strategy should act on this tick: its configured list, or every
/// symbol in the data point when the list is empty.
pub(crate) fn tracked_symbols<'a>(base: &'a BaseStrategy, data_point: &'a DataPoint) -> Vec<&'a str> {
    if base.symbols().is_empty() {
        data_point.symbols().collect()
    } else {
        base.symbols()
            .iter()
            .map(String::as_str)
            .filter(|s| data_point.bar(s).is_some())
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use core_types::{Bar, Order, PortfolioView, Position, Trade};
    use rust_decimal::Decimal;
    use std::collections::BTreeMap;

    /// A hand-driven ledger for strategy tests.
    #[derive(Default)]
    pub struct Book {
        pub cash: Decimal,
        pub positions: BTreeMap<String, Position>,
    }

    impl Book {
        pub fn with_cash(cash: Decimal) -> Self {
            Self {
                cash,
                positions: BTreeMap::new(),
            }
        }

        pub fn hold(&mut self, symbol: &str, quantity: Decimal, price: Decimal) {
            let mut position = Position::flat(symbol, start());
            position.quantity = quantity;
            position.avg_price = price;
            position.mark(price);
            self.positions.insert(symbol.to_string(), position);
        }
    }

    impl PortfolioView for Book {
        fn cash(&self) -> Decimal {
            self.cash
        }
        fn total_value(&self) -> Decimal {
            self.cash + self.positions.values().map(|p| p.market_value).sum::<Decimal>()
        }
        fn position(&self, symbol: &str) -> Option<&Position> {
            self.positions.get(symbol)
        }
        fn positions(&self) -> Vec<&Position> {
            self.positions.values().collect()
        }
    }

    pub fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    /// A frictionless fill of `order` at `price` on the first day.
    pub fn fill(order: &Order, price: Decimal) -> Trade {
        Trade {
            trade_id: 1,
            symbol: order.symbol.clone(),
            side: order.side,
            quantity: order.quantity,
            price,
            timestamp: start(),
            commission: Decimal::ZERO,
            regulatory_fee: Decimal::ZERO,
            activity_fee: Decimal::ZERO,
            slippage: Decimal::ZERO,
            strategy: order.strategy.clone(),
            reason: order.reason.clone(),
        }
    }

    pub fn tick(day: i64, closes: &[(&str, Decimal)]) -> DataPoint {
        let timestamp = start() + Duration::days(day);
        DataPoint::from_bars(
            timestamp,
            closes.iter().map(|(s, c)| Bar::synthetic(s, timestamp, *c)),
        )
    }
}
