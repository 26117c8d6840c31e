//! # Backtester
//!
//! The simulation engine. It replays a `MarketDataSource` tick by tick through
//! a `Strategy`, routes the strategy's orders to an `Executor`, books every fill
//! in the `Portfolio`, and hands the trade log to the analytics crate once the
//! data is exhausted.
//!
//! ## Architectural Principles
//!
//! - **Layer 3 Orchestration:** The engine owns its ledger, broker and strategy
//!   exclusively. Nothing is shared between runs, so independent backtests can run
//!   side by side on separate threads.
//! - **Skip and continue:** Unfillable or unaffordable orders and strategy errors
//!   on a tick are logged and skipped. Only setup failures abort a run.
//!
//! ## Public API
//!
//! - `Backtester`: The engine and its `run` entry point.
//! - `MarketDataSource`, `HistoricalFeed` and the data providers.
//! - `BacktestResults`: Trades, equity curve, metrics and the printable summary.

pub mod data;
pub mod error;
pub mod results;

pub use data::{CsvDataProvider, HistoricalDataProvider, HistoricalFeed, InMemoryProvider, MarketDataSource};
pub use error::{BacktestError, DataError};
pub use results::BacktestResults;

use analytics::{AnalyticsEngine, TradeMatcher};
use chrono::{DateTime, Utc};
use configuration::Backtest;
use core_types::{Bar, DataPoint, EquityPoint, Order, OrderSide, PortfolioView, Trade};
use events::EngineEvent;
use executor::{Executor, Portfolio};
use indicatif::{ProgressBar, ProgressStyle};
use rust_decimal::Decimal;
use strategies::{IndicatorStore, Strategy, StrategyContext};
use uuid::Uuid;

/// Strategy tag carried by the closing orders synthesized after the last tick.
pub const LIQUIDATION_TAG: &str = "liquidation";

/// Lifecycle of one engine. `Aborted` is terminal and reachable from any
/// state on a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Created,
    Initialized,
    Running,
    Liquidating,
    Finalized,
    Aborted,
}

/// The main backtesting engine.
pub struct Backtester {
    // --- Context ---
    run_id: Uuid,
    params: Backtest,
    state: EngineState,
    // --- Components ---
    strategy: Box<dyn Strategy>,
    source: Box<dyn MarketDataSource>,
    executor: Box<dyn Executor>,
    portfolio: Portfolio,
    indicators: IndicatorStore,
    analytics_engine: AnalyticsEngine,
    // --- Run output ---
    trades: Vec<Trade>,
    equity_curve: Vec<EquityPoint>,
    events: Vec<EngineEvent>,
    last_timestamp: Option<DateTime<Utc>>,
    results: Option<BacktestResults>,
}

impl Backtester {
    pub fn new(
        params: Backtest,
        strategy: Box<dyn Strategy>,
        source: Box<dyn MarketDataSource>,
        executor: Box<dyn Executor>,
        portfolio: Portfolio,
    ) -> Self {
        let indicators = IndicatorStore::new(params.indicator_window);
        Self {
            run_id: Uuid::new_v4(),
            params,
            state: EngineState::Created,
            strategy,
            source,
            executor,
            portfolio,
            indicators,
            analytics_engine: AnalyticsEngine::new(),
            trades: Vec::new(),
            equity_curve: Vec::new(),
            events: Vec::new(),
            last_timestamp: None,
            results: None,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    pub fn results(&self) -> Option<&BacktestResults> {
        self.results.as_ref()
    }

    /// Runs the simulation to completion.
    ///
    /// Fails without producing results when the strategy or the data source
    /// cannot be initialized, or when the source has no data at all.
    pub fn run(&mut self) -> Result<&BacktestResults, BacktestError> {
        if self.state != EngineState::Created {
            return Err(BacktestError::InvalidState(self.state));
        }

        if let Err(e) = self.execute() {
            self.state = EngineState::Aborted;
            tracing::error!(run_id = %self.run_id, error = %e, "Backtest aborted");
            // Best effort; the original error is the one worth reporting.
            if let Err(close_err) = self.source.close() {
                tracing::warn!(error = %close_err, "Failed to close data source after abort");
            }
            return Err(e);
        }

        self.results.as_ref().ok_or(BacktestError::InvalidState(self.state))
    }

    fn execute(&mut self) -> Result<(), BacktestError> {
        self.initialize()?;

        self.state = EngineState::Running;
        let processed = self.main_loop()?;
        if processed == 0 {
            return Err(BacktestError::NoData);
        }

        self.state = EngineState::Liquidating;
        self.liquidate();

        let ctx = StrategyContext::new(&self.portfolio, &self.indicators);
        if let Err(e) = self.strategy.cleanup(&ctx) {
            tracing::warn!(strategy = %self.strategy.name(), error = %e, "Strategy cleanup failed");
        }
        if let Err(e) = self.source.close() {
            tracing::warn!(error = %e, "Failed to close data source");
        }

        self.results = Some(self.finalize()?);
        self.state = EngineState::Finalized;
        Ok(())
    }

    fn initialize(&mut self) -> Result<(), BacktestError> {
        tracing::info!(run_id = %self.run_id, strategy = %self.strategy.name(), "Initializing backtest");

        let ctx = StrategyContext::new(&self.portfolio, &self.indicators);
        self.strategy
            .initialize(&ctx)
            .map_err(BacktestError::StrategyInitialization)?;

        self.source.initialize()?;
        if !self.source.has_more_data() {
            return Err(BacktestError::NoData);
        }

        self.state = EngineState::Initialized;
        Ok(())
    }

    fn progress_bar(&self) -> Result<ProgressBar, BacktestError> {
        if !self.params.show_progress {
            return Ok(ProgressBar::hidden());
        }
        let bar = match self.source.size_hint() {
            Some(len) => ProgressBar::new(len as u64),
            None => ProgressBar::no_length(),
        };
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
            )?
            .progress_chars("=>-"),
        );
        Ok(bar)
    }

    /// Replays every tick and returns how many were processed.
    fn main_loop(&mut self) -> Result<usize, BacktestError> {
        let progress = self.progress_bar()?;
        let mut processed = 0;

        while self.source.has_more_data() {
            let Some(data_point) = self.source.next_data_point()? else { break };
            self.process_data_point(&data_point);
            processed += 1;
            progress.inc(1);
        }

        progress.finish_with_message("Simulation complete.");
        tracing::info!(run_id = %self.run_id, data_points = processed, trades = self.trades.len(), "Main loop finished");
        Ok(processed)
    }

    fn process_data_point(&mut self, data_point: &DataPoint) {
        self.indicators.update(data_point);

        let orders = {
            let ctx = StrategyContext::new(&self.portfolio, &self.indicators).at(data_point.timestamp);
            match self.strategy.on_data_point(&ctx, data_point) {
                Ok(orders) => orders,
                Err(e) => {
                    tracing::warn!(timestamp = %data_point.timestamp, error = %e, "Strategy failed on data point; skipping tick");
                    Vec::new()
                }
            }
        };

        self.record(|| EngineEvent::DataPointProcessed {
            timestamp: data_point.timestamp,
            symbols: data_point.symbols().map(str::to_string).collect(),
            orders: orders.len(),
        });

        for order in &orders {
            let Some(bar) = data_point.bar(&order.symbol) else {
                self.reject(order, data_point.timestamp, "no bar for symbol in current data point".to_string());
                continue;
            };
            if let Err(reason) = self.submit(order, bar) {
                self.reject(order, data_point.timestamp, reason);
            }
        }

        self.portfolio.update_market_values(data_point.bars.values());
        self.push_equity(data_point.timestamp);
        self.last_timestamp = Some(data_point.timestamp);
    }

    /// Prices, checks, fills and books one strategy order.
    fn submit(&mut self, order: &Order, bar: &Bar) -> Result<(), String> {
        let price = self.executor.execution_price(order, bar).map_err(|e| e.to_string())?;
        self.portfolio.check_affordable(order, price).map_err(|e| e.to_string())?;
        let trade = self.executor.execute(order, bar).map_err(|e| e.to_string())?;
        // Noisy slippage can fill above the previewed price.
        if trade.price != price {
            self.portfolio
                .check_affordable(order, trade.price)
                .map_err(|e| format!("fill at {} no longer affordable: {e}", trade.price))?;
        }
        self.book(trade, bar.close).map_err(|e| e.to_string())
    }

    /// Applies a fill to the ledger, tells the strategy and logs it.
    fn book(&mut self, trade: Trade, mark_price: Decimal) -> Result<(), BacktestError> {
        self.portfolio.execute_trade(&trade, mark_price)?;

        let ctx = StrategyContext::new(&self.portfolio, &self.indicators).at(trade.timestamp);
        if let Err(e) = self.strategy.on_trade(&ctx, &trade) {
            tracing::warn!(trade_id = trade.trade_id, error = %e, "Strategy failed to handle trade");
        }

        self.record(|| EngineEvent::TradeExecuted(trade.clone()));
        self.trades.push(trade);
        Ok(())
    }

    fn reject(&mut self, order: &Order, timestamp: DateTime<Utc>, reason: String) {
        tracing::warn!(
            symbol = %order.symbol,
            side = %order.side,
            order_type = %order.order_type,
            quantity = %order.quantity,
            %reason,
            "Order skipped"
        );
        self.record(|| EngineEvent::OrderRejected {
            timestamp,
            order: order.clone(),
            reason,
        });
    }

    /// Closes every open position at its last mark price.
    fn liquidate(&mut self) {
        let Some(timestamp) = self.last_timestamp else { return };
        let open: Vec<(String, Decimal, Decimal)> = self
            .portfolio
            .positions()
            .into_iter()
            .map(|p| (p.symbol.clone(), p.quantity, p.market_price))
            .collect();
        if open.is_empty() {
            return;
        }

        tracing::info!(open_positions = open.len(), "Liquidating open positions");
        self.record(|| EngineEvent::LiquidationStarted {
            timestamp,
            open_positions: open.len(),
        });

        for (symbol, quantity, price) in open {
            let side = if quantity > Decimal::ZERO { OrderSide::Sell } else { OrderSide::Buy };
            let order = Order::market(&symbol, side, quantity.abs())
                .with_strategy(LIQUIDATION_TAG)
                .with_reason("end_of_backtest");
            let bar = Bar::synthetic(&symbol, timestamp, price);

            let outcome = match self.executor.execute(&order, &bar) {
                Ok(trade) => self.book(trade, price).map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            if let Err(reason) = outcome {
                tracing::error!(%symbol, %reason, "Failed to liquidate position");
                self.reject(&order, timestamp, reason);
            }
        }

        self.portfolio.update_market_values(std::iter::empty::<&Bar>());
        self.push_equity(timestamp);
    }

    fn push_equity(&mut self, timestamp: DateTime<Utc>) {
        let point = EquityPoint {
            timestamp,
            value: self.portfolio.total_value(),
        };
        self.equity_curve.push(point);
        self.record(|| EngineEvent::EquityRecorded(point));
    }

    fn record(&mut self, event: impl FnOnce() -> EngineEvent) {
        if self.params.record_events {
            self.events.push(event());
        }
    }

    fn finalize(&mut self) -> Result<BacktestResults, BacktestError> {
        let initial_capital = self.portfolio.initial_capital();
        let final_capital = self.portfolio.total_value();
        let total_pnl = final_capital - initial_capital;
        let total_return_pct = if initial_capital > Decimal::ZERO {
            total_pnl / initial_capital * Decimal::ONE_HUNDRED
        } else {
            Decimal::ZERO
        };

        let round_trips = TradeMatcher::match_trades(&self.trades)?;
        let metrics = self
            .analytics_engine
            .analyze(&round_trips, &self.equity_curve, initial_capital)?;

        let start = self.equity_curve.first().map(|p| p.timestamp);
        let end = self.equity_curve.last().map(|p| p.timestamp);
        let final_snapshot = end.map(|ts| self.portfolio.snapshot(ts));

        tracing::info!(
            run_id = %self.run_id,
            %final_capital,
            %total_return_pct,
            trades = self.trades.len(),
            round_trips = round_trips.len(),
            "Backtest finalized"
        );

        Ok(BacktestResults {
            run_id: self.run_id,
            strategy: self.strategy.name().to_string(),
            parameters: self.strategy.parameters().clone(),
            start,
            end,
            initial_capital,
            final_capital,
            final_cash: self.portfolio.cash(),
            total_return_pct,
            total_pnl,
            max_drawdown: self.portfolio.max_drawdown(),
            trades: std::mem::take(&mut self.trades),
            equity_curve: std::mem::take(&mut self.equity_curve),
            round_trips,
            final_snapshot,
            metrics,
            events: std::mem::take(&mut self.events),
        })
    }
}
