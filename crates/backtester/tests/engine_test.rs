use backtester::{
    BacktestError, Backtester, CsvDataProvider, EngineState, HistoricalFeed, InMemoryProvider,
    LIQUIDATION_TAG,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use configuration::{Backtest, BuyAndHoldParams, CommissionConfig, CommissionModel, Simulation, SlippageMode};
use core_types::{Bar, DataPoint, Order, OrderSide, PortfolioView, StrategyId};
use events::EngineEvent;
use executor::{FeeSchedule, Portfolio, SimulatedExecutor};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;
use strategies::{BaseStrategy, BuyAndHold, Strategy, StrategyContext, StrategyError};

fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(n)
}

fn bars(symbol: &str, closes: &[Decimal]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, c)| Bar::synthetic(symbol, day(i as i64), *c))
        .collect()
}

fn frictionless() -> Simulation {
    Simulation {
        slippage: Decimal::ZERO,
        max_slippage: Decimal::ZERO,
        ..Simulation::default()
    }
}

fn ranged(n: i64, open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Bar {
    Bar {
        symbol: "AAPL".to_string(),
        timestamp: day(n),
        open,
        high,
        low,
        close,
        volume: dec!(1000),
        timeframe: "1d".to_string(),
    }
}

fn fee_free(slippage: Decimal, max_slippage: Decimal, mode: SlippageMode, seed: Option<u64>) -> Simulation {
    Simulation {
        commission: CommissionConfig {
            model: CommissionModel::Percentage,
            rate: Decimal::ZERO,
        },
        slippage,
        max_slippage,
        slippage_mode: mode,
        seed,
        regulatory_fee_rate: Decimal::ZERO,
        activity_fee_per_share: Decimal::ZERO,
        activity_fee_cap: Decimal::ZERO,
    }
}

fn rejections(events: &[EngineEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, EngineEvent::OrderRejected { .. }))
        .count()
}

fn engine(strategy: Box<dyn Strategy>, provider: InMemoryProvider, sim: &Simulation, record_events: bool) -> Backtester {
    let params = Backtest {
        symbols: vec!["AAPL".to_string()],
        initial_capital: dec!(10000),
        record_events,
        ..Backtest::default()
    };
    let feed = HistoricalFeed::from_config(Box::new(provider), &params);
    let portfolio = Portfolio::new(params.initial_capital, FeeSchedule::new(sim));
    Backtester::new(
        params,
        strategy,
        Box::new(feed),
        Box::new(SimulatedExecutor::new(sim)),
        portfolio,
    )
}

/// Emits a fixed list of orders on a chosen tick and can be told to fail.
struct Scripted {
    base: BaseStrategy,
    tick: usize,
    script: Vec<(usize, Order)>,
    fail_on: Option<usize>,
    fail_initialize: bool,
    trades_seen: usize,
}

impl Scripted {
    fn new(script: Vec<(usize, Order)>) -> Self {
        Self {
            base: BaseStrategy::new("scripted", Value::Null),
            tick: 0,
            script,
            fail_on: None,
            fail_initialize: false,
            trades_seen: 0,
        }
    }
}

impl Strategy for Scripted {
    fn base(&self) -> &BaseStrategy {
        &self.base
    }

    fn initialize(&mut self, _ctx: &StrategyContext<'_>) -> Result<(), StrategyError> {
        if self.fail_initialize {
            return Err(StrategyError::InvalidParameters("refusing to start".to_string()));
        }
        Ok(())
    }

    fn on_data_point(&mut self, _ctx: &StrategyContext<'_>, _dp: &DataPoint) -> Result<Vec<Order>, StrategyError> {
        let tick = self.tick;
        self.tick += 1;
        if self.fail_on == Some(tick) {
            return Err(StrategyError::IndicatorError("boom".to_string()));
        }
        Ok(self
            .script
            .iter()
            .filter(|(t, _)| *t == tick)
            .map(|(_, o)| o.clone().with_strategy("scripted"))
            .collect())
    }

    fn on_trade(&mut self, _ctx: &StrategyContext<'_>, _trade: &core_types::Trade) -> Result<(), StrategyError> {
        self.trades_seen += 1;
        Ok(())
    }
}

#[test]
fn buy_and_hold_scenario_buys_once_and_liquidates_at_the_last_close() {
    let sim = frictionless();
    let provider = InMemoryProvider::new().with_bars(bars("AAPL", &[dec!(100), dec!(102), dec!(105)]));
    let strategy = BuyAndHold::new(BuyAndHoldParams::default(), &["AAPL".to_string()]).unwrap();
    let mut bt = engine(Box::new(strategy), provider, &sim, false);

    let results = bt.run().unwrap().clone();
    assert_eq!(bt.state(), EngineState::Finalized);

    assert_eq!(results.trades.len(), 2);
    let buy = &results.trades[0];
    assert_eq!(buy.side, OrderSide::Buy);
    assert_eq!(buy.quantity, dec!(95));
    assert_eq!(buy.price, dec!(100));

    let sell = &results.trades[1];
    assert_eq!(sell.side, OrderSide::Sell);
    assert_eq!(sell.quantity, dec!(95));
    assert_eq!(sell.price, dec!(105));
    assert_eq!(sell.strategy, LIQUIDATION_TAG);

    // Cash after the buy is capital less notional and fees.
    let after_buy = dec!(10000) - dec!(9500) - buy.total_fees();
    let expected_final = after_buy + dec!(9975) - sell.total_fees();
    assert_eq!(results.final_cash, expected_final);
    assert_eq!(results.final_capital, expected_final);

    // One point per tick plus the post-liquidation point.
    assert_eq!(results.equity_curve.len(), 4);
    assert_eq!(results.equity_curve.last().unwrap().value, expected_final);
    assert!(bt.portfolio().positions().is_empty());

    assert_eq!(results.round_trips.len(), 1);
    assert_eq!(results.metrics.total_trades, 1);
    assert_eq!(results.metrics.winning_trades, 1);
    assert_eq!(results.start, Some(day(0)));
    assert_eq!(results.end, Some(day(2)));
}

#[test]
fn liquidation_trade_reflects_cash_credit() {
    let sim = frictionless();
    let provider = InMemoryProvider::new().with_bars(bars("AAPL", &[dec!(50), dec!(40)]));
    let script = vec![(0, Order::market("AAPL", OrderSide::Buy, dec!(10)))];
    let mut bt = engine(Box::new(Scripted::new(script)), provider, &sim, true);

    let results = bt.run().unwrap();
    let liquidations: Vec<_> = results.trades.iter().filter(|t| t.strategy == LIQUIDATION_TAG).collect();
    assert_eq!(liquidations.len(), 1);
    assert_eq!(liquidations[0].side, OrderSide::Sell);
    assert_eq!(liquidations[0].quantity, dec!(10));
    assert_eq!(liquidations[0].price, dec!(40));

    assert!(
        results
            .events
            .iter()
            .any(|e| matches!(e, EngineEvent::LiquidationStarted { open_positions: 1, .. }))
    );
    assert!(results.metrics.largest_loss < Decimal::ZERO);
}

#[test]
fn strategy_errors_skip_only_their_tick() {
    let sim = frictionless();
    let provider = InMemoryProvider::new().with_bars(bars("AAPL", &[dec!(10), dec!(11), dec!(12)]));
    let script = vec![
        (0, Order::market("AAPL", OrderSide::Buy, dec!(1))),
        (1, Order::market("AAPL", OrderSide::Buy, dec!(1))),
        (2, Order::market("AAPL", OrderSide::Buy, dec!(1))),
    ];
    let mut strategy = Scripted::new(script);
    strategy.fail_on = Some(1);
    let mut bt = engine(Box::new(strategy), provider, &sim, false);

    let results = bt.run().unwrap();
    let strategy_buys = results.trades.iter().filter(|t| t.strategy == "scripted").count();
    assert_eq!(strategy_buys, 2);
    assert_eq!(results.equity_curve.len(), 4);
}

#[test]
fn unfillable_and_unaffordable_orders_are_skipped() {
    let sim = frictionless();
    let provider = InMemoryProvider::new().with_bars(bars("AAPL", &[dec!(100), dec!(100)]));
    let script = vec![
        // Limit far below the bar never fills.
        (0, Order::limit("AAPL", OrderSide::Buy, dec!(1), dec!(50))),
        // More than the whole account.
        (0, Order::market("AAPL", OrderSide::Buy, dec!(1000))),
        // Selling what is not held.
        (0, Order::market("AAPL", OrderSide::Sell, dec!(1))),
        (0, Order::market("AAPL", OrderSide::Buy, dec!(2))),
    ];
    let mut bt = engine(Box::new(Scripted::new(script)), provider, &sim, true);

    let results = bt.run().unwrap();
    assert_eq!(rejections(&results.events), 3);
    assert_eq!(results.trades[0].quantity, dec!(2));
    assert_eq!(results.trades.len(), 2);
}

#[test]
fn failed_initialization_is_fatal() {
    let sim = frictionless();
    let provider = InMemoryProvider::new().with_bars(bars("AAPL", &[dec!(100)]));
    let mut strategy = Scripted::new(Vec::new());
    strategy.fail_initialize = true;
    let mut bt = engine(Box::new(strategy), provider, &sim, false);

    assert!(matches!(bt.run(), Err(BacktestError::StrategyInitialization(_))));
    assert_eq!(bt.state(), EngineState::Aborted);
    assert!(bt.results().is_none());
    assert!(matches!(bt.run(), Err(BacktestError::InvalidState(EngineState::Aborted))));
}

#[test]
fn empty_data_is_fatal() {
    let sim = frictionless();
    let params = Backtest {
        symbols: vec!["AAPL".to_string()],
        start_date: chrono::NaiveDate::from_ymd_opt(2030, 1, 1),
        ..Backtest::default()
    };
    let provider = InMemoryProvider::new().with_bars(bars("AAPL", &[dec!(100)]));
    let feed = HistoricalFeed::from_config(Box::new(provider), &params);
    let portfolio = Portfolio::new(params.initial_capital, FeeSchedule::new(&sim));
    let mut bt = Backtester::new(
        params,
        Box::new(Scripted::new(Vec::new())),
        Box::new(feed),
        Box::new(SimulatedExecutor::new(&sim)),
        portfolio,
    );

    assert!(matches!(bt.run(), Err(BacktestError::NoData)));
    assert!(bt.results().is_none());
}

#[test]
fn missing_symbol_file_is_a_data_source_error() {
    let dir = tempfile::tempdir().unwrap();
    let sim = frictionless();
    let params = Backtest {
        symbols: vec!["AAPL".to_string()],
        data_dir: dir.path().to_path_buf(),
        ..Backtest::default()
    };
    let feed = HistoricalFeed::from_config(Box::new(CsvDataProvider::new(&params.data_dir)), &params);
    let strategy = strategies::create_strategy(StrategyId::BuyAndHold, &configuration::Config::default(), &params.symbols).unwrap();
    let portfolio = Portfolio::new(params.initial_capital, FeeSchedule::new(&sim));
    let mut bt = Backtester::new(params, strategy, Box::new(feed), Box::new(SimulatedExecutor::new(&sim)), portfolio);

    assert!(matches!(bt.run(), Err(BacktestError::DataSource(_))));
}

#[test]
fn csv_backed_run_with_default_frictions() {
    let dir = tempfile::tempdir().unwrap();
    let mut csv = String::from("timestamp,open,high,low,close,volume\n");
    for (i, close) in [100, 101, 99, 103, 104].iter().enumerate() {
        csv.push_str(&format!("2024-01-0{},{close},{close},{close},{close},1000\n", i + 1));
    }
    std::fs::write(dir.path().join("AAPL.csv"), csv).unwrap();

    let config = configuration::Config::default();
    let params = Backtest {
        data_dir: dir.path().to_path_buf(),
        ..config.backtest.clone()
    };
    let feed = HistoricalFeed::from_config(Box::new(CsvDataProvider::new(&params.data_dir)), &params);
    let strategy = strategies::create_strategy(StrategyId::BuyAndHold, &config, &params.symbols).unwrap();
    let portfolio = Portfolio::new(params.initial_capital, FeeSchedule::new(&config.simulation));
    let mut bt = Backtester::new(
        params,
        strategy,
        Box::new(feed),
        Box::new(SimulatedExecutor::new(&config.simulation)),
        portfolio,
    );

    let results = bt.run().unwrap();
    assert_eq!(results.trades.len(), 2);
    // Deterministic slippage: buys pay above the close, sells receive below it.
    assert!(results.trades[0].price > dec!(100));
    assert!(results.trades[1].price < dec!(104));
    assert!(results.trades.iter().all(|t| t.slippage > Decimal::ZERO));
    assert!(results.summary().contains("buy_and_hold"));
}

#[test]
fn limit_and_stop_orders_fill_at_their_trigger_prices() {
    let sim = fee_free(dec!(0.01), Decimal::ZERO, SlippageMode::Deterministic, None);
    let provider = InMemoryProvider::new().with_bars(vec![
        ranged(0, dec!(100), dec!(110), dec!(90), dec!(105)),
        ranged(1, dec!(95), dec!(100), dec!(80), dec!(90)),
    ]);
    let script = vec![
        (0, Order::limit("AAPL", OrderSide::Buy, dec!(10), dec!(95))),
        (0, Order::stop("AAPL", OrderSide::Buy, dec!(5), dec!(108))),
        (1, Order::stop("AAPL", OrderSide::Sell, dec!(15), dec!(85))),
    ];
    let mut bt = engine(Box::new(Scripted::new(script)), provider, &sim, true);

    let results = bt.run().unwrap().clone();
    assert_eq!(rejections(&results.events), 0);
    let prices: Vec<Decimal> = results.trades.iter().map(|t| t.price).collect();
    // Limit at the limit; stops at stop * (1 +/- slippage).
    assert_eq!(prices, vec![dec!(95), dec!(109.08), dec!(84.15)]);
    assert_eq!(results.trades[0].slippage, Decimal::ZERO);
    assert_eq!(results.trades[1].slippage, dec!(20.40));
    assert_eq!(results.trades[2].slippage, dec!(87.75));

    // 10000 - 950 - 545.40 + 1262.25
    assert_eq!(results.final_cash, dec!(9766.85));
    let equity: Vec<Decimal> = results.equity_curve.iter().map(|p| p.value).collect();
    assert_eq!(equity, vec![dec!(10079.60), dec!(9766.85)]);
    assert!(bt.portfolio().positions().is_empty());
    assert_eq!(results.round_trips.len(), 2);
}

#[test]
fn noisy_fill_beyond_available_cash_is_rejected() {
    let sim = fee_free(Decimal::ZERO, dec!(0.05), SlippageMode::Noisy, Some(1));
    let provider = InMemoryProvider::new().with_bars(bars("AAPL", &[dec!(100), dec!(100)]));
    // Previews at exactly the whole account; any noise pushes it over.
    let script = vec![(0, Order::market("AAPL", OrderSide::Buy, dec!(100)))];
    let mut bt = engine(Box::new(Scripted::new(script)), provider, &sim, true);

    let results = bt.run().unwrap();
    assert!(results.trades.is_empty());
    assert_eq!(rejections(&results.events), 1);
    assert_eq!(results.final_cash, dec!(10000));
    assert!(results.equity_curve.iter().all(|p| p.value == dec!(10000)));
}

#[test]
fn noisy_fills_stay_within_bounds_and_cash_stays_positive() {
    let sim = fee_free(Decimal::ZERO, dec!(0.05), SlippageMode::Noisy, Some(7));
    let provider = InMemoryProvider::new().with_bars(bars("AAPL", &[dec!(100), dec!(100), dec!(100)]));
    let script = vec![
        (0, Order::market("AAPL", OrderSide::Buy, dec!(50))),
        (1, Order::market("AAPL", OrderSide::Buy, dec!(40))),
    ];
    let mut bt = engine(Box::new(Scripted::new(script)), provider, &sim, false);

    let results = bt.run().unwrap();
    for trade in &results.trades {
        match trade.side {
            OrderSide::Buy => assert!(trade.price >= dec!(100) && trade.price < dec!(105)),
            OrderSide::Sell => assert!(trade.price <= dec!(100) && trade.price > dec!(95)),
        }
    }
    assert!(results.final_cash >= Decimal::ZERO);
    assert!(bt.portfolio().positions().is_empty());
}

#[test]
fn seeded_noisy_runs_are_reproducible() {
    let run = || {
        let sim = fee_free(dec!(0.001), dec!(0.01), SlippageMode::Noisy, Some(42));
        let provider = InMemoryProvider::new().with_bars(bars("AAPL", &[dec!(100), dec!(101), dec!(99)]));
        let script = vec![
            (0, Order::market("AAPL", OrderSide::Buy, dec!(10))),
            (1, Order::market("AAPL", OrderSide::Buy, dec!(5))),
        ];
        let mut bt = engine(Box::new(Scripted::new(script)), provider, &sim, false);
        bt.run().unwrap().trades.iter().map(|t| t.price).collect::<Vec<_>>()
    };

    let first = run();
    assert_eq!(first.len(), 3);
    assert_eq!(first, run());
}
