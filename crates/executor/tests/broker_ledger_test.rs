use chrono::{TimeZone, Utc};
use configuration::Simulation;
use core_types::{Bar, Order, OrderSide, PortfolioView};
use executor::{Executor, ExecutorError, FeeSchedule, Portfolio, SimulatedExecutor};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn bar(day: u32, close: Decimal) -> Bar {
    Bar::synthetic("AAPL", Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(), close)
}

fn assert_conserved(p: &Portfolio) {
    let marked: Decimal = p.positions().iter().map(|pos| pos.market_value).sum();
    assert_eq!(p.cash() + marked, p.total_value());
}

#[test]
fn round_trip_through_broker_and_ledger_with_default_frictions() {
    let sim = Simulation::default();
    let mut broker = SimulatedExecutor::new(&sim);
    let mut ledger = Portfolio::new(dec!(10000), FeeSchedule::new(&sim));

    let entry = bar(2, dec!(100));
    let buy = Order::market("AAPL", OrderSide::Buy, dec!(10));
    let price = broker.execution_price(&buy, &entry).unwrap();
    ledger.check_affordable(&buy, price).unwrap();

    let fill = broker.execute(&buy, &entry).unwrap();
    assert_eq!(fill.price, dec!(100.1));
    assert_eq!(fill.regulatory_fee, Decimal::ZERO);
    ledger.execute_trade(&fill, entry.close).unwrap();

    assert_eq!(ledger.cash(), dec!(10000) - dec!(1001) - fill.total_fees());
    assert_eq!(ledger.quantity("AAPL"), dec!(10));
    assert_conserved(&ledger);

    let exit = bar(3, dec!(110));
    ledger.update_market_values([&exit]);
    assert_conserved(&ledger);

    let sell = Order::market("AAPL", OrderSide::Sell, dec!(10));
    ledger.check_affordable(&sell, exit.close).unwrap();
    let fill = broker.execute(&sell, &exit).unwrap();
    assert_eq!(fill.price, dec!(109.89));
    assert!(fill.regulatory_fee > Decimal::ZERO);
    ledger.execute_trade(&fill, exit.close).unwrap();

    assert!(ledger.position("AAPL").is_none());
    assert_eq!(ledger.realized_pnl(), dec!(97.9));
    assert_eq!(ledger.total_value(), ledger.cash());
    assert_eq!(ledger.trades().len(), 2);
    assert_eq!(broker.trade_count(), 2);
}

#[test]
fn ledger_refuses_what_the_broker_would_fill() {
    let sim = Simulation::default();
    let broker = SimulatedExecutor::new(&sim);
    let ledger = Portfolio::new(dec!(1000), FeeSchedule::new(&sim));
    let b = bar(2, dec!(100));

    let too_big = Order::market("AAPL", OrderSide::Buy, dec!(10));
    let price = broker.execution_price(&too_big, &b).unwrap();
    assert!(matches!(
        ledger.check_affordable(&too_big, price),
        Err(ExecutorError::InsufficientCash { .. })
    ));

    let naked_sell = Order::market("AAPL", OrderSide::Sell, dec!(1));
    assert!(ledger.check_affordable(&naked_sell, b.close).is_err());
}
