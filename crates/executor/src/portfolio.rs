use crate::error::ExecutorError;
use crate::fees::FeeSchedule;
use chrono::{DateTime, Utc};
use core_types::{Bar, Order, OrderSide, Position, PortfolioView, Trade};
use events::PortfolioSnapshot;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Manages the state of a trading account, including cash, positions, and equity.
///
/// Positions are tracked as a single aggregate per symbol with a
/// weighted-average cost basis. Lot-level attribution is left to the
/// analytics crate, which replays the same trade log.
#[derive(Debug, Clone)]
pub struct Portfolio {
    initial_capital: Decimal,
    cash: Decimal,
    positions: BTreeMap<String, Position>,
    trades: Vec<Trade>,
    total_value: Decimal,
    realized_pnl: Decimal,
    peak_value: Decimal,
    current_drawdown: Decimal,
    max_drawdown: Decimal,
    fees: FeeSchedule,
}

impl Portfolio {
    /// Creates a new `Portfolio` with a given amount of starting capital.
    pub fn new(initial_capital: Decimal, fees: FeeSchedule) -> Self {
        Self {
            initial_capital,
            cash: initial_capital,
            positions: BTreeMap::new(),
            trades: Vec::new(),
            total_value: initial_capital,
            realized_pnl: Decimal::ZERO,
            peak_value: initial_capital,
            current_drawdown: Decimal::ZERO,
            max_drawdown: Decimal::ZERO,
            fees,
        }
    }

    /// Applies a trade to cash and positions, then re-marks the traded
    /// position at `mark_price`.
    ///
    /// Buys debit notional plus fees and sells credit notional minus fees.
    /// A trade that crosses through zero closes the old leg and opens a new
    /// one at the fill price.
    pub fn execute_trade(&mut self, trade: &Trade, mark_price: Decimal) -> Result<(), ExecutorError> {
        if trade.quantity <= Decimal::ZERO {
            return Err(ExecutorError::InvalidTrade(format!(
                "trade {} has non-positive quantity {}",
                trade.trade_id, trade.quantity
            )));
        }
        if trade.price <= Decimal::ZERO {
            return Err(ExecutorError::InvalidTrade(format!(
                "trade {} has non-positive price {}",
                trade.trade_id, trade.price
            )));
        }

        let notional = trade.notional();
        let fees = trade.total_fees();
        match trade.side {
            OrderSide::Buy => self.cash -= notional + fees,
            OrderSide::Sell => self.cash += notional - fees,
        }

        let position = self
            .positions
            .entry(trade.symbol.clone())
            .or_insert_with(|| Position::flat(&trade.symbol, trade.timestamp));
        let realized = apply_fill(position, trade.side, trade.quantity, trade.price);
        position.realized_pnl += realized;
        position.last_updated = trade.timestamp;
        position.mark(mark_price);
        self.realized_pnl += realized;

        if position.quantity.is_zero() {
            self.positions.remove(&trade.symbol);
        }

        self.trades.push(trade.clone());
        self.total_value = self.compute_total_value();

        tracing::debug!(
            symbol = %trade.symbol,
            side = %trade.side,
            quantity = %trade.quantity,
            price = %trade.price,
            realized = %realized,
            cash = %self.cash,
            "Trade applied to ledger"
        );
        Ok(())
    }

    /// Re-marks every position that has a bar in `bars`, then refreshes total
    /// value, peak value and drawdown.
    pub fn update_market_values<'a>(&mut self, bars: impl IntoIterator<Item = &'a Bar>) {
        for bar in bars {
            if let Some(position) = self.positions.get_mut(&bar.symbol) {
                position.mark(bar.close);
                position.last_updated = bar.timestamp;
            }
        }

        self.total_value = self.compute_total_value();
        if self.total_value > self.peak_value {
            self.peak_value = self.total_value;
        }
        self.current_drawdown = if self.peak_value > Decimal::ZERO {
            (self.peak_value - self.total_value) / self.peak_value
        } else {
            Decimal::ZERO
        };
        self.max_drawdown = self.max_drawdown.max(self.current_drawdown);
    }

    /// Checks whether `order` could be paid for at `price`.
    ///
    /// A buy needs cash for notional plus estimated fees. A sell needs a long
    /// holding of at least the order quantity; new shorts are never
    /// pre-authorised here.
    pub fn check_affordable(&self, order: &Order, price: Decimal) -> Result<(), ExecutorError> {
        match order.side {
            OrderSide::Buy => {
                let required = order.quantity * price
                    + self.fees.calculate(OrderSide::Buy, order.quantity, price).total();
                if required > self.cash {
                    return Err(ExecutorError::InsufficientCash {
                        required,
                        available: self.cash,
                    });
                }
                Ok(())
            }
            OrderSide::Sell => {
                let held = self.quantity(&order.symbol);
                if held <= Decimal::ZERO {
                    return Err(ExecutorError::PositionNotFound(order.symbol.clone()));
                }
                if held < order.quantity {
                    return Err(ExecutorError::InvalidTrade(format!(
                        "cannot sell {} {}, only {} held",
                        order.quantity, order.symbol, held
                    )));
                }
                Ok(())
            }
        }
    }

    pub fn can_afford(&self, order: &Order, price: Decimal) -> bool {
        self.check_affordable(order, price).is_ok()
    }

    pub fn initial_capital(&self) -> Decimal {
        self.initial_capital
    }

    /// Realized P&L summed over every trade, including closed positions.
    pub fn realized_pnl(&self) -> Decimal {
        self.realized_pnl
    }

    pub fn peak_value(&self) -> Decimal {
        self.peak_value
    }

    pub fn current_drawdown(&self) -> Decimal {
        self.current_drawdown
    }

    pub fn max_drawdown(&self) -> Decimal {
        self.max_drawdown
    }

    /// The cumulative trade log, in application order.
    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn snapshot(&self, timestamp: DateTime<Utc>) -> PortfolioSnapshot {
        PortfolioSnapshot {
            timestamp,
            cash: self.cash,
            total_value: self.total_value,
            positions: self.positions.values().cloned().collect(),
            trade_count: self.trades.len(),
            peak_value: self.peak_value,
            current_drawdown: self.current_drawdown,
            max_drawdown: self.max_drawdown,
        }
    }

    fn compute_total_value(&self) -> Decimal {
        self.cash + self.positions.values().map(|p| p.market_value).sum::<Decimal>()
    }
}

impl PortfolioView for Portfolio {
    fn cash(&self) -> Decimal {
        self.cash
    }

    fn total_value(&self) -> Decimal {
        self.total_value
    }

    fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    fn positions(&self) -> Vec<&Position> {
        self.positions.values().collect()
    }
}

/// Updates quantity and basis for one fill and returns the realized P&L.
fn apply_fill(position: &mut Position, side: OrderSide, quantity: Decimal, price: Decimal) -> Decimal {
    let held = position.quantity;
    let (extends, direction) = match side {
        OrderSide::Buy => (held >= Decimal::ZERO, Decimal::ONE),
        OrderSide::Sell => (held <= Decimal::ZERO, Decimal::NEGATIVE_ONE),
    };

    if extends {
        let size = held.abs();
        let new_size = size + quantity;
        position.avg_price = (position.avg_price * size + price * quantity) / new_size;
        position.quantity = direction * new_size;
        return Decimal::ZERO;
    }

    let closed = quantity.min(held.abs());
    // Long closed by a sell gains when price rose; short covered by a buy
    // gains when price fell.
    let realized = match side {
        OrderSide::Sell => (price - position.avg_price) * closed,
        OrderSide::Buy => (position.avg_price - price) * closed,
    };
    position.quantity += direction * closed;

    let leftover = quantity - closed;
    if leftover > Decimal::ZERO {
        position.quantity = direction * leftover;
        position.avg_price = price;
    }
    realized
}
