use crate::enums::{OrderSide, OrderType};
use crate::error::CoreError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One OHLCV observation for a symbol over a timeframe. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub timeframe: String,
}

impl Bar {
    /// A flat, zero-volume bar pinned at a single price.
    ///
    /// Used to execute orders when no real market bar exists, such as the
    /// closing orders synthesized at the end of a run.
    pub fn synthetic(symbol: &str, timestamp: DateTime<Utc>, price: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            timestamp,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: Decimal::ZERO,
            timeframe: "synthetic".to_string(),
        }
    }
}

/// One simulation tick: every tracked symbol's bar sharing a timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub timestamp: DateTime<Utc>,
    pub bars: BTreeMap<String, Bar>,
}

impl DataPoint {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            bars: BTreeMap::new(),
        }
    }

    /// Builds a data point from a set of bars, keyed by each bar's symbol.
    pub fn from_bars(timestamp: DateTime<Utc>, bars: impl IntoIterator<Item = Bar>) -> Self {
        Self {
            timestamp,
            bars: bars.into_iter().map(|b| (b.symbol.clone(), b)).collect(),
        }
    }

    pub fn bar(&self, symbol: &str) -> Option<&Bar> {
        self.bars.get(symbol)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.bars.keys().map(String::as_str)
    }
}

/// A request to trade, produced by a strategy and consumed by an executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Decimal,
    /// Required for `OrderType::Limit`.
    pub limit_price: Option<Decimal>,
    /// Required for `OrderType::Stop`.
    pub stop_price: Option<Decimal>,
    pub strategy: String,
    pub reason: String,
}

impl Order {
    pub fn market(symbol: &str, side: OrderSide, quantity: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Market,
            quantity,
            limit_price: None,
            stop_price: None,
            strategy: String::new(),
            reason: String::new(),
        }
    }

    pub fn limit(symbol: &str, side: OrderSide, quantity: Decimal, price: Decimal) -> Self {
        Self {
            order_type: OrderType::Limit,
            limit_price: Some(price),
            ..Self::market(symbol, side, quantity)
        }
    }

    pub fn stop(symbol: &str, side: OrderSide, quantity: Decimal, price: Decimal) -> Self {
        Self {
            order_type: OrderType::Stop,
            stop_price: Some(price),
            ..Self::market(symbol, side, quantity)
        }
    }

    pub fn with_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = strategy.into();
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Checks the structural rules every order must satisfy before execution.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.quantity <= Decimal::ZERO {
            return Err(CoreError::InvalidInput(
                "quantity".to_string(),
                format!("order quantity must be positive, got {}", self.quantity),
            ));
        }
        match self.order_type {
            OrderType::Market => Ok(()),
            OrderType::Limit => match self.limit_price {
                Some(p) if p > Decimal::ZERO => Ok(()),
                _ => Err(CoreError::InvalidInput(
                    "limit_price".to_string(),
                    "limit orders require a positive limit price".to_string(),
                )),
            },
            OrderType::Stop => match self.stop_price {
                Some(p) if p > Decimal::ZERO => Ok(()),
                _ => Err(CoreError::InvalidInput(
                    "stop_price".to_string(),
                    "stop orders require a positive stop price".to_string(),
                )),
            },
        }
    }
}

/// The receipt of a successfully executed order. Append-only once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: u64,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
    pub commission: Decimal,
    /// Transaction fee levied on sells only.
    pub regulatory_fee: Decimal,
    /// Per-share activity fee, capped.
    pub activity_fee: Decimal,
    /// `|fill - reference| * quantity`, for reporting. Already embedded in `price`.
    pub slippage: Decimal,
    pub strategy: String,
    pub reason: String,
}

impl Trade {
    pub fn notional(&self) -> Decimal {
        self.price * self.quantity
    }

    /// Commission plus regulatory and activity fees. Slippage is excluded
    /// because it is already part of the fill price.
    pub fn total_fees(&self) -> Decimal {
        self.commission + self.regulatory_fee + self.activity_fee
    }

    /// Positive for buys, negative for sells.
    pub fn signed_quantity(&self) -> Decimal {
        match self.side {
            OrderSide::Buy => self.quantity,
            OrderSide::Sell => -self.quantity,
        }
    }
}

/// The aggregate holding in one symbol.
///
/// `quantity` is signed: positive is long, negative is short. `avg_price` is
/// only meaningful while `quantity` is non-zero; a flat position is never kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: Decimal,
    pub avg_price: Decimal,
    /// Last price the position was marked at.
    pub market_price: Decimal,
    /// `quantity * market_price`; negative for shorts.
    pub market_value: Decimal,
    pub unrealized_pnl: Decimal,
    pub realized_pnl: Decimal,
    pub last_updated: DateTime<Utc>,
}

impl Position {
    pub fn flat(symbol: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.to_string(),
            quantity: Decimal::ZERO,
            avg_price: Decimal::ZERO,
            market_price: Decimal::ZERO,
            market_value: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            last_updated: timestamp,
        }
    }

    pub fn is_long(&self) -> bool {
        self.quantity > Decimal::ZERO
    }

    pub fn is_short(&self) -> bool {
        self.quantity < Decimal::ZERO
    }

    /// Re-marks the position at `price`, refreshing value and unrealized P&L.
    pub fn mark(&mut self, price: Decimal) {
        self.market_price = price;
        self.market_value = self.quantity * price;
        self.unrealized_pnl = if self.is_long() {
            (price - self.avg_price) * self.quantity
        } else if self.is_short() {
            (self.avg_price - price) * self.quantity.abs()
        } else {
            Decimal::ZERO
        };
    }
}

/// Total portfolio value at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub value: Decimal,
}
