use crate::error::AnalyticsError;
use chrono::{DateTime, Utc};
use core_types::{OrderSide, Trade};
use rust_decimal::Decimal;
use rust_decimal::prelude::Signed;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Unmatched quantity from one fill, waiting to be closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenLot {
    /// Positive for a long lot, negative for a short lot.
    pub quantity: Decimal,
    pub entry_price: Decimal,
    /// Commission still attributed to the unmatched quantity.
    pub entry_commission: Decimal,
    pub entry_time: DateTime<Utc>,
}

/// One realized P&L sample: part or all of an open lot closed by a later fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundTrip {
    pub symbol: String,
    /// Side of the opening fill; `Buy` for a long round trip.
    pub side: OrderSide,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    /// The trade that closed this sample.
    pub exit_trade_id: u64,
    /// Net of the pro-rata entry and exit commission.
    pub pnl: Decimal,
}

impl RoundTrip {
    pub fn is_win(&self) -> bool {
        self.pnl > Decimal::ZERO
    }

    pub fn holding_period(&self) -> chrono::Duration {
        self.exit_time - self.entry_time
    }
}

/// Reconstructs round trips from a trade log by closing the oldest open
/// quantity first.
///
/// Per-symbol lot queues are created on first sight of a symbol. A queue only
/// ever holds lots of one direction: a fill first consumes opposite lots and
/// any remainder opens a new lot in its own direction.
#[derive(Debug, Clone, Default)]
pub struct TradeMatcher {
    lots: BTreeMap<String, VecDeque<OpenLot>>,
}

impl TradeMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Matches a whole trade log in order.
    pub fn match_trades(trades: &[Trade]) -> Result<Vec<RoundTrip>, AnalyticsError> {
        let mut matcher = Self::new();
        let mut round_trips = Vec::new();
        for trade in trades {
            round_trips.extend(matcher.process(trade)?);
        }
        Ok(round_trips)
    }

    /// Feeds one fill through the queues and returns the samples it closed.
    pub fn process(&mut self, trade: &Trade) -> Result<Vec<RoundTrip>, AnalyticsError> {
        if trade.quantity <= Decimal::ZERO {
            return Err(AnalyticsError::InvalidTrade {
                trade_id: trade.trade_id,
                reason: format!("non-positive quantity {}", trade.quantity),
            });
        }

        let direction = match trade.side {
            OrderSide::Buy => Decimal::ONE,
            OrderSide::Sell => Decimal::NEGATIVE_ONE,
        };
        let queue = self.lots.entry(trade.symbol.clone()).or_default();
        let mut remaining = trade.quantity;
        let mut closed = Vec::new();

        while remaining > Decimal::ZERO {
            let Some(lot) = queue.front_mut() else { break };
            // Same direction: nothing to close.
            if lot.quantity.signum() == direction {
                break;
            }

            let lot_size = lot.quantity.abs();
            let matched = remaining.min(lot_size);
            let entry_commission = lot.entry_commission * matched / lot_size;
            let exit_commission = trade.commission * matched / trade.quantity;
            let gross = if lot.quantity > Decimal::ZERO {
                (trade.price - lot.entry_price) * matched
            } else {
                (lot.entry_price - trade.price) * matched
            };

            closed.push(RoundTrip {
                symbol: trade.symbol.clone(),
                side: trade.side.opposite(),
                quantity: matched,
                entry_price: lot.entry_price,
                exit_price: trade.price,
                entry_time: lot.entry_time,
                exit_time: trade.timestamp,
                exit_trade_id: trade.trade_id,
                pnl: gross - entry_commission - exit_commission,
            });

            if matched == lot_size {
                queue.pop_front();
            } else {
                lot.quantity += direction * matched;
                lot.entry_commission -= entry_commission;
            }
            remaining -= matched;
        }

        if remaining > Decimal::ZERO {
            queue.push_back(OpenLot {
                quantity: direction * remaining,
                entry_price: trade.price,
                entry_commission: trade.commission * remaining / trade.quantity,
                entry_time: trade.timestamp,
            });
        }

        tracing::debug!(symbol = %trade.symbol, trade_id = trade.trade_id, samples = closed.len(), "Matched trade");
        Ok(closed)
    }

    /// Open lots for `symbol`, oldest first.
    pub fn open_lots(&self, symbol: &str) -> impl Iterator<Item = &OpenLot> {
        self.lots.get(symbol).into_iter().flatten()
    }

    /// Net open quantity for `symbol`.
    pub fn net_quantity(&self, symbol: &str) -> Decimal {
        self.open_lots(symbol).map(|lot| lot.quantity).sum()
    }
}
