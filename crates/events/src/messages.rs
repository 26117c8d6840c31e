use crate::error::EventsError;
use chrono::{DateTime, Utc};
use core_types::{EquityPoint, Order, Position, Trade};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A complete, point-in-time copy of the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub timestamp: DateTime<Utc>,
    pub cash: Decimal,
    pub total_value: Decimal,
    pub positions: Vec<Position>,
    pub trade_count: usize,
    pub peak_value: Decimal,
    /// Fraction of the peak, `0.25` meaning 25 %.
    pub current_drawdown: Decimal,
    pub max_drawdown: Decimal,
}

impl PortfolioSnapshot {
    /// Realized plus unrealized P&L across all open positions.
    pub fn open_pnl(&self) -> Decimal {
        self.positions
            .iter()
            .map(|p| p.realized_pnl + p.unrealized_pnl)
            .sum()
    }
}

/// One entry in the engine's optional run journal.
///
/// Serialized with an internal `type` tag, e.g.
/// `{"type":"TradeExecuted","payload":{...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum EngineEvent {
    /// A tick was pulled from the data source and handed to the strategy.
    DataPointProcessed {
        timestamp: DateTime<Utc>,
        symbols: Vec<String>,
        orders: usize,
    },
    /// An order was dropped without execution.
    OrderRejected {
        timestamp: DateTime<Utc>,
        order: Order,
        reason: String,
    },
    TradeExecuted(Trade),
    EquityRecorded(EquityPoint),
    /// The data source is exhausted and open positions are being closed.
    LiquidationStarted {
        timestamp: DateTime<Utc>,
        open_positions: usize,
    },
}

impl EngineEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            EngineEvent::DataPointProcessed { timestamp, .. }
            | EngineEvent::OrderRejected { timestamp, .. }
            | EngineEvent::LiquidationStarted { timestamp, .. } => *timestamp,
            EngineEvent::TradeExecuted(trade) => trade.timestamp,
            EngineEvent::EquityRecorded(point) => point.timestamp,
        }
    }
}

/// Renders a journal as newline-delimited JSON.
pub fn to_json_lines(events: &[EngineEvent]) -> Result<String, EventsError> {
    let mut out = String::new();
    for event in events {
        out.push_str(&serde_json::to_string(event)?);
        out.push('\n');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn journal_lines_carry_type_tag() {
        let ts = Utc::now();
        let events = vec![
            EngineEvent::EquityRecorded(EquityPoint { timestamp: ts, value: dec!(100) }),
            EngineEvent::LiquidationStarted { timestamp: ts, open_positions: 2 },
        ];
        let out = to_json_lines(&events).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"type\":\"EquityRecorded\""));
        assert!(lines[1].contains("\"open_positions\":2"));
        assert_eq!(events[1].timestamp(), ts);
    }
}
