use analytics::{PerformanceReport, RoundTrip};
use chrono::{DateTime, Utc};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, CellAlignment, ContentArrangement, Table};
use core_types::{EquityPoint, Trade};
use events::{EngineEvent, PortfolioSnapshot};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Everything a finished run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResults {
    pub run_id: Uuid,
    pub strategy: String,
    pub parameters: serde_json::Value,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub initial_capital: Decimal,
    pub final_capital: Decimal,
    pub final_cash: Decimal,
    /// Percent, `12.5` meaning 12.5 %.
    pub total_return_pct: Decimal,
    pub total_pnl: Decimal,
    /// Largest peak-to-trough fraction seen by the ledger.
    pub max_drawdown: Decimal,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub round_trips: Vec<RoundTrip>,
    pub final_snapshot: Option<PortfolioSnapshot>,
    pub metrics: PerformanceReport,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<EngineEvent>,
}

impl BacktestResults {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn journal(&self) -> Result<String, events::EventsError> {
        events::to_json_lines(&self.events)
    }

    /// Realized FIFO P&L keyed by the trade that closed it.
    pub fn realized_by_trade(&self) -> HashMap<u64, Decimal> {
        let mut realized = HashMap::new();
        for rt in &self.round_trips {
            *realized.entry(rt.exit_trade_id).or_insert(Decimal::ZERO) += rt.pnl;
        }
        realized
    }

    /// A multi-section, human-readable report of the run. Same text as `Display`.
    pub fn summary(&self) -> String {
        self.to_string()
    }

    fn trade_table(&self) -> Table {
        let realized = self.realized_by_trade();
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                "Time", "Symbol", "Side", "Qty", "Price", "Value", "Commission", "Reg Fee",
                "Activity Fee", "Slippage", "P&L", "Reason",
            ]);

        let mut totals = [Decimal::ZERO; 6];
        for trade in &self.trades {
            let pnl = realized.get(&trade.trade_id).copied();
            let cells = [
                trade.notional(),
                trade.commission,
                trade.regulatory_fee,
                trade.activity_fee,
                trade.slippage,
                pnl.unwrap_or(Decimal::ZERO),
            ];
            for (total, value) in totals.iter_mut().zip(cells) {
                *total += value;
            }
            table.add_row(vec![
                Cell::new(trade.timestamp.format("%Y-%m-%d %H:%M")),
                Cell::new(&trade.symbol),
                Cell::new(trade.side),
                Cell::new(trade.quantity.normalize()).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.2}", trade.price)).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.2}", cells[0])).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.2}", cells[1])).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.4}", cells[2])).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.4}", cells[3])).set_alignment(CellAlignment::Right),
                Cell::new(format!("{:.2}", cells[4])).set_alignment(CellAlignment::Right),
                Cell::new(pnl.map_or_else(|| "Open".to_string(), |p| format!("{p:.2}")))
                    .set_alignment(CellAlignment::Right),
                Cell::new(&trade.reason),
            ]);
        }

        let mut row = vec![Cell::new("TOTAL"), Cell::new(""), Cell::new(""), Cell::new(""), Cell::new("")];
        for (i, total) in totals.iter().enumerate() {
            let text = if i == 2 || i == 3 { format!("{total:.4}") } else { format!("{total:.2}") };
            row.push(Cell::new(text).set_alignment(CellAlignment::Right));
        }
        row.push(Cell::new(""));
        table.add_row(row);
        table
    }
}

impl fmt::Display for BacktestResults {
    fn fmt(&self, out: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.metrics;
        let fmt_ts = |ts: Option<DateTime<Utc>>| {
            ts.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".to_string())
        };

        writeln!(out, "=== Backtest Results: {} ({}) ===", self.strategy, self.run_id)?;
        writeln!(out, "Period:            {} -> {}", fmt_ts(self.start), fmt_ts(self.end))?;
        writeln!(out, "Initial Capital:   {:.2}", self.initial_capital)?;
        writeln!(out, "Final Capital:     {:.2}", self.final_capital)?;
        writeln!(out, "Final Cash:        {:.2}", self.final_cash)?;
        writeln!(out, "Total Return:      {:.2}%", self.total_return_pct)?;
        writeln!(out, "Total P&L:         {:.2}", self.total_pnl)?;
        writeln!(out, "Max Drawdown:      {:.2}%", self.max_drawdown * Decimal::ONE_HUNDRED)?;

        writeln!(out, "\n--- Trade Statistics ---")?;
        writeln!(out, "Trades Executed:   {}", self.trades.len())?;
        writeln!(out, "Round Trips:       {}", m.total_trades)?;
        writeln!(out, "Winning / Losing:  {} / {}", m.winning_trades, m.losing_trades)?;
        writeln!(out, "Win Rate:          {:.2}%", m.win_rate_pct)?;
        writeln!(out, "Net Realized P&L:  {:.2}", m.total_net_profit)?;
        writeln!(out, "Profit Factor:     {:.2}", m.profit_factor)?;
        writeln!(out, "Average Win/Loss:  {:.2} / {:.2}", m.average_win, m.average_loss)?;
        writeln!(out, "Largest Win/Loss:  {:.2} / {:.2}", m.largest_win, m.largest_loss)?;
        writeln!(out, "Payoff Ratio:      {:.2}", m.payoff_ratio)?;
        writeln!(
            out,
            "Avg Holding:       {:.1}h",
            m.average_holding_period.as_secs_f64() / 3600.0
        )?;

        writeln!(out, "\n--- Risk Metrics ---")?;
        writeln!(out, "Sharpe Ratio:      {:.4}", m.sharpe_ratio)?;
        writeln!(out, "Sortino Ratio:     {:.4}", m.sortino_ratio)?;
        writeln!(out, "Calmar Ratio:      {:.4}", m.calmar_ratio)?;
        writeln!(out, "VaR (95%):         {:.4}", m.var_95)?;
        writeln!(out, "Exp. Shortfall:    {:.4}", m.expected_shortfall)?;

        writeln!(out, "\n--- Trades ---")?;
        if self.trades.is_empty() {
            writeln!(out, "No trades executed.")?;
        } else {
            writeln!(out, "{}", self.trade_table())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use core_types::OrderSide;
    use rust_decimal_macros::dec;

    fn trade(id: u64, side: OrderSide, price: Decimal) -> Trade {
        Trade {
            trade_id: id,
            symbol: "AAPL".to_string(),
            side,
            quantity: dec!(10),
            price,
            timestamp: Utc.with_ymd_and_hms(2024, 1, id as u32, 0, 0, 0).unwrap(),
            commission: dec!(1),
            regulatory_fee: Decimal::ZERO,
            activity_fee: Decimal::ZERO,
            slippage: Decimal::ZERO,
            strategy: "test".to_string(),
            reason: "because".to_string(),
        }
    }

    fn results(trades: Vec<Trade>) -> BacktestResults {
        let round_trips = analytics::TradeMatcher::match_trades(&trades).unwrap();
        BacktestResults {
            run_id: Uuid::new_v4(),
            strategy: "test".to_string(),
            parameters: serde_json::Value::Null,
            start: None,
            end: None,
            initial_capital: dec!(10000),
            final_capital: dec!(10098),
            final_cash: dec!(10098),
            total_return_pct: dec!(0.98),
            total_pnl: dec!(98),
            max_drawdown: Decimal::ZERO,
            trades,
            equity_curve: Vec::new(),
            round_trips,
            final_snapshot: None,
            metrics: PerformanceReport::default(),
            events: Vec::new(),
        }
    }

    #[test]
    fn summary_marks_open_and_closed_trades() {
        let r = results(vec![
            trade(1, OrderSide::Buy, dec!(100)),
            trade(2, OrderSide::Sell, dec!(110)),
            trade(3, OrderSide::Buy, dec!(105)),
        ]);
        assert_eq!(r.realized_by_trade().get(&2), Some(&dec!(98)));

        let summary = r.summary();
        assert!(summary.contains("Open"));
        assert!(summary.contains("98.00"));
        assert!(summary.contains("TOTAL"));
        assert!(summary.contains("because"));
    }

    #[test]
    fn summary_without_trades() {
        let r = results(Vec::new());
        let summary = r.summary();
        assert!(summary.contains("No trades executed."));
        assert!(summary.starts_with("=== Backtest Results: "));
        assert_eq!(summary, format!("{r}"));
    }

    #[test]
    fn json_round_trips() {
        let r = results(vec![trade(1, OrderSide::Buy, dec!(100))]);
        let json = r.to_json().unwrap();
        let back: BacktestResults = serde_json::from_str(&json).unwrap();
        assert_eq!(back.trades, r.trades);
        assert_eq!(back.run_id, r.run_id);
    }
}
