use crate::error::AnalyticsError;
use crate::matcher::{RoundTrip, TradeMatcher};
use crate::report::PerformanceReport;
use core_types::{EquityPoint, Trade};
use rust_decimal::{Decimal, MathematicalOps};
use std::time::Duration;

/// A stateless calculator for deriving performance metrics from trading activity.
#[derive(Debug, Default)]
pub struct AnalyticsEngine {}

impl AnalyticsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// The main entry point for calculating performance metrics.
    ///
    /// # Arguments
    ///
    /// * `trades` - The complete trade log of a session, in execution order.
    /// * `equity_curve` - One point per processed tick.
    /// * `initial_capital` - The starting capital of the trading session.
    pub fn calculate(
        &self,
        trades: &[Trade],
        equity_curve: &[EquityPoint],
        initial_capital: Decimal,
    ) -> Result<PerformanceReport, AnalyticsError> {
        let round_trips = TradeMatcher::match_trades(trades)?;
        self.analyze(&round_trips, equity_curve, initial_capital)
    }

    /// Computes the report from already matched round trips.
    pub fn analyze(
        &self,
        round_trips: &[RoundTrip],
        equity_curve: &[EquityPoint],
        initial_capital: Decimal,
    ) -> Result<PerformanceReport, AnalyticsError> {
        let mut report = PerformanceReport::new();

        if round_trips.is_empty() {
            // Nothing was closed, so there is nothing to judge.
            return Ok(report);
        }

        self.calculate_profitability(round_trips, &mut report);
        self.calculate_time_metrics(round_trips, &mut report)?;
        self.calculate_drawdown(equity_curve, initial_capital, &mut report);
        self.calculate_ratios(equity_curve, &mut report)?;

        tracing::debug!(
            round_trips = report.total_trades,
            net_profit = %report.total_net_profit,
            sharpe = %report.sharpe_ratio,
            "Performance report calculated"
        );
        Ok(report)
    }

    /// Calculates all profitability-related metrics.
    fn calculate_profitability(&self, round_trips: &[RoundTrip], report: &mut PerformanceReport) {
        report.total_trades = round_trips.len();

        for rt in round_trips {
            report.total_net_profit += rt.pnl;
            if rt.pnl > Decimal::ZERO {
                report.winning_trades += 1;
                report.gross_profit += rt.pnl;
                report.largest_win = report.largest_win.max(rt.pnl);
            } else if rt.pnl < Decimal::ZERO {
                report.losing_trades += 1;
                report.gross_loss += rt.pnl;
                report.largest_loss = report.largest_loss.min(rt.pnl);
            }
        }

        report.win_rate_pct = Decimal::from(report.winning_trades) / Decimal::from(report.total_trades)
            * Decimal::ONE_HUNDRED;

        if report.winning_trades > 0 {
            report.average_win = report.gross_profit / Decimal::from(report.winning_trades);
        }

        if report.losing_trades > 0 {
            report.average_loss = report.gross_loss / Decimal::from(report.losing_trades);
            report.payoff_ratio = report.average_win / report.average_loss.abs();
        }

        // --- Ratios ---
        if report.gross_loss < Decimal::ZERO {
            report.profit_factor = report.gross_profit / report.gross_loss.abs();
        }
    }

    /// Calculates maximum drawdown and total return from the equity curve.
    ///
    /// The peak starts at the initial capital, so a curve that only ever
    /// falls still registers its drawdown.
    fn calculate_drawdown(
        &self,
        equity_curve: &[EquityPoint],
        initial_capital: Decimal,
        report: &mut PerformanceReport,
    ) {
        let mut peak = initial_capital;
        let mut max_drawdown = Decimal::ZERO;

        for point in equity_curve {
            if point.value > peak {
                peak = point.value;
            }
            if peak > Decimal::ZERO {
                max_drawdown = max_drawdown.max((peak - point.value) / peak);
            }
        }

        report.max_drawdown = max_drawdown;
        report.max_drawdown_pct = max_drawdown * Decimal::ONE_HUNDRED;

        if initial_capital > Decimal::ZERO {
            let final_value = equity_curve.last().map_or(initial_capital, |p| p.value);
            report.total_return_pct =
                (final_value - initial_capital) / initial_capital * Decimal::ONE_HUNDRED;
        }
    }

    /// Calculates all ratio-based metrics like Sharpe and Calmar.
    fn calculate_ratios(
        &self,
        equity_curve: &[EquityPoint],
        report: &mut PerformanceReport,
    ) -> Result<(), AnalyticsError> {
        // --- Calmar Ratio ---
        if report.max_drawdown > Decimal::ZERO {
            report.calmar_ratio = report.total_return_pct / report.max_drawdown_pct;
        }

        let returns = period_returns(equity_curve);
        if returns.len() < 2 {
            return Ok(());
        }
        let mean_return = mean(&returns);

        // --- Sharpe Ratio (risk-free rate of zero, sample variance) ---
        let variance = returns.iter().map(|r| (*r - mean_return) * (*r - mean_return)).sum::<Decimal>()
            / Decimal::from(returns.len() - 1);
        if variance > Decimal::ZERO {
            let std_dev = sqrt(variance)?;
            if std_dev > Decimal::ZERO {
                report.sharpe_ratio = mean_return / std_dev;
            }
        }

        // --- Sortino Ratio ---
        let downside: Vec<Decimal> = returns.iter().copied().filter(|r| *r < Decimal::ZERO).collect();
        if !downside.is_empty() {
            let downside_variance =
                downside.iter().map(|r| *r * *r).sum::<Decimal>() / Decimal::from(downside.len());
            let downside_dev = sqrt(downside_variance)?;
            if downside_dev > Decimal::ZERO {
                report.sortino_ratio = mean_return / downside_dev;
            }
        }

        // --- Historical VaR / Expected Shortfall at 95 % ---
        let mut sorted = returns;
        sorted.sort();
        let cutoff = sorted.len() * 5 / 100;
        report.var_95 = -sorted[cutoff];
        report.expected_shortfall = -mean(&sorted[..=cutoff]);

        Ok(())
    }

    /// Calculates time-based metrics.
    fn calculate_time_metrics(
        &self,
        round_trips: &[RoundTrip],
        report: &mut PerformanceReport,
    ) -> Result<(), AnalyticsError> {
        let total: Duration = round_trips
            .iter()
            .map(|rt| rt.holding_period().to_std().unwrap_or_default())
            .sum();
        let count = u32::try_from(round_trips.len()).map_err(|_| {
            AnalyticsError::Calculation(format!("too many round trips to average: {}", round_trips.len()))
        })?;
        report.average_holding_period = total / count;
        Ok(())
    }
}

/// Simple returns between consecutive equity points; zero where the prior
/// value is not positive.
fn period_returns(equity_curve: &[EquityPoint]) -> Vec<Decimal> {
    equity_curve
        .windows(2)
        .map(|w| {
            if w[0].value > Decimal::ZERO {
                (w[1].value - w[0].value) / w[0].value
            } else {
                Decimal::ZERO
            }
        })
        .collect()
}

fn mean(values: &[Decimal]) -> Decimal {
    if values.is_empty() {
        return Decimal::ZERO;
    }
    values.iter().sum::<Decimal>() / Decimal::from(values.len())
}

fn sqrt(value: Decimal) -> Result<Decimal, AnalyticsError> {
    value
        .sqrt()
        .ok_or_else(|| AnalyticsError::Calculation(format!("square root of {value}")))
}
