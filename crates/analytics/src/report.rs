use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A comprehensive, standardized report of a strategy's performance.
///
/// Trade statistics count FIFO round-trip samples, not raw fills. Every
/// metric whose inputs are degenerate (no samples, no losses, zero variance,
/// zero drawdown) is reported as zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    // I. Core Profitability Metrics
    /// Sum of all realized round-trip P&L, net of commission.
    pub total_net_profit: Decimal,
    pub gross_profit: Decimal,
    /// Sum of losing samples; zero or negative.
    pub gross_loss: Decimal,
    /// `gross_profit / |gross_loss|`.
    pub profit_factor: Decimal,
    /// Return of the equity curve against initial capital, in percent.
    pub total_return_pct: Decimal,

    // II. Risk and Drawdown
    /// Largest peak-to-trough decline of the equity curve, as a fraction.
    pub max_drawdown: Decimal,
    pub max_drawdown_pct: Decimal,
    pub sharpe_ratio: Decimal,
    pub sortino_ratio: Decimal,
    pub calmar_ratio: Decimal,
    /// Historical 95 % value-at-risk of period returns, as a positive loss fraction.
    pub var_95: Decimal,
    /// Mean of the returns at or beyond the VaR cut-off, as a positive loss fraction.
    pub expected_shortfall: Decimal,

    // III. Trade-Level Statistics
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate_pct: Decimal,
    pub average_win: Decimal,
    /// Zero or negative.
    pub average_loss: Decimal,
    pub largest_win: Decimal,
    /// Zero or negative.
    pub largest_loss: Decimal,
    /// `average_win / |average_loss|`.
    pub payoff_ratio: Decimal,

    // IV. Time-Based Metrics
    #[serde(with = "humantime_serde")]
    pub average_holding_period: Duration,
}

impl PerformanceReport {
    /// Creates a new, zeroed-out PerformanceReport.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn losing_rate_pct(&self) -> Decimal {
        if self.total_trades == 0 {
            Decimal::ZERO
        } else {
            Decimal::from(self.losing_trades) / Decimal::from(self.total_trades) * Decimal::ONE_HUNDRED
        }
    }
}
