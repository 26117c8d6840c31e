//! # Analytics
//!
//! Post-run performance measurement: round-trip reconstruction, return and
//! risk statistics, and the report that bundles them.
//!
//! ## Architectural Principles
//!
//! - **No I/O:** Everything here works on in-memory trade logs and equity
//!   points. The only workspace dependency is `core-types`.
//! - **Independent of the ledger:** The live ledger keeps one weighted-average position
//!   per symbol. This crate replays the same trade log through FIFO lot queues to
//!   attribute profit to individual round trips. The two never share state.
//! - **Stateless Calculation:** The `AnalyticsEngine` takes the trade log and equity
//!   curve as input and produces a `PerformanceReport` as output.
//!
//! ## Public API
//!
//! - `TradeMatcher`: FIFO reconstruction of round trips from fills.
//! - `AnalyticsEngine`: Computes a `PerformanceReport` from trades and equity.
//! - `PerformanceReport`: Win/loss counts, drawdown, Sharpe/Sortino, VaR and friends.
//! - `AnalyticsError`: Failures while matching or measuring.

pub mod engine;
pub mod error;
pub mod matcher;
pub mod report;

pub use engine::AnalyticsEngine;
pub use error::AnalyticsError;
pub use matcher::{OpenLot, RoundTrip, TradeMatcher};
pub use report::PerformanceReport;
