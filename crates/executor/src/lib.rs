//! # Executor
//!
//! Simulated order fills and the cash/position ledger they are booked into.
//!
//! ## Architectural Principles
//!
//! - **State vs. Logic Decoupling:** The `Executor` trait determines the effects of a
//!   fill (price, fees, slippage) without touching the account. The `Portfolio` is the
//!   state machine that applies the resulting `Trade` to cash and positions.
//! - **Shared Fee Model:** The broker charges fees and the ledger estimates them for
//!   affordability checks through the same `FeeSchedule`.
//! - **Reproducible Fills:** Slippage is deterministic unless the noisy mode is
//!   requested, and the noisy mode can be seeded.
//!
//! ## Public API
//!
//! - `Executor`: Turns an order plus the current bar into a `Trade`, or refuses.
//! - `SimulatedExecutor`: Slippage-aware broker used by every backtest.
//! - `Portfolio`: Cash, weighted-average positions and realized P&L.
//! - `FeeSchedule`: Commission, regulatory and activity fee calculation.
//! - `ExecutorError`: Unfillable orders, insufficient funds and bad quantities.

pub mod error;
pub mod exchange;
pub mod fees;
pub mod portfolio;

pub use error::ExecutorError;
pub use exchange::{Executor, SimulatedExecutor};
pub use fees::{FeeBreakdown, FeeSchedule};
pub use portfolio::Portfolio;
