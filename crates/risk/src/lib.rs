//! # Risk Crate
//!
//! Turns the candidate trades a strategy produces in one tick into a bounded
//! set of market orders, sized against the ledger's live cash.
//!
//! ## Architectural Principles
//!
//! - **Read-only ledger access:** The allocator sees the portfolio only through
//!   `core_types::PortfolioView` and never mutates it.
//! - **Pluggable volatility:** Volatility-aware sizing reads from any
//!   `VolatilitySource`, typically the strategy's indicator store.
//!
//! ## Public API
//!
//! - `CapitalAllocator`: Ranks, truncates and sizes signals.
//! - `VolatilitySource`: The lookup used for volatility-adjusted sizing.
//! - `RiskError`: Construction errors for invalid allocation parameters.

pub mod allocator;
pub mod error;

pub use allocator::{CapitalAllocator, VolatilitySource};
pub use error::RiskError;
