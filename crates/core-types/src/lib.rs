//! # Core Types
//!
//! The shared vocabulary of the simulator: market data, orders, trades,
//! positions and signals. Every other crate depends on this one and nothing
//! here depends on them.

pub mod enums;
pub mod error;
pub mod signal;
pub mod structs;
pub mod view;

// Re-export the core types to provide a clean public API.
pub use enums::{OrderSide, OrderType, StrategyId};
pub use error::CoreError;
pub use signal::{Signal, TradingSignal};
pub use structs::{Bar, DataPoint, EquityPoint, Order, Position, Trade};
pub use view::PortfolioView;
