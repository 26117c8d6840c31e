//! # Events
//!
//! Snapshots and journal entries describing what the simulator did, in a
//! serializable form suitable for reports and exports.
//!
//! As a Layer 0 crate, it depends only on `core-types`.

// Declare the modules that make up this crate.
pub mod error;
pub mod messages;

// Re-export the core types to provide a clean public API.
pub use error::EventsError;
pub use messages::{EngineEvent, PortfolioSnapshot, to_json_lines};
