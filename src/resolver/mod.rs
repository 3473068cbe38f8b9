//! Resolver Module
//!
//! Computes worker outputs on demand:
//! - Recursive dependency resolution in declared order
//! - Staleness-aware result caching
//! - Subkey extraction
//! - Optional per-key single-flight

pub mod config;
pub mod flight;
pub mod resolve;
pub mod result;
pub mod subkeys;

pub use config::ResolverConfig;
pub use flight::FlightLocks;
pub use resolve::{Contribution, WorkResolver};
pub use result::WorkResult;
