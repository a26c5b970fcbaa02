//! Rate-plan optimization data model
//!
//! Pure data and pure arithmetic: carrier rate plans, communication
//! plans/groups, device usage snapshots, rate pools, and the billing-period
//! cost calculator. No I/O lives here so the optimizer stays unit-testable.

pub mod cost;
pub mod error;
pub mod models;

pub use cost::*;
pub use error::ModelError;
pub use models::*;
