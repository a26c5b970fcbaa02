//! Test fixtures for the rate-plan optimization workspace

pub mod fixtures;

pub use fixtures::*;
