//! Utilities for the rate-plan optimization workspace
//!
//! This crate provides common utilities including:
//! - Logging configuration
//! - Id-list encoding helpers shared by message attributes and cache keys

pub mod helpers;
pub mod logger;

pub use helpers::*;
pub use logger::*;
