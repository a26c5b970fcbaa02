//! Rate-plan sequence generation
//!
//! Produces the ranked, de-duplicated, bounded list of rate-plan orderings
//! that seed parallel assignment attempts. Two modes share one contract:
//! general (cost-ranked permutations) and type-balanced (mobility).

pub mod config;
pub mod diversity;
pub mod error;
pub mod generator;
pub mod permute;

pub use config::GeneratorConfig;
pub use error::GeneratorError;
pub use generator::{DistributedGeneration, GenerationOutcome, SequenceGenerator};
