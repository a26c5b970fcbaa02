//! Sequence-generation errors

use thiserror::Error;

use rate_model::ModelError;

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("no eligible rate pools remain after filtering")]
    NoEligiblePools,

    #[error("permutation rank {rank} out of range for {pool_count} pools")]
    RankOutOfRange { rank: u128, pool_count: usize },

    #[error(transparent)]
    Model(#[from] ModelError),
}
