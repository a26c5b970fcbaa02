//! Generator tunables

/// Limits and knobs for sequence generation
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Upper bound on sequences returned per communication group
    pub max_sequences: usize,
    /// How many random permutations seed the candidate set
    pub random_permutations: usize,
    /// Above this many raw permutations, generation switches to distributed
    /// mode and the runtime dispatches batched generation jobs instead
    pub first_instance_limit: u128,
    /// Sequences per work message when enqueueing assigner batches
    pub batch_size: usize,
    /// Minimum normalized diversity score in type-balanced mode
    pub min_diversity: f64,
    /// Fixed RNG seed; set in tests for reproducible random permutations
    pub rng_seed: Option<u64>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            max_sequences: 300,
            random_permutations: 64,
            first_instance_limit: 5_000,
            batch_size: 25,
            min_diversity: 0.3,
            rng_seed: None,
        }
    }
}
