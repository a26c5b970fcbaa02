//! Sequence generator
//!
//! Seeds a bounded candidate set (cost-ranked and random permutations),
//! removes duplicates, ranks by a cheap cost hint, drops no-savings
//! orderings, and truncates to the configured bound. Above the
//! first-instance limit it emits a distributed placeholder instead and the
//! runtime dispatches batched generation jobs addressed by permutation rank.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use log::debug;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rust_decimal::Decimal;

use rate_model::{
    device_cost, BillingContext, Device, PlanType, RatePlanId, RatePlanSequence, RatePool,
    RatePoolCollection,
};

use crate::config::GeneratorConfig;
use crate::diversity::diversity_score;
use crate::error::GeneratorError;
use crate::permute::{factorial, PermutationStream};

/// Outcome of a generation request
#[derive(Debug, Clone)]
pub enum GenerationOutcome {
    /// Ranked sequences, ready to be bound to queues
    Inline(Vec<RatePlanSequence>),
    /// Candidate space too large for one pass; the runtime fans out batched
    /// generation jobs described by this placeholder
    Distributed(DistributedGeneration),
}

/// Placeholder describing a distributed generation fan-out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributedGeneration {
    pub total_permutations: u128,
    pub planned_sequences: usize,
    pub batch_size: usize,
    pub batch_count: usize,
}

/// Rate-plan sequence generator; one instance per optimization run
pub struct SequenceGenerator {
    config: GeneratorConfig,
}

impl SequenceGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self { config }
    }

    /// General mode: cost-ranked permutations of the eligible pools.
    pub fn generate(
        &self,
        pools: &RatePoolCollection,
        devices: &[Device],
        billing: &BillingContext,
        baseline_cost: Option<Decimal>,
    ) -> Result<GenerationOutcome, GeneratorError> {
        let eligible = eligible_pools(pools)?;

        if let Some(distributed) = self.distributed_plan(eligible.len()) {
            return Ok(GenerationOutcome::Distributed(distributed));
        }

        let mut candidates = self.seed_orderings(&eligible);
        candidates.extend(self.random_orderings(&eligible));

        let sequences = self.finish(candidates, &eligible, devices, billing, baseline_cost)?;
        Ok(GenerationOutcome::Inline(sequences))
    }

    /// Type-balanced mode (mobility): candidates interleave plan types so no
    /// sequence leads with a single type when several exist; low-diversity
    /// candidates are dropped.
    pub fn generate_type_balanced(
        &self,
        pools: &RatePoolCollection,
        devices: &[Device],
        billing: &BillingContext,
        baseline_cost: Option<Decimal>,
    ) -> Result<GenerationOutcome, GeneratorError> {
        let eligible = eligible_pools(pools)?;

        let mut groups: BTreeMap<PlanType, Vec<RatePool>> = BTreeMap::new();
        for pool in &eligible {
            groups.entry(pool.plan_type).or_default().push(pool.clone());
        }
        if groups.len() <= 1 {
            return self.generate(pools, devices, billing, baseline_cost);
        }

        if let Some(distributed) = self.distributed_plan(eligible.len()) {
            return Ok(GenerationOutcome::Distributed(distributed));
        }

        let mut candidates = Vec::new();
        for criterion in SEED_CRITERIA {
            let ordered: Vec<Vec<RatePool>> = groups
                .values()
                .map(|pools| {
                    let mut sorted = pools.clone();
                    sort_by_criterion(&mut sorted, *criterion);
                    sorted
                })
                .collect();
            candidates.push(interleave(&ordered));
        }

        let mut rng = self.rng();
        for _ in 0..self.config.random_permutations {
            let mut shuffled: Vec<Vec<RatePool>> = groups
                .values()
                .map(|pools| {
                    let mut copy = pools.clone();
                    copy.shuffle(&mut rng);
                    copy
                })
                .collect();
            shuffled.shuffle(&mut rng);
            candidates.push(interleave(&shuffled));
        }

        let min_diversity = self.config.min_diversity;
        let before = candidates.len();
        candidates.retain(|seq| {
            let types: Vec<PlanType> = seq.iter().map(|p| p.plan_type).collect();
            diversity_score(&types) >= min_diversity
        });
        debug!(
            "type-balanced diversity filter kept {} of {} candidates",
            candidates.len(),
            before
        );

        let sequences = self.finish(candidates, &eligible, devices, billing, baseline_cost)?;
        Ok(GenerationOutcome::Inline(sequences))
    }

    /// Distributed mode: materialize one batch of lexicographic permutations
    /// addressed by rank. Used by the batched generation jobs.
    pub fn generate_batch(
        &self,
        pools: &RatePoolCollection,
        devices: &[Device],
        billing: &BillingContext,
        start_rank: u128,
        count: usize,
    ) -> Result<Vec<RatePlanSequence>, GeneratorError> {
        let eligible = eligible_pools(pools)?;
        let stream = PermutationStream::from_rank(eligible.len(), start_rank).ok_or(
            GeneratorError::RankOutOfRange {
                rank: start_rank,
                pool_count: eligible.len(),
            },
        )?;

        let mut sequences = Vec::new();
        for perm in stream.take(count.min(self.config.batch_size)) {
            let ordered: Vec<RatePool> = perm.iter().map(|&i| eligible[i].clone()).collect();
            let hint = cost_hint(&ordered, devices, billing)?;
            let mut sequence =
                RatePlanSequence::new(ordered.iter().map(|p| p.rate_plan_id).collect());
            sequence.cost_hint = Some(hint);
            sequences.push(sequence);
        }
        Ok(sequences)
    }

    fn distributed_plan(&self, pool_count: usize) -> Option<DistributedGeneration> {
        let total = factorial(pool_count);
        if total <= self.config.first_instance_limit {
            return None;
        }
        let planned = self.config.max_sequences.min(total.min(usize::MAX as u128) as usize);
        Some(DistributedGeneration {
            total_permutations: total,
            planned_sequences: planned,
            batch_size: self.config.batch_size,
            batch_count: planned.div_ceil(self.config.batch_size),
        })
    }

    /// Deterministic seed orderings: cheapest base, cheapest per unit,
    /// largest allowance. Each seed is a full permutation.
    fn seed_orderings(&self, eligible: &[RatePool]) -> Vec<Vec<RatePool>> {
        SEED_CRITERIA
            .iter()
            .map(|criterion| {
                let mut ordered = eligible.to_vec();
                sort_by_criterion(&mut ordered, *criterion);
                ordered
            })
            .collect()
    }

    fn random_orderings(&self, eligible: &[RatePool]) -> Vec<Vec<RatePool>> {
        let mut rng = self.rng();
        (0..self.config.random_permutations)
            .map(|_| {
                let mut shuffled = eligible.to_vec();
                shuffled.shuffle(&mut rng);
                shuffled
            })
            .collect()
    }

    fn rng(&self) -> StdRng {
        match self.config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    /// Shared tail of both modes: de-duplicate, rank by cost hint, apply the
    /// no-savings filter, truncate to the bound.
    fn finish(
        &self,
        candidates: Vec<Vec<RatePool>>,
        identity: &[RatePool],
        devices: &[Device],
        billing: &BillingContext,
        baseline_cost: Option<Decimal>,
    ) -> Result<Vec<RatePlanSequence>, GeneratorError> {
        let mut seen: BTreeSet<Vec<RatePlanId>> = BTreeSet::new();
        let mut ranked: Vec<(Decimal, Vec<RatePlanId>)> = Vec::new();

        for ordered in candidates {
            let ids: Vec<RatePlanId> = ordered.iter().map(|p| p.rate_plan_id).collect();
            if !seen.insert(ids.clone()) {
                continue;
            }
            let hint = cost_hint(&ordered, devices, billing)?;
            ranked.push((hint, ids));
        }
        ranked.sort();

        // Sequences that cannot beat the current device cost are dropped;
        // when nothing can, the baseline-identity ordering is retained so the
        // queue still produces a result.
        if let Some(baseline) = baseline_cost {
            let savings: Vec<_> = ranked
                .iter()
                .filter(|(hint, _)| *hint <= baseline)
                .cloned()
                .collect();
            if savings.is_empty() {
                let hint = cost_hint(identity, devices, billing)?;
                ranked = vec![(hint, identity.iter().map(|p| p.rate_plan_id).collect())];
            } else {
                ranked = savings;
            }
        }

        ranked.truncate(self.config.max_sequences);
        Ok(ranked
            .into_iter()
            .map(|(hint, ids)| {
                let mut sequence = RatePlanSequence::new(ids);
                sequence.cost_hint = Some(hint);
                sequence
            })
            .collect())
    }
}

/// Seed ordering criteria for candidate permutations
#[derive(Debug, Clone, Copy)]
enum SeedCriterion {
    CheapestBaseFirst,
    CheapestPerUnitFirst,
    LargestAllowanceFirst,
}

const SEED_CRITERIA: &[SeedCriterion] = &[
    SeedCriterion::CheapestBaseFirst,
    SeedCriterion::CheapestPerUnitFirst,
    SeedCriterion::LargestAllowanceFirst,
];

fn sort_by_criterion(pools: &mut [RatePool], criterion: SeedCriterion) {
    match criterion {
        SeedCriterion::CheapestBaseFirst => {
            pools.sort_by(|a, b| {
                (a.pool_base_cost, a.rate_plan_id).cmp(&(b.pool_base_cost, b.rate_plan_id))
            });
        }
        SeedCriterion::CheapestPerUnitFirst => {
            pools.sort_by(|a, b| {
                (a.cost_per_unit(), a.rate_plan_id).cmp(&(b.cost_per_unit(), b.rate_plan_id))
            });
        }
        SeedCriterion::LargestAllowanceFirst => {
            pools.sort_by(|a, b| {
                b.pool_allowance
                    .cmp(&a.pool_allowance)
                    .then(a.rate_plan_id.cmp(&b.rate_plan_id))
            });
        }
    }
}

/// Round-robin interleave across type groups until every pool is placed.
fn interleave(groups: &[Vec<RatePool>]) -> Vec<RatePool> {
    let capacity = groups.iter().map(Vec::len).sum();
    let mut result = Vec::with_capacity(capacity);
    let mut depth = 0;
    loop {
        let mut placed = false;
        for group in groups {
            if let Some(pool) = group.get(depth) {
                result.push(pool.clone());
                placed = true;
            }
        }
        if !placed {
            return result;
        }
        depth += 1;
    }
}

/// Drop pools that cannot price overage. The group was already validated
/// upstream; the generator still defends against a bad collection.
fn eligible_pools(pools: &RatePoolCollection) -> Result<Vec<RatePool>, GeneratorError> {
    let eligible: Vec<RatePool> = pools
        .iter()
        .filter(|p| p.pool_overage_rate > Decimal::ZERO && p.overage_block_size > Decimal::ZERO)
        .cloned()
        .collect();
    if eligible.is_empty() {
        return Err(GeneratorError::NoEligiblePools);
    }
    Ok(eligible)
}

/// Cheap ranking estimate: every device priced unshared on the sequence's
/// first pool.
fn cost_hint(
    ordered: &[RatePool],
    devices: &[Device],
    billing: &BillingContext,
) -> Result<Decimal, GeneratorError> {
    let first = match ordered.first() {
        Some(pool) => pool,
        None => return Ok(Decimal::ZERO),
    };
    let mut hint = Decimal::ZERO;
    for device in devices {
        hint += device_cost(first, device, billing)?.total();
    }
    Ok(hint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use test_utils::fixtures::{billing, data_plan, device, pool_collection};

    fn generator(config: GeneratorConfig) -> SequenceGenerator {
        SequenceGenerator::new(GeneratorConfig {
            rng_seed: Some(7),
            ..config
        })
    }

    fn sample_pools() -> RatePoolCollection {
        // base costs 5/10/20, allowances 500/1000/5000
        pool_collection(&[
            data_plan(1, dec!(20), dec!(5000), dec!(5), dec!(100)),
            data_plan(2, dec!(5), dec!(500), dec!(8), dec!(100)),
            data_plan(3, dec!(10), dec!(1000), dec!(4), dec!(100)),
        ])
    }

    fn sample_devices() -> Vec<Device> {
        vec![device(1, 1, 1, dec!(300)), device(2, 1, 1, dec!(700))]
    }

    #[test]
    fn bounded_and_distinct() {
        let gen = generator(GeneratorConfig {
            max_sequences: 4,
            random_permutations: 40,
            ..GeneratorConfig::default()
        });
        let outcome = gen
            .generate(&sample_pools(), &sample_devices(), &billing(30), None)
            .unwrap();
        let sequences = match outcome {
            GenerationOutcome::Inline(s) => s,
            other => panic!("expected inline sequences, got {:?}", other),
        };
        assert!(sequences.len() <= 4);
        let mut ids: Vec<_> = sequences.iter().map(|s| s.rate_plan_ids.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), sequences.len(), "sequences must be distinct");
    }

    #[test]
    fn sequences_are_ranked_by_cost_hint() {
        let gen = generator(GeneratorConfig::default());
        let outcome = gen
            .generate(&sample_pools(), &sample_devices(), &billing(30), None)
            .unwrap();
        let sequences = match outcome {
            GenerationOutcome::Inline(s) => s,
            other => panic!("expected inline sequences, got {:?}", other),
        };
        let hints: Vec<_> = sequences.iter().map(|s| s.cost_hint.unwrap()).collect();
        let mut sorted = hints.clone();
        sorted.sort();
        assert_eq!(hints, sorted);
        // cheapest head: plan 3 ($10 base, big allowance) beats plan 2 whose
        // 500 MB allowance forces overage for the 700 MB device
        assert_eq!(sequences[0].rate_plan_ids[0], 3);
    }

    #[test]
    fn no_savings_sequences_fall_back_to_identity() {
        let gen = generator(GeneratorConfig::default());
        // baseline $1: nothing can beat it
        let outcome = gen
            .generate(
                &sample_pools(),
                &sample_devices(),
                &billing(30),
                Some(dec!(1)),
            )
            .unwrap();
        let sequences = match outcome {
            GenerationOutcome::Inline(s) => s,
            other => panic!("expected inline sequences, got {:?}", other),
        };
        assert_eq!(sequences.len(), 1);
        assert_eq!(sequences[0].rate_plan_ids, vec![1, 2, 3]);
    }

    #[test]
    fn ineligible_pools_are_filtered() {
        let plans = vec![
            data_plan(1, dec!(10), dec!(1000), dec!(5), dec!(100)),
            data_plan(2, dec!(5), dec!(500), dec!(0), dec!(100)),
        ];
        let pools = pool_collection(&plans);

        let gen = generator(GeneratorConfig::default());
        let outcome = gen
            .generate(&pools, &sample_devices(), &billing(30), None)
            .unwrap();
        let sequences = match outcome {
            GenerationOutcome::Inline(s) => s,
            other => panic!("expected inline sequences, got {:?}", other),
        };
        for seq in &sequences {
            assert!(!seq.rate_plan_ids.contains(&2));
        }
    }

    #[test]
    fn large_pool_sets_switch_to_distributed_mode() {
        let plans: Vec<_> = (1..=8)
            .map(|i| data_plan(i, dec!(10), dec!(1000), dec!(5), dec!(100)))
            .collect();
        let gen = generator(GeneratorConfig {
            first_instance_limit: 1000,
            max_sequences: 100,
            batch_size: 25,
            ..GeneratorConfig::default()
        });
        let outcome = gen
            .generate(&pool_collection(&plans), &sample_devices(), &billing(30), None)
            .unwrap();
        match outcome {
            GenerationOutcome::Distributed(plan) => {
                assert_eq!(plan.total_permutations, 40_320);
                assert_eq!(plan.planned_sequences, 100);
                assert_eq!(plan.batch_count, 4);
            }
            other => panic!("expected distributed placeholder, got {:?}", other),
        }
    }

    #[test]
    fn batch_generation_is_addressable_by_rank() {
        let pools = sample_pools();
        let gen = generator(GeneratorConfig {
            batch_size: 10,
            ..GeneratorConfig::default()
        });
        let first = gen
            .generate_batch(&pools, &sample_devices(), &billing(30), 0, 2)
            .unwrap();
        let second = gen
            .generate_batch(&pools, &sample_devices(), &billing(30), 2, 2)
            .unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);
        let mut all: Vec<_> = first
            .iter()
            .chain(second.iter())
            .map(|s| s.rate_plan_ids.clone())
            .collect();
        all.dedup();
        assert_eq!(all.len(), 4, "ranks must not overlap");

        assert!(gen
            .generate_batch(&pools, &sample_devices(), &billing(30), 6, 2)
            .is_err());
    }

    #[test]
    fn type_balanced_interleaves_plan_types() {
        let mut plans = vec![
            data_plan(1, dec!(10), dec!(1000), dec!(5), dec!(100)),
            data_plan(2, dec!(12), dec!(1000), dec!(5), dec!(100)),
            data_plan(3, dec!(8), dec!(1000), dec!(5), dec!(100)),
            data_plan(4, dec!(9), dec!(1000), dec!(5), dec!(100)),
        ];
        plans[2].plan_type = PlanType::Voice;
        plans[3].plan_type = PlanType::Voice;

        let gen = generator(GeneratorConfig::default());
        let outcome = gen
            .generate_type_balanced(
                &pool_collection(&plans),
                &sample_devices(),
                &billing(30),
                None,
            )
            .unwrap();
        let sequences = match outcome {
            GenerationOutcome::Inline(s) => s,
            other => panic!("expected inline sequences, got {:?}", other),
        };
        assert!(!sequences.is_empty());
        for seq in &sequences {
            let head: Vec<_> = seq.rate_plan_ids.iter().take(2).collect();
            // plans 1,2 are data; 3,4 voice: a diverse head never repeats a type
            let head_types: Vec<_> = head
                .iter()
                .map(|id| if **id <= 2 { PlanType::Data } else { PlanType::Voice })
                .collect();
            assert_ne!(head_types[0], head_types[1], "head must mix types: {:?}", seq);
        }
    }

    #[test]
    fn deterministic_with_fixed_seed() {
        let make = || {
            let gen = generator(GeneratorConfig::default());
            match gen
                .generate(&sample_pools(), &sample_devices(), &billing(30), None)
                .unwrap()
            {
                GenerationOutcome::Inline(s) => s,
                other => panic!("expected inline sequences, got {:?}", other),
            }
        };
        assert_eq!(make(), make());
    }
}
