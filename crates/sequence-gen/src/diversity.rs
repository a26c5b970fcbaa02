//! Plan-type diversity scoring for type-balanced (mobility) sequences

use std::collections::{BTreeMap, BTreeSet};

use rate_model::PlanType;

/// Normalized Shannon entropy of plan types over the head of a sequence.
///
/// Every full permutation of one pool set carries the same type multiset, so
/// the score is taken over the leading window (`max(2, distinct types)`
/// positions): a sequence that opens single-type scores 0, a round-robin
/// interleave scores 1. Sequences over a single-type pool set score 1.
pub fn diversity_score(types: &[PlanType]) -> f64 {
    let distinct: BTreeSet<PlanType> = types.iter().copied().collect();
    let distinct_total = distinct.len();
    if distinct_total <= 1 {
        return 1.0;
    }

    let window = types.len().min(distinct_total.max(2));
    let mut head_counts: BTreeMap<PlanType, usize> = BTreeMap::new();
    for t in &types[..window] {
        *head_counts.entry(*t).or_insert(0) += 1;
    }

    let max_entropy = (window.min(distinct_total) as f64).log2();
    if max_entropy == 0.0 {
        return 0.0;
    }

    let total = window as f64;
    let entropy: f64 = head_counts
        .values()
        .map(|&count| {
            let p = count as f64 / total;
            -p * p.log2()
        })
        .sum();

    entropy / max_entropy
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_type_pool_set_is_maximally_diverse() {
        assert_eq!(diversity_score(&[PlanType::Data, PlanType::Data]), 1.0);
    }

    #[test]
    fn interleaved_head_scores_high() {
        let score = diversity_score(&[
            PlanType::Data,
            PlanType::Voice,
            PlanType::Data,
            PlanType::Voice,
        ]);
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn pure_type_head_scores_zero() {
        let score = diversity_score(&[
            PlanType::Data,
            PlanType::Data,
            PlanType::Voice,
            PlanType::Voice,
        ]);
        assert_eq!(score, 0.0);
    }

    #[test]
    fn three_type_partial_mix_lands_between() {
        let score = diversity_score(&[
            PlanType::Data,
            PlanType::Data,
            PlanType::Voice,
            PlanType::Sms,
        ]);
        assert!(score > 0.3 && score < 1.0);
    }
}
