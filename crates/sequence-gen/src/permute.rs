//! Iterative permutation stream
//!
//! Lexicographic permutations over index vectors, produced one at a time.
//! The full permutation space is never materialized; distributed generation
//! jobs address into it by rank.

/// n! as u128; saturates far above the 15-pool ceiling ever allows.
pub fn factorial(n: usize) -> u128 {
    (1..=n as u128).fold(1u128, |acc, i| acc.saturating_mul(i))
}

/// Stream of lexicographic index permutations starting at a given rank.
pub struct PermutationStream {
    current: Option<Vec<usize>>,
}

impl PermutationStream {
    /// Stream starting at the identity permutation.
    pub fn new(n: usize) -> Self {
        Self::from_rank(n, 0).expect("rank 0 is always valid")
    }

    /// Stream starting at lexicographic rank `rank` (factorial number system
    /// unranking). `None` when the rank is out of range.
    pub fn from_rank(n: usize, rank: u128) -> Option<Self> {
        if rank >= factorial(n) {
            return None;
        }

        let mut available: Vec<usize> = (0..n).collect();
        let mut remainder = rank;
        let mut current = Vec::with_capacity(n);
        for position in (0..n).rev() {
            let block = factorial(position);
            let index = (remainder / block) as usize;
            remainder %= block;
            current.push(available.remove(index));
        }

        Some(Self {
            current: Some(current),
        })
    }
}

impl Iterator for PermutationStream {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        let emitted = self.current.clone()?;
        self.current = next_permutation(&emitted);
        Some(emitted)
    }
}

/// Next lexicographic permutation, or `None` after the last one.
fn next_permutation(perm: &[usize]) -> Option<Vec<usize>> {
    let mut next = perm.to_vec();
    let n = next.len();
    if n < 2 {
        return None;
    }

    // longest non-increasing suffix
    let mut pivot = n - 1;
    while pivot > 0 && next[pivot - 1] >= next[pivot] {
        pivot -= 1;
    }
    if pivot == 0 {
        return None;
    }

    let mut swap = n - 1;
    while next[swap] <= next[pivot - 1] {
        swap -= 1;
    }
    next.swap(pivot - 1, swap);
    next[pivot..].reverse();
    Some(next)
}
