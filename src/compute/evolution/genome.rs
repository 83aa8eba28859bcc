//! Sequence manipulation utilities for evolutionary search.
//!
//! Provides pool seeding from references and per-base mutation. All
//! randomness flows through one explicitly seeded generator so a run is
//! reproducible from its seed.

use rand::prelude::*;

use crate::schema::{Nucleotide, Sequence, SequencePool};

use super::EvolutionError;

/// Random number generator wrapper for sequence operations.
pub struct GenomeRng {
    rng: StdRng,
}

impl GenomeRng {
    /// Create from seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Build a pool of exactly `n_pool` sequences from `references`.
    ///
    /// With at least `n_pool` references the pool is a uniform sample without
    /// replacement. Otherwise the reference list is tiled in order and
    /// truncated, so every reference appears before any repeats.
    pub fn seed_pool(
        &mut self,
        references: &[Sequence],
        n_pool: usize,
    ) -> Result<SequencePool, EvolutionError> {
        if references.is_empty() {
            return Err(EvolutionError::EmptyInput);
        }

        if references.len() >= n_pool {
            return Ok(references
                .choose_multiple(&mut self.rng, n_pool)
                .cloned()
                .collect());
        }

        Ok(references.iter().cycle().take(n_pool).cloned().collect())
    }

    /// Substitute each base with probability `rate`.
    ///
    /// The replacement is drawn uniformly from the whole alphabet and may
    /// equal the original base, so the effective substitution rate is
    /// `rate * 3/4`.
    pub fn mutate(&mut self, sequence: &Sequence, rate: f64) -> Sequence {
        let rate = rate.clamp(0.0, 1.0);
        let bases: Vec<Nucleotide> = sequence
            .as_slice()
            .iter()
            .map(|&base| {
                if self.rng.gen_bool(rate) {
                    self.random_base()
                } else {
                    base
                }
            })
            .collect();

        // Length is preserved, so the input's non-emptiness carries over.
        Sequence::from_nonempty(bases)
    }

    /// Uniformly random nucleotide.
    fn random_base(&mut self) -> Nucleotide {
        Nucleotide::ALL[self.rng.gen_range(0..Nucleotide::ALL.len())]
    }

    /// Uniform index in `0..len`. `len` must be non-zero.
    pub fn index(&mut self, len: usize) -> usize {
        self.rng.gen_range(0..len)
    }
}

/// Number of positions at which two sequences differ, plus their length
/// difference.
pub fn hamming_distance(a: &Sequence, b: &Sequence) -> usize {
    let mismatches = a
        .as_slice()
        .iter()
        .zip(b.as_slice())
        .filter(|(x, y)| x != y)
        .count();
    mismatches + a.len().abs_diff(b.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn seqs(raw: &[&str]) -> Vec<Sequence> {
        raw.iter().map(|s| s.parse().unwrap()).collect()
    }

    #[test]
    fn test_seed_pool_empty_references() {
        let mut rng = GenomeRng::new(42);
        assert!(matches!(
            rng.seed_pool(&[], 10),
            Err(EvolutionError::EmptyInput)
        ));
    }

    #[test]
    fn test_seed_pool_tiles_in_order() {
        let refs = seqs(&["AAAA", "CCCC", "GGGG"]);
        let mut rng = GenomeRng::new(42);
        let pool = rng.seed_pool(&refs, 7).unwrap();

        let rendered: Vec<String> = pool.iter().map(|s| s.to_string()).collect();
        assert_eq!(
            rendered,
            ["AAAA", "CCCC", "GGGG", "AAAA", "CCCC", "GGGG", "AAAA"]
        );
    }

    #[test]
    fn test_seed_pool_samples_without_replacement() {
        let refs = seqs(&["AAAA", "CCCC", "GGGG", "TTTT", "ACGT", "TGCA"]);
        let mut rng = GenomeRng::new(7);
        let pool = rng.seed_pool(&refs, 4).unwrap();

        assert_eq!(pool.len(), 4);
        for (i, a) in pool.iter().enumerate() {
            assert!(refs.contains(a));
            for b in &pool[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_seed_pool_reproducible() {
        let refs = seqs(&["AAAA", "CCCC", "GGGG", "TTTT", "ACGT", "TGCA"]);
        let a = GenomeRng::new(99).seed_pool(&refs, 3).unwrap();
        let b = GenomeRng::new(99).seed_pool(&refs, 3).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_mutate_extreme_rates() {
        let mut rng = GenomeRng::new(42);
        let seq: Sequence = "ACGTACGTACGTACGT".parse().unwrap();

        assert_eq!(rng.mutate(&seq, 0.0), seq);

        // With rate 1 roughly a quarter of positions keep their base by chance.
        let mutated = rng.mutate(&seq, 1.0);
        assert_eq!(mutated.len(), seq.len());
        assert!(hamming_distance(&seq, &mutated) > 0);
    }

    #[test]
    fn test_full_rate_draws_whole_alphabet() {
        let mut rng = GenomeRng::new(11);
        let seq: Sequence = "A".repeat(400).parse().unwrap();
        let mutated = rng.mutate(&seq, 1.0);

        assert_eq!(mutated.len(), 400);
        for base in Nucleotide::ALL {
            assert!(mutated.as_slice().contains(&base), "missing {}", base);
        }
    }

    #[test]
    fn test_mutate_single_base() {
        let mut rng = GenomeRng::new(5);
        let seq: Sequence = "G".parse().unwrap();
        for _ in 0..20 {
            assert_eq!(rng.mutate(&seq, 1.0).len(), 1);
        }
    }

    #[test]
    fn test_mutate_does_not_touch_input() {
        let mut rng = GenomeRng::new(3);
        let seq: Sequence = "GGGGGGGGGG".parse().unwrap();
        let _ = rng.mutate(&seq, 1.0);
        assert_eq!(seq.to_string(), "GGGGGGGGGG");
    }

    #[test]
    fn test_hamming_distance() {
        let a: Sequence = "ACGT".parse().unwrap();
        let b: Sequence = "ACCTA".parse().unwrap();
        assert_eq!(hamming_distance(&a, &a), 0);
        assert_eq!(hamming_distance(&a, &b), 2);
    }

    proptest! {
        #[test]
        fn prop_mutation_preserves_length(
            raw in "[ACGT]{1,64}",
            rate in 0.0f64..=1.0,
            seed in any::<u64>(),
        ) {
            let seq: Sequence = raw.parse().unwrap();
            let mut rng = GenomeRng::new(seed);
            prop_assert_eq!(rng.mutate(&seq, rate).len(), seq.len());
        }

        #[test]
        fn prop_seed_pool_has_exact_size(
            n_refs in 1usize..12,
            n_pool in 1usize..40,
            seed in any::<u64>(),
        ) {
            let refs: Vec<Sequence> = (0..n_refs)
                .map(|i| Sequence::new(vec![Nucleotide::ALL[i % 4]; i + 1]).unwrap())
                .collect();
            let pool = GenomeRng::new(seed).seed_pool(&refs, n_pool).unwrap();
            prop_assert_eq!(pool.len(), n_pool);
        }
    }
}
