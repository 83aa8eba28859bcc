//! Ranking and truncation of an evaluated generation.

use crate::schema::{ScoredSequence, Sequence};

use super::EvolutionError;
use super::fitness::FitnessDirection;

/// One evaluated generation, sorted best (lowest normalized fitness) first.
#[derive(Debug, Clone, Default)]
pub struct GenerationResult {
    ranked: Vec<ScoredSequence>,
}

impl GenerationResult {
    /// Rank raw oracle scores.
    ///
    /// `scored` must be in pool order; the sort is stable so equal fitness
    /// keeps that order.
    pub fn rank(scored: Vec<(Sequence, f64)>, direction: FitnessDirection) -> Self {
        let mut ranked: Vec<ScoredSequence> = scored
            .into_iter()
            .map(|(sequence, raw)| ScoredSequence::new(sequence, direction.normalize(raw), raw))
            .collect();
        ranked.sort_by(|a, b| a.fitness().total_cmp(&b.fitness()));
        Self { ranked }
    }

    pub fn len(&self) -> usize {
        self.ranked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }

    pub fn best(&self) -> Option<&ScoredSequence> {
        self.ranked.first()
    }

    pub fn as_slice(&self) -> &[ScoredSequence] {
        &self.ranked
    }

    /// The best `n` entries (fewer if the generation is smaller).
    pub fn top(&self, n: usize) -> &[ScoredSequence] {
        &self.ranked[..n.min(self.ranked.len())]
    }

    /// Mean normalized fitness (0 for an empty generation).
    pub fn mean(&self) -> f64 {
        if self.ranked.is_empty() {
            return 0.0;
        }
        self.ranked.iter().map(|s| s.fitness()).sum::<f64>() / self.ranked.len() as f64
    }

    /// Population standard deviation of normalized fitness.
    pub fn std_dev(&self) -> f64 {
        if self.ranked.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        let variance = self
            .ranked
            .iter()
            .map(|s| (s.fitness() - mean).powi(2))
            .sum::<f64>()
            / self.ranked.len() as f64;
        variance.sqrt()
    }

    /// Fraction of distinct sequences in the generation.
    pub fn diversity(&self) -> f64 {
        if self.ranked.is_empty() {
            return 0.0;
        }
        let distinct: std::collections::HashSet<&Sequence> =
            self.ranked.iter().map(|s| s.sequence()).collect();
        distinct.len() as f64 / self.ranked.len() as f64
    }
}

/// Take the best `k` sequences as breeding survivors.
pub fn select_survivors(
    generation: &GenerationResult,
    k: usize,
) -> Result<Vec<Sequence>, EvolutionError> {
    if k > generation.len() {
        return Err(EvolutionError::InsufficientPool {
            requested: k,
            available: generation.len(),
        });
    }
    Ok(generation.ranked[..k]
        .iter()
        .map(|s| s.sequence().clone())
        .collect())
}

/// Final candidate set: the first `n` entries of the terminal generation.
pub fn extract_candidates(generation: &GenerationResult, n: usize) -> Vec<ScoredSequence> {
    generation.top(n).to_vec()
}
