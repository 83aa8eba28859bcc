//! Run configuration for the aptamer search.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration for one evolutionary run.
///
/// Created once before a run and never modified while it executes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Maximum number of generations to evaluate.
    #[serde(default = "default_generations")]
    pub n_generations: usize,
    /// Number of sequences in every generation.
    #[serde(default = "default_pool_size")]
    pub n_pool: usize,
    /// Survivors kept per generation and size of the final candidate set.
    #[serde(default = "default_candidates")]
    pub n_candidates: usize,
    /// Per-base substitution probability (0.0-1.0).
    #[serde(default = "default_mutation_rate")]
    pub mutation_rate: f64,
    /// Reference sequences shorter than this are ignored when seeding.
    #[serde(default = "default_min_length")]
    pub min_length: usize,
    /// Stop if the best fitness has not improved for this many generations.
    #[serde(default = "default_max_consecutive_score")]
    pub max_consecutive_score: Option<usize>,
    /// Stop once the best raw score reaches this value (in the oracle's own
    /// "better" direction).
    #[serde(default)]
    pub break_score: Option<f64>,
    /// Number of repopulations that inject reseeded sequences once a
    /// hyperdiverse reset fires.
    #[serde(default = "default_hyperdiverse_generations")]
    pub hyperdiverse_generations: usize,
    /// Plateau length that triggers a hyperdiverse reset (repeats at every
    /// multiple).
    #[serde(default = "default_max_consecutive_hyperdiverse")]
    pub max_consecutive_hyperdiverse: Option<usize>,
    /// Fraction of the pool replaced by reseeded sequences during a reset.
    #[serde(default = "default_hyperdiverse_fraction")]
    pub hyperdiverse_fraction: f64,
    /// Number of best survivors copied unmutated into the next pool.
    #[serde(default)]
    pub elitism: usize,
    /// Random seed for reproducibility.
    #[serde(default)]
    pub random_seed: Option<u64>,
    /// Number of concurrent oracle calls (0 = one per CPU).
    #[serde(default)]
    pub parallel_workers: usize,
    /// Per-call oracle timeout in seconds.
    #[serde(default)]
    pub oracle_timeout_secs: Option<f64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            n_generations: default_generations(),
            n_pool: default_pool_size(),
            n_candidates: default_candidates(),
            mutation_rate: default_mutation_rate(),
            min_length: default_min_length(),
            max_consecutive_score: default_max_consecutive_score(),
            break_score: None,
            hyperdiverse_generations: default_hyperdiverse_generations(),
            max_consecutive_hyperdiverse: default_max_consecutive_hyperdiverse(),
            hyperdiverse_fraction: default_hyperdiverse_fraction(),
            elitism: 0,
            random_seed: None,
            parallel_workers: 0,
            oracle_timeout_secs: None,
        }
    }
}

fn default_generations() -> usize {
    100
}
fn default_pool_size() -> usize {
    100
}
fn default_candidates() -> usize {
    10
}
fn default_mutation_rate() -> f64 {
    0.1
}
fn default_min_length() -> usize {
    10
}
fn default_max_consecutive_score() -> Option<usize> {
    Some(10)
}
fn default_hyperdiverse_generations() -> usize {
    3
}
fn default_max_consecutive_hyperdiverse() -> Option<usize> {
    Some(10)
}
fn default_hyperdiverse_fraction() -> f64 {
    0.5
}

impl RunConfig {
    /// Offspring produced per survivor before topping up the pool.
    #[inline]
    pub fn offspring_per_survivor(&self) -> usize {
        self.n_pool / self.n_candidates.max(1)
    }

    /// Oracle timeout as a duration, if configured.
    ///
    /// Values `validate()` rejects map to `None`.
    pub fn oracle_timeout(&self) -> Option<Duration> {
        self.oracle_timeout_secs
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .filter(|limit| !limit.is_zero())
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_generations == 0 {
            return Err(ConfigError::InvalidGenerations);
        }
        if self.n_pool == 0 {
            return Err(ConfigError::InvalidPoolSize);
        }
        if self.n_candidates == 0 {
            return Err(ConfigError::InvalidCandidates);
        }
        if self.n_candidates > self.n_pool {
            return Err(ConfigError::CandidatesExceedPool {
                candidates: self.n_candidates,
                pool: self.n_pool,
            });
        }
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return Err(ConfigError::InvalidMutationRate(self.mutation_rate));
        }
        if self.min_length == 0 {
            return Err(ConfigError::InvalidMinLength);
        }
        if self.max_consecutive_score == Some(0) {
            return Err(ConfigError::InvalidPlateauLimit("max_consecutive_score"));
        }
        if self.max_consecutive_hyperdiverse == Some(0) {
            return Err(ConfigError::InvalidPlateauLimit(
                "max_consecutive_hyperdiverse",
            ));
        }
        if !(0.0..=1.0).contains(&self.hyperdiverse_fraction) {
            return Err(ConfigError::InvalidHyperdiverseFraction(
                self.hyperdiverse_fraction,
            ));
        }
        if self.elitism > self.n_candidates {
            return Err(ConfigError::ElitismExceedsCandidates {
                elitism: self.elitism,
                candidates: self.n_candidates,
            });
        }
        if let Some(score) = self.break_score
            && !score.is_finite()
        {
            return Err(ConfigError::InvalidBreakScore(score));
        }
        if let Some(secs) = self.oracle_timeout_secs
            && !Duration::try_from_secs_f64(secs).is_ok_and(|limit| !limit.is_zero())
        {
            return Err(ConfigError::InvalidTimeout(secs));
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Generation count must be positive")]
    InvalidGenerations,
    #[error("Pool size must be positive")]
    InvalidPoolSize,
    #[error("Candidate count must be positive")]
    InvalidCandidates,
    #[error("Candidate count {candidates} exceeds pool size {pool}")]
    CandidatesExceedPool { candidates: usize, pool: usize },
    #[error("Mutation rate {0} must be within [0, 1]")]
    InvalidMutationRate(f64),
    #[error("Minimum sequence length must be positive")]
    InvalidMinLength,
    #[error("{0} must be positive when set")]
    InvalidPlateauLimit(&'static str),
    #[error("Hyperdiverse fraction {0} must be within [0, 1]")]
    InvalidHyperdiverseFraction(f64),
    #[error("Elitism {elitism} exceeds candidate count {candidates}")]
    ElitismExceedsCandidates { elitism: usize, candidates: usize },
    #[error("Break score {0} must be finite")]
    InvalidBreakScore(f64),
    #[error("Oracle timeout {0}s must be a positive, representable duration")]
    InvalidTimeout(f64),
}
