//! Progress and result types produced by an evolutionary run.

use serde::{Deserialize, Serialize};

use super::ScoredSequence;

/// Progress update emitted after every evaluated generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionProgress {
    /// Generation just evaluated (0-based).
    pub generation: usize,
    /// Total generations planned.
    pub total_generations: usize,
    /// Best normalized fitness seen so far.
    pub best_fitness: f64,
    /// Best normalized fitness in this generation.
    pub generation_best: f64,
    /// Mean normalized fitness of this generation.
    pub avg_fitness: f64,
    /// Generations since the best fitness last improved.
    pub stagnation_count: usize,
    /// Whether the next repopulation injects reseeded sequences.
    pub hyperdiverse: bool,
    /// Top candidates of this generation.
    pub top_candidates: Vec<ScoredSequence>,
    /// Current phase of the run.
    pub phase: EvolutionPhase,
}

/// Per-generation statistics kept for reporting.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EvolutionHistory {
    /// Best fitness per generation.
    pub best_fitness: Vec<f64>,
    /// Average fitness per generation.
    pub avg_fitness: Vec<f64>,
    /// Standard deviation per generation.
    pub fitness_std: Vec<f64>,
    /// Fraction of distinct sequences per generation.
    pub diversity: Vec<f64>,
    /// Generations whose repopulation injected reseeded sequences.
    pub hyperdiverse_generations: Vec<usize>,
}

/// Phase of the evolutionary loop.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum EvolutionPhase {
    /// Building the initial pool from references.
    #[default]
    Seeding,
    /// Scoring every pool member.
    Evaluating,
    /// Ranking and truncating to survivors.
    Selecting,
    /// Expanding survivors back to a full pool.
    Repopulating,
    /// Loop exited.
    Terminated,
}

/// Final result of a completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionResult {
    /// Best candidates of the last generation, best first.
    pub candidates: Vec<ScoredSequence>,
    /// Statistics from the run.
    pub stats: EvolutionStats,
    /// Full history for analysis.
    pub history: EvolutionHistory,
}

impl EvolutionResult {
    /// Best candidate of the run.
    pub fn best(&self) -> Option<&ScoredSequence> {
        self.candidates.first()
    }
}

/// Statistics from an evolution run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionStats {
    /// Generations evaluated.
    pub generations: usize,
    /// Oracle calls made.
    pub total_evaluations: u64,
    /// Best normalized fitness of the final generation.
    pub best_fitness: f64,
    /// Best normalized fitness seen across all generations.
    pub best_fitness_overall: f64,
    /// Average fitness of the final generation.
    pub final_avg_fitness: f64,
    /// Time taken (in seconds).
    pub elapsed_seconds: f64,
    /// Evaluations per second.
    pub evaluations_per_second: f64,
    /// Reason for stopping.
    pub stop_reason: StopReason,
    /// Seed the run's generator was built from.
    pub random_seed: u64,
}

/// Reason a run stopped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StopReason {
    /// Reached the configured generation count.
    MaxGenerations,
    /// Best score crossed the break score.
    TargetReached,
    /// Best fitness plateaued.
    Plateau,
}
