//! Evolutionary search for stably folding aptamer sequences.
//!
//! # Overview
//!
//! The search consists of:
//!
//! - **Genome Operations** (`genome`): Pool seeding and per-base mutation
//! - **Fitness Oracles** (`fitness`): Pluggable sequence scoring
//! - **Dispatch** (`dispatch`): Bounded concurrent oracle calls with timeouts
//! - **Selection** (`selection`): Ranking and truncation of a generation
//! - **Search Loop** (`search`): Seeding, evaluation, selection, repopulation
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use aptamer_evolve::schema::{ReferenceSequence, RunConfig};
//! use aptamer_evolve::compute::evolution::{EvolutionEngine, StructureEnergyOracle};
//!
//! let references = vec![ReferenceSequence {
//!     id: "apt1".to_string(),
//!     sequence: "GGGAGACAAGAATAAACGCTCAA".parse().unwrap(),
//! }];
//!
//! let mut engine = EvolutionEngine::new(RunConfig::default(), Arc::new(StructureEnergyOracle::new()));
//! let result = engine.run_with_callback(&references, |progress| {
//!     println!("Generation {}: best fitness = {:.3}",
//!         progress.generation, progress.best_fitness);
//! }).unwrap();
//!
//! for candidate in &result.candidates {
//!     println!("{} {:.2}", candidate.sequence(), candidate.raw_score());
//! }
//! ```
//!
//! Scores are normalized so that lower is better: oracles reporting
//! higher-is-better values are negated before ranking.

mod dispatch;
mod fitness;
mod genome;
mod search;
mod selection;

pub use dispatch::{DispatchError, Evaluator};
pub use fitness::{
    CompositionOracle, FitnessDirection, FitnessOracle, FnOracle, GcPairOracle,
    HybridizationOracle, OracleError, StructureEnergyOracle, WeightedOracle,
    parse_dot_bracket_energy, parse_hybrid_mfe, score_checked,
};
pub use genome::{GenomeRng, hamming_distance};
pub use search::{EvolutionEngine, EvolutionError, run_search};
pub use selection::{GenerationResult, extract_candidates, select_survivors};
