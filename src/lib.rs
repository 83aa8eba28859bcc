//! Aptamer Evolve - Mutate-and-select search for stably folding aptamers.
//!
//! This crate explores the space of short nucleic-acid sequences seeded from
//! a reference set, keeping the candidates a fitness oracle (typically a
//! secondary-structure free-energy predictor) scores best.
//!
//! # Architecture
//!
//! The crate is split into three modules:
//!
//! - `schema`: Sequences, run configuration, and result types
//! - `compute`: The evolutionary loop and fitness oracles
//! - `io`: Reading reference sequences and writing candidates
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use aptamer_evolve::{
//!     schema::RunConfig,
//!     compute::evolution::StructureEnergyOracle,
//!     io::read_references,
//!     run_search,
//! };
//!
//! let references = read_references("aptamers.fasta").unwrap();
//! let config = RunConfig {
//!     n_generations: 50,
//!     n_pool: 100,
//!     n_candidates: 10,
//!     random_seed: Some(42),
//!     ..Default::default()
//! };
//!
//! let result = run_search(config, &references, Arc::new(StructureEnergyOracle::new())).unwrap();
//! for candidate in &result.candidates {
//!     println!("{} {:.2}", candidate.sequence(), candidate.raw_score());
//! }
//! ```

pub mod compute;
pub mod io;
pub mod schema;

// Re-export commonly used types
pub use compute::{EvolutionEngine, EvolutionError, FitnessOracle, run_search};
pub use schema::{ReferenceSequence, RunConfig, ScoredSequence, Sequence};
