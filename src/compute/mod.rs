//! Compute module - Evolutionary search over nucleotide sequences.

pub mod evolution;

pub use evolution::{EvolutionEngine, EvolutionError, FitnessOracle, run_search};
