//! Schema module - Sequence, configuration, and result types for aptamer search.

mod config;
mod evolution;
mod sequence;

pub use config::*;
pub use evolution::*;
pub use sequence::*;
