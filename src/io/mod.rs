//! IO module - Reference input and candidate output.

mod fasta;
mod report;

pub use fasta::*;
pub use report::*;
