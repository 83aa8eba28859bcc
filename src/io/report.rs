//! Writers for final candidates.

use std::io::{self, Write};

use crate::schema::{EvolutionResult, ScoredSequence};

/// Write candidates as FASTA, best first.
///
/// Headers carry the rank and the oracle's raw score:
/// `>candidate_1 score=-12.300`.
pub fn write_fasta<W: Write>(mut writer: W, candidates: &[ScoredSequence]) -> io::Result<()> {
    for (rank, candidate) in candidates.iter().enumerate() {
        writeln!(
            writer,
            ">candidate_{} score={:.3}",
            rank + 1,
            candidate.raw_score()
        )?;
        writeln!(writer, "{}", candidate.sequence())?;
    }
    Ok(())
}

/// Write the full result (candidates, stats, history) as pretty JSON.
pub fn write_json<W: Write>(writer: W, result: &EvolutionResult) -> io::Result<()> {
    serde_json::to_writer_pretty(writer, result).map_err(io::Error::from)
}
