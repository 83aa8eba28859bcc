//! Reference sequence reader.
//!
//! Accepts FASTA-style records:
//! ```text
//! >apt1 thrombin binder
//! GGTTGGTGTGGTTGG
//! >apt2
//! GGGAGACAAGAATAAACGCTCAA
//! TTCGGTGAAA
//! ```
//! The identifier is the first whitespace-separated token of the header and
//! sequence lines are concatenated until the next header.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use crate::schema::{ReferenceSequence, SequenceError};

/// Errors raised while reading references.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Line {line}: sequence data before any '>' header")]
    MissingHeader { line: usize },
    #[error("Line {line}: empty header")]
    EmptyHeader { line: usize },
    #[error("Record {id}: {source}")]
    InvalidSequence {
        id: String,
        #[source]
        source: SequenceError,
    },
    #[error("No sequences found")]
    Empty,
}

/// Read references from a file.
pub fn read_references(path: impl AsRef<Path>) -> Result<Vec<ReferenceSequence>, ReadError> {
    let file = File::open(path)?;
    parse_references(BufReader::new(file))
}

/// Parse references from any buffered reader.
pub fn parse_references<R: BufRead>(reader: R) -> Result<Vec<ReferenceSequence>, ReadError> {
    let mut records = Vec::new();
    let mut current: Option<(String, String)> = None;

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(header) = line.strip_prefix('>') {
            if let Some(record) = current.take() {
                records.push(finish_record(record)?);
            }
            let id = header
                .split_whitespace()
                .next()
                .ok_or(ReadError::EmptyHeader { line: i + 1 })?;
            current = Some((id.to_string(), String::new()));
        } else {
            match current.as_mut() {
                Some((_, seq)) => seq.push_str(line),
                None => return Err(ReadError::MissingHeader { line: i + 1 }),
            }
        }
    }

    if let Some(record) = current {
        records.push(finish_record(record)?);
    }

    if records.is_empty() {
        return Err(ReadError::Empty);
    }
    Ok(records)
}

fn finish_record((id, raw): (String, String)) -> Result<ReferenceSequence, ReadError> {
    match raw.parse() {
        Ok(sequence) => Ok(ReferenceSequence { id, sequence }),
        Err(source) => Err(ReadError::InvalidSequence { id, source }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_multiline_records() {
        let input = ">apt1 thrombin binder\nGGTTGGTGTGGTTGG\n\n>apt2\nGGGAGACAAG\nAAUAAACG\n";
        let records = parse_references(input.as_bytes()).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "apt1");
        assert_eq!(records[0].sequence.to_string(), "GGTTGGTGTGGTTGG");
        assert_eq!(records[1].id, "apt2");
        assert_eq!(records[1].sequence.to_string(), "GGGAGACAAGAATAAACG");
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            parse_references("ACGT\n".as_bytes()),
            Err(ReadError::MissingHeader { line: 1 })
        ));
        assert!(matches!(
            parse_references(">\nACGT\n".as_bytes()),
            Err(ReadError::EmptyHeader { line: 1 })
        ));
        assert!(matches!(
            parse_references("".as_bytes()),
            Err(ReadError::Empty)
        ));
        match parse_references(">bad\nACNT\n".as_bytes()) {
            Err(ReadError::InvalidSequence { id, .. }) => assert_eq!(id, "bad"),
            other => panic!("unexpected: {:?}", other),
        }
        // A header without sequence lines is an empty sequence.
        assert!(matches!(
            parse_references(">lonely\n".as_bytes()),
            Err(ReadError::InvalidSequence {
                source: SequenceError::Empty,
                ..
            })
        ));
    }

    #[test]
    fn test_read_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, ">r1\nACGTACGTAC\n>r2\nTTTTGGGGCC").unwrap();

        let records = read_references(file.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].sequence.len(), 10);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            read_references("/nonexistent/refs.fasta"),
            Err(ReadError::Io(_))
        ));
    }
}
