//! Nucleotide alphabet and immutable sequence types.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A nucleotide symbol.
///
/// RNA input is accepted by mapping `U` onto `T`; sequences always render
/// with DNA letters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Nucleotide {
    A = 0,
    C = 1,
    G = 2,
    T = 3,
}

impl Nucleotide {
    /// All symbols, in index order.
    pub const ALL: [Nucleotide; 4] = [Self::A, Self::C, Self::G, Self::T];

    /// Convert from index (0-3).
    #[inline]
    pub const fn from_index(idx: u8) -> Option<Self> {
        match idx {
            0 => Some(Self::A),
            1 => Some(Self::C),
            2 => Some(Self::G),
            3 => Some(Self::T),
            _ => None,
        }
    }

    /// Convert from an ASCII byte. Case-insensitive, `U` reads as `T`.
    #[inline]
    pub const fn from_ascii(byte: u8) -> Option<Self> {
        match byte {
            b'A' | b'a' => Some(Self::A),
            b'C' | b'c' => Some(Self::C),
            b'G' | b'g' => Some(Self::G),
            b'T' | b't' | b'U' | b'u' => Some(Self::T),
            _ => None,
        }
    }

    #[inline]
    pub const fn to_char(self) -> char {
        match self {
            Self::A => 'A',
            Self::C => 'C',
            Self::G => 'G',
            Self::T => 'T',
        }
    }

    /// True for G and C.
    #[inline]
    pub const fn is_strong(self) -> bool {
        matches!(self, Self::G | Self::C)
    }
}

impl fmt::Display for Nucleotide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_char())
    }
}

/// Errors raised when building a [`Sequence`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SequenceError {
    #[error("Sequence must contain at least one nucleotide")]
    Empty,
    #[error("Invalid nucleotide '{symbol}' at position {position}")]
    InvalidSymbol { symbol: char, position: usize },
}

/// An immutable nucleotide sequence with at least one symbol.
///
/// Cloning is cheap (shared storage); mutation always builds a new value.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Sequence {
    bases: Arc<[Nucleotide]>,
}

impl Sequence {
    /// Create a sequence from nucleotides.
    pub fn new(bases: Vec<Nucleotide>) -> Result<Self, SequenceError> {
        if bases.is_empty() {
            return Err(SequenceError::Empty);
        }
        Ok(Self {
            bases: bases.into(),
        })
    }

    /// Build from bases already known to be non-empty, e.g. a
    /// length-preserving edit of an existing sequence.
    pub(crate) fn from_nonempty(bases: Vec<Nucleotide>) -> Self {
        debug_assert!(!bases.is_empty());
        Self {
            bases: bases.into(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bases.len()
    }

    /// Always false; kept for API symmetry with collections.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[Nucleotide] {
        &self.bases
    }

    /// Fraction of G and C symbols (0.0-1.0).
    pub fn gc_content(&self) -> f64 {
        let strong = self.bases.iter().filter(|b| b.is_strong()).count();
        strong as f64 / self.len() as f64
    }

    /// Count non-overlapping occurrences of `motif`, scanning left to right.
    ///
    /// Returns 0 for an empty or unparseable motif.
    pub fn count_motif(&self, motif: &str) -> usize {
        let pattern: Option<Vec<Nucleotide>> =
            motif.bytes().map(Nucleotide::from_ascii).collect();
        let Some(pattern) = pattern.filter(|p| !p.is_empty()) else {
            return 0;
        };

        let mut count = 0;
        let mut i = 0;
        while i + pattern.len() <= self.len() {
            if self.bases[i..i + pattern.len()] == pattern[..] {
                count += 1;
                i += pattern.len();
            } else {
                i += 1;
            }
        }
        count
    }
}

impl FromStr for Sequence {
    type Err = SequenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bases = s
            .trim()
            .chars()
            .enumerate()
            .map(|(position, symbol)| {
                u8::try_from(symbol)
                    .ok()
                    .and_then(Nucleotide::from_ascii)
                    .ok_or(SequenceError::InvalidSymbol { symbol, position })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(bases)
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for base in self.bases.iter() {
            write!(f, "{}", base.to_char())?;
        }
        Ok(())
    }
}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sequence({})", self)
    }
}

impl Serialize for Sequence {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Sequence {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A sequence paired with the fitness it was assigned.
///
/// `fitness` is normalized so that lower is better; `raw_score` is the value
/// the oracle returned in its own convention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredSequence {
    sequence: Sequence,
    fitness: f64,
    raw_score: f64,
}

impl ScoredSequence {
    pub fn new(sequence: Sequence, fitness: f64, raw_score: f64) -> Self {
        Self {
            sequence,
            fitness,
            raw_score,
        }
    }

    pub fn sequence(&self) -> &Sequence {
        &self.sequence
    }

    /// Normalized fitness (lower is better).
    pub fn fitness(&self) -> f64 {
        self.fitness
    }

    /// Score as reported by the oracle.
    pub fn raw_score(&self) -> f64 {
        self.raw_score
    }
}

/// One generation's candidates, always exactly `n_pool` long.
pub type SequencePool = Vec<Sequence>;

/// A named reference sequence used to seed the search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceSequence {
    /// Record identifier (first header token).
    pub id: String,
    /// Parsed sequence.
    pub sequence: Sequence,
}
