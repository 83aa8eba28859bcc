//! Fitness oracle implementations for evolutionary aptamer search.
//!
//! An oracle maps a sequence to a scalar score. The engine only relies on
//! the [`FitnessOracle`] trait; built-in implementations cover external
//! folding tools, simple composition heuristics, and deterministic test
//! oracles.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::schema::Sequence;

/// Which way an oracle's raw scores improve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FitnessDirection {
    /// Energy-style scores: more negative is better.
    #[default]
    LowerIsBetter,
    /// Quality-style scores: larger is better.
    HigherIsBetter,
}

impl FitnessDirection {
    /// Map a raw score onto the engine's lower-is-better scale.
    #[inline]
    pub fn normalize(self, raw: f64) -> f64 {
        match self {
            Self::LowerIsBetter => raw,
            Self::HigherIsBetter => -raw,
        }
    }

    /// Whether `raw` is at least as good as `threshold`.
    #[inline]
    pub fn reaches(self, raw: f64, threshold: f64) -> bool {
        match self {
            Self::LowerIsBetter => raw <= threshold,
            Self::HigherIsBetter => raw >= threshold,
        }
    }
}

/// Errors raised while scoring a sequence.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("I/O error talking to oracle: {0}")]
    Io(#[from] io::Error),
    #[error("{program} exited with {status}: {stderr}")]
    ExitStatus {
        program: String,
        status: String,
        stderr: String,
    },
    #[error("Could not parse oracle output: {0}")]
    Parse(String),
    #[error("Oracle returned non-finite score {0}")]
    NonFinite(f64),
    #[error("Oracle call exceeded {0:?}")]
    Timeout(Duration),
    #[error("{0}")]
    Other(String),
}

/// Scores sequences. Implementations must be safe to call from several
/// threads at once.
pub trait FitnessOracle: Send + Sync {
    /// Score one sequence. May block.
    fn evaluate(&self, sequence: &Sequence) -> Result<f64, OracleError>;

    /// Direction in which raw scores improve.
    fn direction(&self) -> FitnessDirection {
        FitnessDirection::LowerIsBetter
    }

    /// Short name used in logs and reports.
    fn name(&self) -> &str;
}

impl<T: FitnessOracle + ?Sized> FitnessOracle for Arc<T> {
    fn evaluate(&self, sequence: &Sequence) -> Result<f64, OracleError> {
        (**self).evaluate(sequence)
    }

    fn direction(&self) -> FitnessDirection {
        (**self).direction()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Call the oracle and reject non-finite scores.
pub fn score_checked(oracle: &dyn FitnessOracle, sequence: &Sequence) -> Result<f64, OracleError> {
    let raw = oracle.evaluate(sequence)?;
    if raw.is_finite() {
        Ok(raw)
    } else {
        Err(OracleError::NonFinite(raw))
    }
}

// ============================================================================
// External tools
// ============================================================================

/// Free energy of the predicted secondary structure, computed by an external
/// folding tool (RNAfold by default).
///
/// The sequence is written to the tool's stdin; the energy is read from the
/// trailing `(-4.20)` of the structure line.
#[derive(Debug, Clone)]
pub struct StructureEnergyOracle {
    program: PathBuf,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl Default for StructureEnergyOracle {
    fn default() -> Self {
        Self {
            program: PathBuf::from("RNAfold"),
            args: vec!["--noPS".to_string()],
            timeout: None,
        }
    }
}

impl StructureEnergyOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different executable.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Replace the command line arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Kill the tool if it runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl FitnessOracle for StructureEnergyOracle {
    fn evaluate(&self, sequence: &Sequence) -> Result<f64, OracleError> {
        let input = format!("{}\n", sequence);
        let output = run_tool(&self.program, &self.args, Some(&input), self.timeout)?;
        parse_dot_bracket_energy(&output)
    }

    fn name(&self) -> &str {
        "structure-energy"
    }
}

/// Minimum hybridization energy between a candidate and a fixed target,
/// computed by RNAhybrid.
#[derive(Debug, Clone)]
pub struct HybridizationOracle {
    program: PathBuf,
    target: Sequence,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl HybridizationOracle {
    pub fn new(target: Sequence) -> Self {
        Self {
            program: PathBuf::from("RNAhybrid"),
            target,
            args: vec!["-s".to_string(), "3utr_human".to_string()],
            timeout: None,
        }
    }

    /// Use a different executable.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Kill the tool if it runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl FitnessOracle for HybridizationOracle {
    fn evaluate(&self, sequence: &Sequence) -> Result<f64, OracleError> {
        let mut args = self.args.clone();
        args.push(self.target.to_string());
        args.push(sequence.to_string());
        let output = run_tool(&self.program, &args, None, self.timeout)?;
        parse_hybrid_mfe(&output)
    }

    fn name(&self) -> &str {
        "hybridization"
    }
}

/// Run an external program to completion and return its stdout.
fn run_tool(
    program: &Path,
    args: &[String],
    input: Option<&str>,
    timeout: Option<Duration>,
) -> Result<String, OracleError> {
    let program_name = program.display().to_string();
    let mut child = Command::new(program)
        .args(args)
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| OracleError::Spawn {
            program: program_name.clone(),
            source,
        })?;

    // Drain pipes on their own threads so a chatty tool cannot block on a
    // full pipe while we write its input or wait for it.
    let stdout = spawn_reader(child.stdout.take());
    let stderr = spawn_reader(child.stderr.take());

    if let (Some(input), Some(mut stdin)) = (input, child.stdin.take()) {
        match stdin.write_all(input.as_bytes()) {
            // The tool exited without reading; its exit status tells the story.
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {}
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(OracleError::Io(e));
            }
            Ok(()) => {}
        }
    }

    let status = match timeout {
        Some(limit) => match wait_with_deadline(&mut child, limit)? {
            Some(status) => status,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(OracleError::Timeout(limit));
            }
        },
        None => child.wait()?,
    };

    let stdout = join_reader(stdout)?;
    let stderr = join_reader(stderr)?;

    if !status.success() {
        return Err(OracleError::ExitStatus {
            program: program_name,
            status: status.to_string(),
            stderr: stderr.trim().to_string(),
        });
    }
    Ok(stdout)
}

fn spawn_reader<R: Read + Send + 'static>(
    pipe: Option<R>,
) -> Option<thread::JoinHandle<io::Result<String>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = String::new();
            pipe.read_to_string(&mut buf)?;
            Ok(buf)
        })
    })
}

fn join_reader(
    handle: Option<thread::JoinHandle<io::Result<String>>>,
) -> Result<String, OracleError> {
    match handle {
        Some(handle) => handle
            .join()
            .map_err(|_| OracleError::Other("pipe reader panicked".to_string()))?
            .map_err(OracleError::Io),
        None => Ok(String::new()),
    }
}

/// Poll the child until it exits or `limit` elapses.
fn wait_with_deadline(
    child: &mut Child,
    limit: Duration,
) -> io::Result<Option<std::process::ExitStatus>> {
    let deadline = Instant::now() + limit;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(Duration::from_millis(5));
    }
}

/// Extract the energy from folding output.
///
/// Looks for the last line ending in a parenthesized number, e.g.
/// `((((...))))  (-4.20)`.
pub fn parse_dot_bracket_energy(output: &str) -> Result<f64, OracleError> {
    output
        .lines()
        .rev()
        .find_map(|line| {
            let line = line.trim_end();
            let inner = line.strip_suffix(')')?;
            let open = inner.rfind('(')?;
            inner[open + 1..].trim().parse::<f64>().ok()
        })
        .ok_or_else(|| OracleError::Parse(format!("no energy value in {:?}", output.trim())))
}

/// Extract `mfe: <value> kcal/mol` from RNAhybrid output.
pub fn parse_hybrid_mfe(output: &str) -> Result<f64, OracleError> {
    output
        .lines()
        .find_map(|line| {
            let (_, rest) = line.split_once("mfe:")?;
            rest.split_whitespace().next()?.parse::<f64>().ok()
        })
        .ok_or_else(|| OracleError::Parse(format!("no mfe value in {:?}", output.trim())))
}

// ============================================================================
// Composite and heuristic oracles
// ============================================================================

/// Weighted sum of several oracles, each normalized to lower-is-better.
pub struct WeightedOracle {
    components: Vec<(Arc<dyn FitnessOracle>, f64)>,
}

impl WeightedOracle {
    pub fn new() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    /// Add a component with the given weight.
    pub fn with(mut self, oracle: Arc<dyn FitnessOracle>, weight: f64) -> Self {
        self.components.push((oracle, weight));
        self
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl Default for WeightedOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl FitnessOracle for WeightedOracle {
    fn evaluate(&self, sequence: &Sequence) -> Result<f64, OracleError> {
        if self.components.is_empty() {
            return Err(OracleError::Other("weighted oracle has no components".to_string()));
        }
        let mut total = 0.0;
        for (oracle, weight) in &self.components {
            let raw = score_checked(oracle.as_ref(), sequence)?;
            total += weight * oracle.direction().normalize(raw);
        }
        Ok(total)
    }

    fn name(&self) -> &str {
        "weighted"
    }
}

/// Rewards `GC` dinucleotides: score is minus their non-overlapping count.
#[derive(Debug, Clone, Copy, Default)]
pub struct GcPairOracle;

impl FitnessOracle for GcPairOracle {
    fn evaluate(&self, sequence: &Sequence) -> Result<f64, OracleError> {
        Ok(-(sequence.count_motif("GC") as f64))
    }

    fn name(&self) -> &str {
        "gc-pairs"
    }
}

/// Composition heuristic: balanced GC content without repeated 4-mers.
///
/// Score is `gc_score * repeat_score` in (0, 1], higher is better.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompositionOracle;

impl CompositionOracle {
    /// `1 - |0.5 - gc|`, peaking at 50% GC.
    pub fn gc_score(sequence: &Sequence) -> f64 {
        1.0 - (0.5 - sequence.gc_content()).abs()
    }

    /// Fraction of 4-mer windows that do not recur elsewhere, floored at 0.1.
    pub fn repeat_score(sequence: &Sequence) -> f64 {
        let n = sequence.len();
        if n <= 4 {
            return 1.0;
        }
        let text = sequence.to_string();
        let windows = n - 3;
        let repeats = (0..windows)
            .filter(|&i| sequence.count_motif(&text[i..i + 4]) > 1)
            .count();
        (1.0 - repeats as f64 / windows as f64).max(0.1)
    }
}

impl FitnessOracle for CompositionOracle {
    fn evaluate(&self, sequence: &Sequence) -> Result<f64, OracleError> {
        Ok(Self::gc_score(sequence) * Self::repeat_score(sequence))
    }

    fn direction(&self) -> FitnessDirection {
        FitnessDirection::HigherIsBetter
    }

    fn name(&self) -> &str {
        "composition"
    }
}

/// Adapter turning a closure into an oracle.
pub struct FnOracle<F> {
    name: String,
    direction: FitnessDirection,
    f: F,
}

impl<F> FnOracle<F>
where
    F: Fn(&Sequence) -> Result<f64, OracleError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            direction: FitnessDirection::LowerIsBetter,
            f,
        }
    }

    pub fn with_direction(mut self, direction: FitnessDirection) -> Self {
        self.direction = direction;
        self
    }
}

impl<F> FitnessOracle for FnOracle<F>
where
    F: Fn(&Sequence) -> Result<f64, OracleError> + Send + Sync,
{
    fn evaluate(&self, sequence: &Sequence) -> Result<f64, OracleError> {
        (self.f)(sequence)
    }

    fn direction(&self) -> FitnessDirection {
        self.direction
    }

    fn name(&self) -> &str {
        &self.name
    }
}
