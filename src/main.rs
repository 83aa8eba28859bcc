//! Aptamer Evolve CLI - Run an aptamer search from reference sequences.

use std::error::Error;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};

use aptamer_evolve::{
    compute::evolution::{
        CompositionOracle, EvolutionEngine, FitnessOracle, GcPairOracle, HybridizationOracle,
        StructureEnergyOracle, WeightedOracle,
    },
    io::{read_references, write_fasta, write_json},
    schema::{RunConfig, Sequence},
};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Evolve aptamer candidates that fold into low-energy secondary structures."
)]
struct Cli {
    /// Reference sequences in FASTA format.
    #[arg(value_name = "FASTA", required_unless_present = "example_config")]
    references: Option<PathBuf>,

    /// Run configuration in JSON format. Flags below override its values.
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Number of generations.
    #[arg(short = 'g', long, value_name = "NUM")]
    generations: Option<usize>,

    /// Pool size per generation.
    #[arg(short, long, value_name = "NUM")]
    pool: Option<usize>,

    /// Number of survivors and final candidates.
    #[arg(short = 'n', long, value_name = "NUM")]
    candidates: Option<usize>,

    /// Per-base mutation probability.
    #[arg(short, long, value_name = "FLOAT")]
    mutation_rate: Option<f64>,

    /// Random seed for a reproducible run.
    #[arg(short, long, value_name = "NUM")]
    seed: Option<u64>,

    /// Concurrent oracle calls (0 = one per CPU).
    #[arg(short = 'j', long, value_name = "NUM")]
    workers: Option<usize>,

    /// Per-call oracle timeout in seconds.
    #[arg(long, value_name = "SECS")]
    timeout: Option<f64>,

    /// Fitness oracle to score sequences with.
    #[arg(long, value_enum, default_value_t = OracleKind::Rnafold)]
    oracle: OracleKind,

    /// Also score hybridization against this target with RNAhybrid.
    #[arg(long, value_name = "SEQUENCE")]
    hybrid_target: Option<String>,

    /// Weight of the hybridization energy relative to folding energy.
    #[arg(long, value_name = "FLOAT", default_value_t = 1.0)]
    hybrid_weight: f64,

    /// Write ranked candidates as FASTA.
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Write candidates, statistics and history as JSON.
    #[arg(long, value_name = "PATH")]
    json: Option<PathBuf>,

    /// Print a default JSON configuration and exit.
    #[arg(long)]
    example_config: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum OracleKind {
    /// Folding free energy from RNAfold.
    Rnafold,
    /// GC content and repeat heuristic (no external tools).
    Composition,
    /// Count of GC dinucleotides (no external tools).
    GcPairs,
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        let mut source = e.source();
        while let Some(cause) = source {
            eprintln!("  caused by: {}", cause);
            source = cause.source();
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    if cli.example_config {
        println!("{}", serde_json::to_string_pretty(&RunConfig::default())?);
        return Ok(());
    }

    let config = build_config(&cli)?;
    config.validate()?;

    let references_path = cli
        .references
        .as_ref()
        .ok_or("missing reference FASTA path")?;
    let references = read_references(references_path)?;
    let oracle = build_oracle(&cli, &config)?;

    println!("Aptamer Evolve");
    println!("==============");
    println!(
        "References: {} ({})",
        references.len(),
        references_path.display()
    );
    println!("Oracle: {}", oracle.name());
    println!(
        "Pool: {}, candidates: {}, generations: {}, mutation rate: {}",
        config.n_pool, config.n_candidates, config.n_generations, config.mutation_rate
    );
    println!();

    let mut engine = EvolutionEngine::new(config, oracle);
    println!("Seed: {}", engine.random_seed());
    let result = engine.run_with_callback(&references, |progress| {
        println!(
            "  Generation {}/{}: best={:.3}, mean={:.3}, plateau={}{}",
            progress.generation + 1,
            progress.total_generations,
            progress.generation_best,
            progress.avg_fitness,
            progress.stagnation_count,
            if progress.hyperdiverse {
                " (hyperdiverse)"
            } else {
                ""
            }
        );
    })?;

    println!();
    println!(
        "Stopped after {} generations ({:?}), {} evaluations in {:.2}s ({:.1} evals/s)",
        result.stats.generations,
        result.stats.stop_reason,
        result.stats.total_evaluations,
        result.stats.elapsed_seconds,
        result.stats.evaluations_per_second
    );
    println!();
    println!("Candidates:");
    for (rank, candidate) in result.candidates.iter().enumerate() {
        println!(
            "  {:>3}. {}  score={:.3}",
            rank + 1,
            candidate.sequence(),
            candidate.raw_score()
        );
    }

    if let Some(path) = &cli.output {
        write_fasta(BufWriter::new(File::create(path)?), &result.candidates)?;
        println!("Wrote {}", path.display());
    }
    if let Some(path) = &cli.json {
        write_json(BufWriter::new(File::create(path)?), &result)?;
        println!("Wrote {}", path.display());
    }

    Ok(())
}

/// Load the JSON config (if any) and apply flag overrides.
fn build_config(cli: &Cli) -> Result<RunConfig, Box<dyn Error>> {
    let mut config = match &cli.config {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => RunConfig::default(),
    };

    if let Some(n) = cli.generations {
        config.n_generations = n;
    }
    if let Some(n) = cli.pool {
        config.n_pool = n;
    }
    if let Some(n) = cli.candidates {
        config.n_candidates = n;
    }
    if let Some(rate) = cli.mutation_rate {
        config.mutation_rate = rate;
    }
    if let Some(seed) = cli.seed {
        config.random_seed = Some(seed);
    }
    if let Some(workers) = cli.workers {
        config.parallel_workers = workers;
    }
    if let Some(secs) = cli.timeout {
        config.oracle_timeout_secs = Some(secs);
    }
    Ok(config)
}

fn build_oracle(cli: &Cli, config: &RunConfig) -> Result<Arc<dyn FitnessOracle>, Box<dyn Error>> {
    let timeout = config.oracle_timeout();

    let base: Arc<dyn FitnessOracle> = match cli.oracle {
        OracleKind::Rnafold => {
            let oracle = StructureEnergyOracle::new();
            Arc::new(match timeout {
                Some(limit) => oracle.with_timeout(limit),
                None => oracle,
            })
        }
        OracleKind::Composition => Arc::new(CompositionOracle),
        OracleKind::GcPairs => Arc::new(GcPairOracle),
    };

    let Some(target) = &cli.hybrid_target else {
        return Ok(base);
    };

    let target: Sequence = target.parse()?;
    let hybrid = HybridizationOracle::new(target);
    let hybrid = match timeout {
        Some(limit) => hybrid.with_timeout(limit),
        None => hybrid,
    };

    Ok(Arc::new(
        WeightedOracle::new()
            .with(base, 1.0)
            .with(Arc::new(hybrid), cli.hybrid_weight),
    ))
}
