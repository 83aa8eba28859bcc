//! Quick search performance test

use std::sync::Arc;
use std::time::{Duration, Instant};

use aptamer_evolve::{
    EvolutionEngine, ReferenceSequence, RunConfig,
    compute::evolution::{CompositionOracle, FitnessOracle, FnOracle, GcPairOracle},
    schema::Sequence,
};

fn main() {
    println!("=== Search Performance Test ===\n");

    let references: Vec<ReferenceSequence> = [
        "GGTTGGTGTGGTTGGAACC",
        "GGGAGACAAGAATAAACGCTCAA",
        "ATACCAGCTTATTCAATTAGG",
        "TTAGGGTTAGGGTTAGGGTTAGGG",
    ]
    .iter()
    .enumerate()
    .map(|(i, raw)| ReferenceSequence {
        id: format!("ref{}", i + 1),
        sequence: raw.parse().expect("valid reference"),
    })
    .collect();

    // A slow oracle stands in for an external folding tool.
    let slow: Arc<dyn FitnessOracle> = Arc::new(FnOracle::new("gc-pairs+2ms", |s: &Sequence| {
        std::thread::sleep(Duration::from_millis(2));
        GcPairOracle.evaluate(s)
    }));
    let oracles: Vec<Arc<dyn FitnessOracle>> =
        vec![Arc::new(GcPairOracle), Arc::new(CompositionOracle), slow];

    for oracle in oracles {
        for workers in [1, 4, 8] {
            println!("Oracle: {}, workers: {}", oracle.name(), workers);

            let config = RunConfig {
                n_generations: 20,
                n_pool: 100,
                n_candidates: 10,
                max_consecutive_score: None,
                parallel_workers: workers,
                random_seed: Some(42),
                ..Default::default()
            };

            let start = Instant::now();
            let mut engine = EvolutionEngine::new(config, Arc::clone(&oracle));
            let result = match engine.run(&references) {
                Ok(result) => result,
                Err(e) => {
                    println!("  Failed: {}\n", e);
                    continue;
                }
            };
            let elapsed = start.elapsed();

            let total_evals = result.stats.total_evaluations;
            let evals_per_sec = total_evals as f64 / elapsed.as_secs_f64();

            println!("  Generations:    {}", result.stats.generations);
            println!("  Evaluations:    {}", total_evals);
            println!("  Elapsed:        {:.2}s", elapsed.as_secs_f64());
            println!("  Evals/sec:      {:.1}", evals_per_sec);
            println!("  Best fitness:   {:.4}", result.stats.best_fitness_overall);
            if let Some(best) = result.best() {
                println!("  Best sequence:  {}", best.sequence());
            }
            println!();
        }
    }
}
