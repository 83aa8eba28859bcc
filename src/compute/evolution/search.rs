//! The evolutionary loop: seed, evaluate, select, repopulate.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use crate::schema::{
    ConfigError, EvolutionHistory, EvolutionPhase, EvolutionProgress, EvolutionResult,
    EvolutionStats, ReferenceSequence, RunConfig, Sequence, SequencePool, StopReason,
};

use super::dispatch::{DispatchError, Evaluator};
use super::fitness::{FitnessDirection, FitnessOracle, OracleError};
use super::genome::GenomeRng;
use super::selection::{GenerationResult, extract_candidates, select_survivors};

/// Errors that abort a run. No partial result is produced.
#[derive(Debug, thiserror::Error)]
pub enum EvolutionError {
    #[error("Invalid run configuration: {0}")]
    Configuration(#[from] ConfigError),
    #[error("No usable reference sequences")]
    EmptyInput,
    #[error("Oracle failed on {sequence}: {source}")]
    OracleEvaluation {
        sequence: Sequence,
        #[source]
        source: OracleError,
    },
    #[error("Cannot select {requested} survivors from {available} sequences")]
    InsufficientPool { requested: usize, available: usize },
    #[error("Run cancelled after {generation} generations")]
    Cancelled { generation: usize },
    #[error("Failed to start oracle workers: {0}")]
    WorkerPool(String),
}

/// Evolution engine that runs the search.
pub struct EvolutionEngine {
    config: RunConfig,
    oracle: Arc<dyn FitnessOracle>,
    rng: GenomeRng,
    random_seed: u64,
    history: EvolutionHistory,
    generation: usize,
    best_fitness: f64,
    stagnation_count: usize,
    hyperdiverse_remaining: usize,
    evaluations: u64,
    phase: EvolutionPhase,
    cancelled: Arc<AtomicBool>,
}

impl EvolutionEngine {
    /// Create a new evolution engine.
    pub fn new(config: RunConfig, oracle: Arc<dyn FitnessOracle>) -> Self {
        let random_seed = config.random_seed.unwrap_or_else(rand::random);
        let rng = GenomeRng::new(random_seed);

        Self {
            config,
            oracle,
            rng,
            random_seed,
            history: EvolutionHistory::default(),
            generation: 0,
            best_fitness: f64::INFINITY,
            stagnation_count: 0,
            hyperdiverse_remaining: 0,
            evaluations: 0,
            phase: EvolutionPhase::Seeding,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get cancellation handle.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Seed the run's generator was built from.
    pub fn random_seed(&self) -> u64 {
        self.random_seed
    }

    pub fn phase(&self) -> EvolutionPhase {
        self.phase
    }

    fn reset(&mut self) {
        self.rng = GenomeRng::new(self.random_seed);
        self.history = EvolutionHistory::default();
        self.generation = 0;
        self.best_fitness = f64::INFINITY;
        self.stagnation_count = 0;
        self.hyperdiverse_remaining = 0;
        self.evaluations = 0;
        self.phase = EvolutionPhase::Seeding;
    }

    /// References long enough to seed from.
    fn usable_references(&self, references: &[ReferenceSequence]) -> Vec<Sequence> {
        references
            .iter()
            .filter(|r| {
                let keep = r.sequence.len() >= self.config.min_length;
                if !keep {
                    log::warn!(
                        "Skipping reference {} ({} nt < min_length {})",
                        r.id,
                        r.sequence.len(),
                        self.config.min_length
                    );
                }
                keep
            })
            .map(|r| r.sequence.clone())
            .collect()
    }

    /// Score every pool member and rank the generation.
    fn evaluate_pool(
        &mut self,
        evaluator: &Evaluator,
        pool: SequencePool,
        direction: FitnessDirection,
    ) -> Result<GenerationResult, EvolutionError> {
        self.phase = EvolutionPhase::Evaluating;
        let scores = evaluator
            .evaluate(&pool, &self.cancelled)
            .map_err(|e| match e {
                DispatchError::Oracle { index, error } => EvolutionError::OracleEvaluation {
                    sequence: pool[index].clone(),
                    source: error,
                },
                DispatchError::Cancelled => EvolutionError::Cancelled {
                    generation: self.generation,
                },
            })?;
        self.evaluations += pool.len() as u64;

        Ok(GenerationResult::rank(
            pool.into_iter().zip(scores).collect(),
            direction,
        ))
    }

    /// Update best fitness, plateau counter, and history.
    fn record_generation(&mut self, generation: &GenerationResult) {
        let gen_best = generation.best().map_or(f64::INFINITY, |b| b.fitness());
        if gen_best < self.best_fitness {
            self.best_fitness = gen_best;
            self.stagnation_count = 0;
        } else {
            self.stagnation_count += 1;
        }

        self.history.best_fitness.push(gen_best);
        self.history.avg_fitness.push(generation.mean());
        self.history.fitness_std.push(generation.std_dev());
        self.history.diversity.push(generation.diversity());

        if let Some(limit) = self.config.max_consecutive_hyperdiverse
            && self.config.hyperdiverse_generations > 0
            && self.stagnation_count > 0
            && self.stagnation_count % limit == 0
        {
            log::warn!(
                "No improvement for {} generations, injecting reseeded sequences for {} generations",
                self.stagnation_count,
                self.config.hyperdiverse_generations
            );
            self.hyperdiverse_remaining = self.config.hyperdiverse_generations;
        }
    }

    /// Check if the run should stop after the generation just recorded.
    fn should_stop(
        &self,
        generation: &GenerationResult,
        direction: FitnessDirection,
    ) -> Option<StopReason> {
        if let (Some(target), Some(best)) = (self.config.break_score, generation.best())
            && direction.reaches(best.raw_score(), target)
        {
            return Some(StopReason::TargetReached);
        }

        // A pending or running hyperdiverse reset gets its generations
        // before the plateau can end the run.
        if let Some(limit) = self.config.max_consecutive_score
            && self.stagnation_count >= limit
            && self.hyperdiverse_remaining == 0
        {
            return Some(StopReason::Plateau);
        }

        if self.generation >= self.config.n_generations {
            return Some(StopReason::MaxGenerations);
        }

        None
    }

    /// Expand survivors back to exactly `n_pool` sequences.
    ///
    /// The first `elitism` survivors are carried over unmutated and count
    /// toward their own offspring quota. Each survivor then yields
    /// `n_pool / n_candidates` mutants and the remainder is filled with
    /// mutants of uniformly chosen survivors. During a hyperdiverse reset
    /// the trailing mutant slots are replaced by sequences reseeded from
    /// the references.
    fn repopulate(
        &mut self,
        survivors: &[Sequence],
        references: &[Sequence],
    ) -> Result<SequencePool, EvolutionError> {
        self.phase = EvolutionPhase::Repopulating;
        let n_pool = self.config.n_pool;
        let rate = self.config.mutation_rate;
        let per_survivor = self.config.offspring_per_survivor();
        let elitism = self.config.elitism.min(survivors.len());

        let mut next: SequencePool = Vec::with_capacity(n_pool);
        next.extend(survivors[..elitism].iter().cloned());

        for (i, survivor) in survivors.iter().enumerate() {
            let quota = if i < elitism {
                per_survivor.saturating_sub(1)
            } else {
                per_survivor
            };
            for _ in 0..quota {
                next.push(self.rng.mutate(survivor, rate));
            }
        }

        while next.len() < n_pool {
            let parent = &survivors[self.rng.index(survivors.len())];
            next.push(self.rng.mutate(parent, rate));
        }
        next.truncate(n_pool);

        if self.hyperdiverse_remaining > 0 {
            self.hyperdiverse_remaining -= 1;
            let wanted = (self.config.hyperdiverse_fraction * n_pool as f64).ceil() as usize;
            let count = wanted.min(n_pool - elitism);
            if count > 0 {
                let fresh = self.rng.seed_pool(references, count)?;
                next.truncate(n_pool - count);
                next.extend(fresh);
                self.history.hyperdiverse_generations.push(self.generation);
                log::debug!(
                    "Generation {} pool carries {} reseeded sequences",
                    self.generation,
                    count
                );
            }
        }

        debug_assert_eq!(next.len(), n_pool);
        Ok(next)
    }

    fn progress(&self, generation: &GenerationResult) -> EvolutionProgress {
        EvolutionProgress {
            generation: self.generation,
            total_generations: self.config.n_generations,
            best_fitness: self.best_fitness,
            generation_best: generation.best().map_or(f64::INFINITY, |b| b.fitness()),
            avg_fitness: generation.mean(),
            stagnation_count: self.stagnation_count,
            hyperdiverse: self.hyperdiverse_remaining > 0,
            top_candidates: extract_candidates(generation, self.config.n_candidates),
            phase: self.phase,
        }
    }

    /// Run evolution with progress callback.
    pub fn run_with_callback<F>(
        &mut self,
        references: &[ReferenceSequence],
        callback: F,
    ) -> Result<EvolutionResult, EvolutionError>
    where
        F: Fn(&EvolutionProgress),
    {
        let start_time = Instant::now();
        self.reset();
        self.config.validate()?;

        let references = self.usable_references(references);
        if references.is_empty() {
            return Err(EvolutionError::EmptyInput);
        }

        let evaluator = Evaluator::new(
            Arc::clone(&self.oracle),
            self.config.parallel_workers,
            self.config.oracle_timeout(),
        )?;
        let direction = self.oracle.direction();
        log::info!(
            "Starting search: oracle={}, pool={}, candidates={}, generations={}, workers={}, seed={}",
            self.oracle.name(),
            self.config.n_pool,
            self.config.n_candidates,
            self.config.n_generations,
            evaluator.concurrency(),
            self.random_seed
        );

        let mut pool = self.rng.seed_pool(&references, self.config.n_pool)?;
        log::debug!(
            "Seeded {} sequences from {} references",
            pool.len(),
            references.len()
        );

        let (last, stop_reason) = loop {
            if self.cancelled.load(Ordering::Relaxed) {
                return Err(EvolutionError::Cancelled {
                    generation: self.generation,
                });
            }

            let generation = self.evaluate_pool(&evaluator, pool, direction)?;
            self.record_generation(&generation);
            callback(&self.progress(&generation));
            log::info!(
                "Generation {}/{}: best={:.4} mean={:.4} stagnation={}",
                self.generation + 1,
                self.config.n_generations,
                generation.best().map_or(f64::NAN, |b| b.fitness()),
                generation.mean(),
                self.stagnation_count
            );
            self.generation += 1;

            if let Some(reason) = self.should_stop(&generation, direction) {
                break (generation, reason);
            }

            self.phase = EvolutionPhase::Selecting;
            let survivors = select_survivors(&generation, self.config.n_candidates)?;
            pool = self.repopulate(&survivors, &references)?;
        };

        self.phase = EvolutionPhase::Terminated;
        let candidates = extract_candidates(&last, self.config.n_candidates);
        let elapsed = start_time.elapsed().as_secs_f64();
        log::info!(
            "Search finished after {} generations ({:?}), {} oracle calls in {:.2}s",
            self.generation,
            stop_reason,
            self.evaluations,
            elapsed
        );

        Ok(EvolutionResult {
            candidates,
            stats: EvolutionStats {
                generations: self.generation,
                total_evaluations: self.evaluations,
                best_fitness: last.best().map_or(f64::INFINITY, |b| b.fitness()),
                best_fitness_overall: self.best_fitness,
                final_avg_fitness: last.mean(),
                elapsed_seconds: elapsed,
                evaluations_per_second: self.evaluations as f64 / elapsed.max(f64::EPSILON),
                stop_reason,
                random_seed: self.random_seed,
            },
            history: self.history.clone(),
        })
    }

    /// Run evolution (blocking).
    pub fn run(
        &mut self,
        references: &[ReferenceSequence],
    ) -> Result<EvolutionResult, EvolutionError> {
        self.run_with_callback(references, |_| {})
    }
}

/// Run a complete search with `config` seeded from `references`.
pub fn run_search(
    config: RunConfig,
    references: &[ReferenceSequence],
    oracle: Arc<dyn FitnessOracle>,
) -> Result<EvolutionResult, EvolutionError> {
    EvolutionEngine::new(config, oracle).run(references)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::evolution::fitness::{CompositionOracle, FnOracle, GcPairOracle};
    use proptest::prelude::*;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    fn references(raw: &[&str]) -> Vec<ReferenceSequence> {
        raw.iter()
            .enumerate()
            .map(|(i, s)| ReferenceSequence {
                id: format!("ref{}", i),
                sequence: s.parse().unwrap(),
            })
            .collect()
    }

    fn counting_oracle(calls: &Arc<AtomicUsize>) -> Arc<dyn FitnessOracle> {
        let counter = Arc::clone(calls);
        Arc::new(FnOracle::new("counting", move |s: &Sequence| {
            counter.fetch_add(1, Ordering::SeqCst);
            GcPairOracle.evaluate(s)
        }))
    }

    fn flat_oracle() -> Arc<dyn FitnessOracle> {
        Arc::new(FnOracle::new("flat", |_: &Sequence| Ok(0.0)))
    }

    fn small_config() -> RunConfig {
        RunConfig {
            n_generations: 5,
            n_pool: 9,
            n_candidates: 3,
            mutation_rate: 0.1,
            min_length: 1,
            random_seed: Some(42),
            parallel_workers: 2,
            ..Default::default()
        }
    }

    const REFS: [&str; 3] = ["ACGTGCATGCAAGC", "TTGCAGCATTACGA", "GGCCATATGCGCTA"];

    #[test]
    fn test_gc_scenario_runs_all_generations() {
        let calls = Arc::new(AtomicUsize::new(0));
        let config = RunConfig {
            elitism: 1,
            ..small_config()
        };
        let refs = references(&REFS);
        let initial_best = refs
            .iter()
            .map(|r| r.sequence.count_motif("GC"))
            .max()
            .unwrap();

        let result = run_search(config, &refs, counting_oracle(&calls)).unwrap();

        assert_eq!(result.stats.generations, 5);
        assert_eq!(result.stats.stop_reason, StopReason::MaxGenerations);
        assert_eq!(result.stats.total_evaluations, 45);
        assert_eq!(calls.load(Ordering::SeqCst), 45);
        assert_eq!(result.candidates.len(), 3);
        for pair in result.candidates.windows(2) {
            assert!(pair[0].fitness() <= pair[1].fitness());
        }
        let best = result.best().unwrap();
        assert!(best.sequence().count_motif("GC") >= initial_best);
        assert!(best.sequence().len() == 14);
    }

    #[test]
    fn test_empty_references_fail_without_oracle_calls() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result = run_search(small_config(), &[], counting_oracle(&calls));
        assert!(matches!(result, Err(EvolutionError::EmptyInput)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_short_references_are_skipped() {
        let config = RunConfig {
            min_length: 20,
            ..small_config()
        };
        let result = run_search(config, &references(&REFS), flat_oracle());
        assert!(matches!(result, Err(EvolutionError::EmptyInput)));
    }

    #[test]
    fn test_candidates_exceeding_pool_is_configuration_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let config = RunConfig {
            n_pool: 3,
            n_candidates: 4,
            ..small_config()
        };
        let result = run_search(config, &references(&REFS), counting_oracle(&calls));
        assert!(matches!(
            result,
            Err(EvolutionError::Configuration(
                ConfigError::CandidatesExceedPool { .. }
            ))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_oracle_error_aborts_run() {
        let oracle = Arc::new(FnOracle::new("broken", |s: &Sequence| {
            if s.count_motif("TTG") > 0 {
                Err(OracleError::Parse("garbled".to_string()))
            } else {
                Ok(0.0)
            }
        }));
        let result = run_search(small_config(), &references(&REFS), oracle);
        match result {
            Err(EvolutionError::OracleEvaluation { sequence, source }) => {
                assert!(sequence.count_motif("TTG") > 0);
                assert!(matches!(source, OracleError::Parse(_)));
            }
            other => panic!("unexpected: {:?}", other.map(|r| r.stats)),
        }
    }

    #[test]
    fn test_plateau_stops_early() {
        let config = RunConfig {
            n_generations: 100,
            max_consecutive_score: Some(3),
            max_consecutive_hyperdiverse: None,
            ..small_config()
        };
        let result = run_search(config, &references(&REFS), flat_oracle()).unwrap();
        assert_eq!(result.stats.stop_reason, StopReason::Plateau);
        assert_eq!(result.stats.generations, 4);
        assert_eq!(result.candidates.len(), 3);
    }

    #[test]
    fn test_break_score_lower_is_better() {
        let config = RunConfig {
            n_generations: 50,
            break_score: Some(-1.0),
            ..small_config()
        };
        let result = run_search(config, &references(&REFS), Arc::new(GcPairOracle)).unwrap();
        assert_eq!(result.stats.stop_reason, StopReason::TargetReached);
        assert_eq!(result.stats.generations, 1);
    }

    #[test]
    fn test_break_score_higher_is_better() {
        let config = RunConfig {
            n_generations: 50,
            break_score: Some(0.0),
            ..small_config()
        };
        let result =
            run_search(config, &references(&REFS), Arc::new(CompositionOracle)).unwrap();
        assert_eq!(result.stats.stop_reason, StopReason::TargetReached);
        let best = result.best().unwrap();
        assert!(best.raw_score() > 0.0);
        assert_eq!(best.fitness(), -best.raw_score());
    }

    #[test]
    fn test_cancel_before_run() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut engine = EvolutionEngine::new(small_config(), counting_oracle(&calls));
        engine.cancel_handle().store(true, Ordering::Relaxed);

        let result = engine.run(&references(&REFS));
        assert!(matches!(
            result,
            Err(EvolutionError::Cancelled { generation: 0 })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cancel_from_callback() {
        let mut engine = EvolutionEngine::new(
            RunConfig {
                n_generations: 20,
                ..small_config()
            },
            Arc::new(GcPairOracle),
        );
        let cancel = engine.cancel_handle();
        let result = engine.run_with_callback(&references(&REFS), |progress| {
            if progress.generation == 1 {
                cancel.store(true, Ordering::Relaxed);
            }
        });
        assert!(matches!(
            result,
            Err(EvolutionError::Cancelled { generation: 2 })
        ));
    }

    #[test]
    fn test_same_seed_same_result() {
        let run = || {
            run_search(small_config(), &references(&REFS), Arc::new(GcPairOracle)).unwrap()
        };
        let a = run();
        let b = run();
        let seqs = |r: &EvolutionResult| -> Vec<String> {
            r.candidates
                .iter()
                .map(|c| c.sequence().to_string())
                .collect()
        };
        assert_eq!(seqs(&a), seqs(&b));
        assert_eq!(a.history.best_fitness, b.history.best_fitness);
    }

    #[test]
    fn test_elitism_never_regresses() {
        let config = RunConfig {
            n_generations: 15,
            n_pool: 12,
            n_candidates: 4,
            mutation_rate: 0.4,
            elitism: 1,
            max_consecutive_score: None,
            ..small_config()
        };
        let result = run_search(config, &references(&REFS), Arc::new(GcPairOracle)).unwrap();
        for pair in result.history.best_fitness.windows(2) {
            assert!(pair[1] <= pair[0]);
        }
    }

    #[test]
    fn test_hyperdiverse_reset_schedule() {
        let config = RunConfig {
            n_generations: 6,
            max_consecutive_score: None,
            max_consecutive_hyperdiverse: Some(2),
            hyperdiverse_generations: 1,
            ..small_config()
        };
        let result = run_search(config, &references(&REFS), flat_oracle()).unwrap();
        assert_eq!(result.history.hyperdiverse_generations, vec![3, 5]);
        assert_eq!(result.stats.generations, 6);
    }

    #[test]
    fn test_default_limits_run_hyperdiverse_before_plateau() {
        let config = RunConfig {
            n_pool: 9,
            n_candidates: 3,
            min_length: 1,
            random_seed: Some(42),
            parallel_workers: 2,
            ..Default::default()
        };
        let result = run_search(config, &references(&REFS), flat_oracle()).unwrap();

        // The plateau hits 10 on the eleventh generation; the three
        // injected generations still run before the plateau stop.
        assert_eq!(result.history.hyperdiverse_generations, vec![11, 12, 13]);
        assert_eq!(result.stats.stop_reason, StopReason::Plateau);
        assert_eq!(result.stats.generations, 14);
    }

    #[test]
    fn test_rerun_matches_fresh_engine() {
        let mut engine = EvolutionEngine::new(small_config(), Arc::new(GcPairOracle));
        let first = engine.run(&references(&REFS)).unwrap();
        let second = engine.run(&references(&REFS)).unwrap();

        let seqs = |r: &EvolutionResult| -> Vec<String> {
            r.candidates
                .iter()
                .map(|c| c.sequence().to_string())
                .collect()
        };
        assert_eq!(seqs(&first), seqs(&second));
        assert_eq!(first.history.best_fitness, second.history.best_fitness);
    }

    #[test]
    fn test_hyperdiverse_injects_references() {
        let mut engine = EvolutionEngine::new(
            RunConfig {
                mutation_rate: 1.0,
                hyperdiverse_fraction: 1.0,
                ..small_config()
            },
            flat_oracle(),
        );
        let refs: Vec<Sequence> = REFS.iter().map(|s| s.parse().unwrap()).collect();
        let survivors: Vec<Sequence> = vec!["AAAAAAAAAAAAAA".parse().unwrap(); 3];

        engine.hyperdiverse_remaining = 1;
        let pool = engine.repopulate(&survivors, &refs).unwrap();
        assert_eq!(pool.len(), 9);
        assert!(pool.iter().all(|s| refs.contains(s)));
        assert_eq!(engine.hyperdiverse_remaining, 0);
    }

    #[test]
    fn test_progress_callback_per_generation() {
        let seen = Mutex::new(Vec::new());
        let mut engine = EvolutionEngine::new(small_config(), Arc::new(GcPairOracle));
        let result = engine
            .run_with_callback(&references(&REFS), |progress| {
                assert!(progress.top_candidates.len() <= 3);
                seen.lock().unwrap().push(progress.generation);
            })
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(engine.phase(), EvolutionPhase::Terminated);
        assert_eq!(result.history.best_fitness.len(), 5);
    }

    proptest! {
        #[test]
        fn prop_repopulate_restores_pool_size(
            n_pool in 1usize..40,
            candidates_seed in any::<usize>(),
            elitism_seed in any::<usize>(),
            hyperdiverse in any::<bool>(),
            fraction in 0.0f64..=1.0,
        ) {
            let n_candidates = 1 + candidates_seed % n_pool;
            let elitism = elitism_seed % (n_candidates + 1);
            let mut engine = EvolutionEngine::new(
                RunConfig {
                    n_pool,
                    n_candidates,
                    elitism,
                    hyperdiverse_fraction: fraction,
                    ..small_config()
                },
                flat_oracle(),
            );
            let refs: Vec<Sequence> = REFS.iter().map(|s| s.parse().unwrap()).collect();
            let survivors: Vec<Sequence> = refs.iter().cycle().take(n_candidates).cloned().collect();
            engine.hyperdiverse_remaining = usize::from(hyperdiverse);

            let pool = engine.repopulate(&survivors, &refs).unwrap();
            prop_assert_eq!(pool.len(), n_pool);
            prop_assert_eq!(&pool[..elitism], &survivors[..elitism]);
        }
    }
}
