//! Bounded-concurrency oracle dispatch for one generation.
//!
//! Every pool member is scored on a dedicated rayon pool whose size caps the
//! number of in-flight oracle calls. Results come back over a channel tagged
//! with their pool index, so completion order does not matter. On the first
//! failure, timeout, or cancellation the generation is abandoned: queued
//! calls are skipped and in-flight calls are left to finish on their own.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use crate::schema::Sequence;

use super::EvolutionError;
use super::fitness::{FitnessOracle, OracleError, score_checked};

/// Upper bound on how long the dispatcher blocks before re-checking
/// cancellation and deadlines.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Why a generation could not be fully scored.
#[derive(Debug)]
pub enum DispatchError {
    /// The oracle failed (or timed out) on the sequence at `index`.
    Oracle { index: usize, error: OracleError },
    /// The run was cancelled while calls were outstanding.
    Cancelled,
}

enum Message {
    Started(usize, Instant),
    Finished(usize, Result<f64, OracleError>),
}

/// Scores whole generations against one oracle.
pub struct Evaluator {
    oracle: Arc<dyn FitnessOracle>,
    workers: rayon::ThreadPool,
    timeout: Option<Duration>,
}

impl Evaluator {
    /// Create an evaluator with `workers` threads (0 = one per CPU).
    pub fn new(
        oracle: Arc<dyn FitnessOracle>,
        workers: usize,
        timeout: Option<Duration>,
    ) -> Result<Self, EvolutionError> {
        let workers = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("oracle-{}", i))
            .panic_handler(|_| log::error!("Oracle call panicked"))
            .build()
            .map_err(|e| EvolutionError::WorkerPool(e.to_string()))?;

        Ok(Self {
            oracle,
            workers,
            timeout,
        })
    }

    /// Number of concurrent oracle calls allowed.
    pub fn concurrency(&self) -> usize {
        self.workers.current_num_threads()
    }

    /// Score every sequence exactly once, returning raw scores in pool order.
    pub fn evaluate(
        &self,
        pool: &[Sequence],
        cancel: &Arc<AtomicBool>,
    ) -> Result<Vec<f64>, DispatchError> {
        let abandoned = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel();

        for (index, sequence) in pool.iter().enumerate() {
            let tx = tx.clone();
            let oracle = Arc::clone(&self.oracle);
            let sequence = sequence.clone();
            let abandoned = Arc::clone(&abandoned);
            let cancel = Arc::clone(cancel);

            self.workers.spawn(move || {
                if abandoned.load(Ordering::Relaxed) || cancel.load(Ordering::Relaxed) {
                    return;
                }
                if tx.send(Message::Started(index, Instant::now())).is_err() {
                    return;
                }
                let result = score_checked(oracle.as_ref(), &sequence);
                let _ = tx.send(Message::Finished(index, result));
            });
        }
        drop(tx);

        let outcome = self.collect(pool.len(), &rx, cancel);
        if outcome.is_err() {
            abandoned.store(true, Ordering::Relaxed);
        }
        outcome
    }

    fn collect(
        &self,
        len: usize,
        rx: &mpsc::Receiver<Message>,
        cancel: &AtomicBool,
    ) -> Result<Vec<f64>, DispatchError> {
        let mut scores: Vec<Option<f64>> = vec![None; len];
        let mut started: Vec<Option<Instant>> = vec![None; len];
        let mut remaining = len;

        while remaining > 0 {
            if cancel.load(Ordering::Relaxed) {
                return Err(DispatchError::Cancelled);
            }

            match rx.recv_timeout(self.next_wait(&started)) {
                Ok(Message::Started(index, at)) => started[index] = Some(at),
                Ok(Message::Finished(index, Ok(raw))) => {
                    started[index] = None;
                    if scores[index].replace(raw).is_none() {
                        remaining -= 1;
                    }
                }
                Ok(Message::Finished(index, Err(error))) => {
                    return Err(DispatchError::Oracle { index, error });
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    // Every task is gone but some never reported back.
                    if cancel.load(Ordering::Relaxed) {
                        return Err(DispatchError::Cancelled);
                    }
                    let index = scores.iter().position(Option::is_none).unwrap_or(0);
                    return Err(DispatchError::Oracle {
                        index,
                        error: OracleError::Other("oracle call panicked".to_string()),
                    });
                }
            }

            if let Some(limit) = self.timeout
                && let Some(index) = started
                    .iter()
                    .position(|at| at.is_some_and(|at| at.elapsed() >= limit))
            {
                return Err(DispatchError::Oracle {
                    index,
                    error: OracleError::Timeout(limit),
                });
            }
        }

        Ok(scores.into_iter().map(|s| s.unwrap_or(f64::NAN)).collect())
    }

    /// Time until the earliest in-flight deadline, capped at the poll interval.
    fn next_wait(&self, started: &[Option<Instant>]) -> Duration {
        let Some(limit) = self.timeout else {
            return POLL_INTERVAL;
        };
        started
            .iter()
            .flatten()
            .map(|at| limit.saturating_sub(at.elapsed()))
            .min()
            .unwrap_or(POLL_INTERVAL)
            .min(POLL_INTERVAL)
    }
}
