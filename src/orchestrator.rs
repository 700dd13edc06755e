//! Pipeline orchestration.
//!
//! One attempt: select the problem, run the shared random expeditions, hand
//! the observations to a pool of solver workers, take the first success,
//! lift it through the duplication stage when needed, and submit the guess.
//! Rejected guesses restart the whole attempt with fresh randomness, up to a
//! bounded number of tries.
//!
//! Workers share nothing mutable: each gets its own copy of the observations
//! and a private RNG seeded from the worker id and a process-unique nonce.
//! Only the orchestrator talks to the judge.

use crate::judge::{Judge, Observations};
use crate::lift;
use crate::problems::Problem;
use crate::solver::anneal::{EdgeAnnealSolver, HistoryAnnealSolver};
use crate::solver::beam::BeamHistorySolver;
use crate::solver::fingerprint::FingerprintSolver;
use crate::solver::sat::{SatConfig, SatSolver};
use crate::solver::{Solver, random_move_plan};
use anyhow::Result;
use indicatif::ProgressBar;
use rand::prelude::*;
use rand_chacha::ChaCha20Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::time::Duration;

/// Pipeline knobs.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Worker threads; 0 means one per core, minus one for the orchestrator.
    pub workers: usize,
    /// Shared random walks collected before dispatching the solvers.
    pub initial_expeditions: usize,
    /// Charcoal expeditions per lifting phase.
    pub deep_expeditions: usize,
    /// Full pipeline retries before giving up.
    pub max_attempts: usize,
    /// Enroll the fingerprint solver (it is query-hungry).
    pub use_fingerprint: bool,
    pub seed: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            initial_expeditions: 3,
            deep_expeditions: lift::DEFAULT_EXPEDITIONS,
            max_attempts: 10,
            use_fingerprint: false,
            seed: 0,
        }
    }
}

fn build_roster(problem: &Problem, config: &PipelineConfig) -> Vec<Arc<dyn Solver>> {
    let mut roster: Vec<Arc<dyn Solver>> = vec![
        Arc::new(SatSolver::default()),
        Arc::new(EdgeAnnealSolver::default()),
        Arc::new(HistoryAnnealSolver::default()),
        Arc::new(BeamHistorySolver::default()),
    ];
    if problem.duplication > 1 && problem.num_rooms() <= 12 {
        // Small duplicated instances are solvable outright by the SAT
        // encoder with the layer constraints.
        roster.push(Arc::new(SatSolver::new(SatConfig {
            full_duplication: true,
            ..SatConfig::default()
        })));
    }
    if config.use_fingerprint {
        roster.push(Arc::new(FingerprintSolver::default()));
    }
    roster
}

/// Runs the full reconstruction pipeline. Returns whether a guess was
/// accepted.
pub fn run(judge: &mut dyn Judge, config: &PipelineConfig, cancel: &Arc<AtomicBool>) -> Result<bool> {
    let workers = if config.workers == 0 {
        std::thread::available_parallelism()
            .map(|n| n.get().saturating_sub(1).max(1))
            .unwrap_or(1)
    } else {
        config.workers
    };
    let nonce = std::process::id() as u64;

    for attempt in 0..config.max_attempts {
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        if attempt > 0 {
            eprintln!("restarting pipeline (attempt {})", attempt + 1);
            judge.restart()?;
        }
        let problem = judge.problem().clone();
        let mut rng =
            ChaCha20Rng::seed_from_u64(config.seed ^ nonce ^ ((attempt as u64) << 40));

        // Shared expeditions, each at the full per-plan budget.
        let plan_len = 6 * problem.num_rooms();
        let shared_plans: Vec<_> = (0..config.initial_expeditions)
            .map(|_| random_move_plan(plan_len, &mut rng))
            .collect();
        let shared_results = judge.explore(&shared_plans)?;
        let mut shared = Observations::default();
        shared.extend(&shared_plans, &shared_results);

        // One worker per roster entry first, then cycle the cheap solvers.
        let roster = build_roster(&problem, config);
        let mut assignments: Vec<Arc<dyn Solver>> = roster.clone();
        let mut cycle = roster
            .iter()
            .filter(|s| s.name() != "fingerprint")
            .cloned()
            .cycle();
        while assignments.len() < workers {
            assignments.push(cycle.next().unwrap());
        }
        assignments.truncate(workers);

        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel();
        let mut handles = vec![];
        for (i, solver) in assignments.into_iter().enumerate() {
            let worker_seed = config.seed ^ nonce ^ ((attempt as u64) << 40) ^ (i as u64 + 1);
            let requests = solver.plan_requests(&problem, worker_seed);
            let mut obs = shared.clone();
            if !requests.is_empty() {
                let results = judge.explore(&requests)?;
                obs.extend(&requests, &results);
            }
            let tx = tx.clone();
            let stop = Arc::clone(&stop);
            let problem = problem.clone();
            handles.push(std::thread::spawn(move || {
                if let Some(candidate) = solver.reconstruct(&obs, &problem, &stop, worker_seed) {
                    let _ = tx.send((solver.name(), candidate));
                }
            }));
        }
        drop(tx);

        let spinner = ProgressBar::new_spinner();
        spinner.enable_steady_tick(Duration::from_millis(120));
        spinner.set_message(format!(
            "{}: {} workers reconstructing",
            problem.problem, workers
        ));
        let mut winner = None;
        loop {
            match rx.recv_timeout(Duration::from_millis(100)) {
                Ok(found) => {
                    winner = Some(found);
                    break;
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    if cancel.load(Ordering::Relaxed) {
                        break;
                    }
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }
        stop.store(true, Ordering::Relaxed);
        for handle in handles {
            let _ = handle.join();
        }
        spinner.finish_and_clear();

        let Some((name, candidate)) = winner else {
            eprintln!("attempt {}: no worker reconstructed a map", attempt + 1);
            continue;
        };
        eprintln!(
            "attempt {}: worker '{}' produced {} rooms",
            attempt + 1,
            name,
            candidate.num_rooms()
        );

        let full = if candidate.num_rooms() < problem.num_rooms() {
            match lift::lift(judge, &candidate, config.deep_expeditions, &mut rng)? {
                Some(full) => full,
                None => {
                    eprintln!("attempt {}: duplication lift failed", attempt + 1);
                    continue;
                }
            }
        } else {
            candidate
        };
        if full.validate().is_err() {
            continue;
        }

        let outcome = judge.guess(&full)?;
        if outcome.correct {
            return Ok(true);
        }
        eprintln!(
            "attempt {}: guess rejected ({})",
            attempt + 1,
            outcome.reason.as_deref().unwrap_or("no reason")
        );
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::LocalJudge;

    #[test]
    fn pipeline_solves_probatio_locally() {
        let mut judge = LocalJudge::new("probatio", 11).unwrap();
        let config = PipelineConfig {
            workers: 3,
            max_attempts: 4,
            seed: 7,
            ..PipelineConfig::default()
        };
        let cancel = Arc::new(AtomicBool::new(false));
        assert!(run(&mut judge, &config, &cancel).unwrap());
    }

    #[test]
    fn pipeline_solves_a_doubled_problem() {
        let mut judge = LocalJudge::new("aleph", 23).unwrap();
        let config = PipelineConfig {
            workers: 3,
            max_attempts: 4,
            seed: 17,
            ..PipelineConfig::default()
        };
        let cancel = Arc::new(AtomicBool::new(false));
        assert!(run(&mut judge, &config, &cancel).unwrap());
    }

    #[test]
    fn cancellation_stops_the_pipeline() {
        let mut judge = LocalJudge::new("primus", 3).unwrap();
        let config = PipelineConfig::default();
        let cancel = Arc::new(AtomicBool::new(true));
        assert!(!run(&mut judge, &config, &cancel).unwrap());
    }
}
