//! Beam search over room histories.
//!
//! A generic fixed-width beam plus a reconstruction worker that explores the
//! same state space as the history annealer, but breadth-first: every step
//! expands each kept history with the conflict- and overflow-directed repairs
//! and a batch of random multi-perturbations, then keeps the lowest-cost
//! `beam_size` candidates.

use crate::judge::Observations;
use crate::map::Aedificium;
use crate::problems::Problem;
use crate::solver::anneal::{evaluate_history, perturb, rebuild_history};
use crate::solver::{MoveWalk, Solver, move_walks};
use rand::prelude::*;
use rand_chacha::ChaCha20Rng;
use rustc_hash::FxHashSet;
use std::sync::atomic::{AtomicBool, Ordering};

/// Generic minimizing beam search with stable tie-breaking and key-based
/// deduplication within each step.
pub struct BeamSearch {
    pub beam_size: usize,
    pub max_steps: usize,
}

impl BeamSearch {
    pub fn new(beam_size: usize, max_steps: usize) -> Self {
        assert!(beam_size > 0);
        Self {
            beam_size,
            max_steps,
        }
    }

    /// Runs the search and returns the best final state, or the first state
    /// satisfying `is_goal` if one appears.
    pub fn run<S: Clone>(
        &self,
        initial_states: Vec<S>,
        mut expand: impl FnMut(&S) -> Vec<S>,
        mut score: impl FnMut(&S) -> f64,
        mut is_goal: impl FnMut(&S) -> bool,
        mut key: impl FnMut(&S) -> u64,
        mut stop: impl FnMut() -> bool,
    ) -> Option<S> {
        if initial_states.is_empty() {
            return None;
        }
        let mut beam: Vec<(f64, S)> = initial_states
            .into_iter()
            .map(|s| (score(&s), s))
            .collect();
        Self::keep_best(&mut beam, self.beam_size);
        if let Some((_, s)) = beam.iter().find(|(_, s)| is_goal(s)) {
            return Some(s.clone());
        }

        for _ in 0..self.max_steps {
            if stop() {
                return None;
            }
            let mut seen: FxHashSet<u64> = FxHashSet::default();
            let mut candidates: Vec<(f64, S)> = vec![];
            for (_, state) in &beam {
                for child in expand(state) {
                    if !seen.insert(key(&child)) {
                        continue;
                    }
                    if is_goal(&child) {
                        return Some(child);
                    }
                    candidates.push((score(&child), child));
                }
            }
            if candidates.is_empty() {
                return None;
            }
            Self::keep_best(&mut candidates, self.beam_size);
            beam = candidates;
        }
        beam.into_iter()
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, s)| s)
    }

    fn keep_best<S>(entries: &mut Vec<(f64, S)>, k: usize) {
        entries.sort_by(|a, b| a.0.total_cmp(&b.0));
        entries.truncate(k);
    }
}

/// Rolling hash identifying a history for in-step deduplication.
fn history_key(history: &[usize]) -> u64 {
    const MOD: u64 = 1_000_000_009;
    const BASE: u64 = 1_000_003;
    let mut v = 0u64;
    for &r in history {
        v = (v * BASE + r as u64) % MOD;
    }
    v
}

/// Knobs for the beam-search history worker.
#[derive(Clone, Debug)]
pub struct BeamHistoryConfig {
    pub beam_size: usize,
    pub max_steps: usize,
    /// Random multi-perturbation children generated per expanded state.
    pub samples: usize,
    /// Random initial histories.
    pub initial_states: usize,
}

impl Default for BeamHistoryConfig {
    fn default() -> Self {
        Self {
            beam_size: 100,
            max_steps: 4000,
            samples: 50,
            initial_states: 100,
        }
    }
}

pub struct BeamHistorySolver {
    pub config: BeamHistoryConfig,
}

impl Default for BeamHistorySolver {
    fn default() -> Self {
        Self {
            config: BeamHistoryConfig::default(),
        }
    }
}

impl BeamHistorySolver {
    fn expand_history(
        &self,
        history: &[usize],
        walk: &MoveWalk,
        n: usize,
        rng: &mut impl Rng,
    ) -> Vec<Vec<usize>> {
        let mut children = Vec::with_capacity(self.config.samples + 2);
        let eval = evaluate_history(history, &walk.doors, n);
        if !eval.conflicts.is_empty() {
            let mut child = history.to_vec();
            let index = eval.conflicts[rng.random_range(0..eval.conflicts.len())];
            perturb(&mut child, index, n, rng);
            children.push(child);
        }
        if !eval.overflow_doors.is_empty() {
            let mut child = history.to_vec();
            let door = eval.overflow_doors[rng.random_range(0..eval.overflow_doors.len())];
            for (i, &d) in walk.doors.iter().enumerate() {
                if (child[i], d) == door {
                    perturb(&mut child, i + 1, n, rng);
                }
            }
            children.push(child);
        }
        for _ in 0..self.config.samples {
            let mut child = history.to_vec();
            for _ in 0..rng.random_range(1..10) {
                let index = rng.random_range(0..child.len());
                perturb(&mut child, index, n, rng);
            }
            children.push(child);
        }
        children
    }

    pub(crate) fn search(
        &self,
        walk: &MoveWalk,
        n: usize,
        cancel: &AtomicBool,
        rng: &mut impl Rng,
    ) -> Option<Aedificium> {
        if walk.labels.iter().any(|&l| l >= n) {
            return None;
        }
        let mut initial = vec![walk.labels.clone()];
        for _ in 1..self.config.initial_states {
            let mut history = walk.labels.clone();
            for index in 0..history.len() {
                perturb(&mut history, index, n, rng);
            }
            initial.push(history);
        }

        let beam = BeamSearch::new(self.config.beam_size, self.config.max_steps);
        // The expansion closure owns the RNG; everything else is pure.
        let best = beam.run(
            initial,
            |state| self.expand_history(state, walk, n, rng),
            |state| evaluate_history(state, &walk.doors, n).cost,
            |state| evaluate_history(state, &walk.doors, n).cost == 0.0,
            |state| history_key(state),
            || cancel.load(Ordering::Relaxed),
        )?;
        if evaluate_history(&best, &walk.doors, n).cost > 0.0 {
            return None;
        }
        rebuild_history(&best, walk, n)
    }
}

impl Solver for BeamHistorySolver {
    fn name(&self) -> &'static str {
        "beam-history"
    }

    fn reconstruct(
        &self,
        obs: &Observations,
        problem: &Problem,
        cancel: &AtomicBool,
        seed: u64,
    ) -> Option<Aedificium> {
        let walks = move_walks(obs);
        let walk = walks.iter().find(|w| !w.has_writes())?;
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        self.search(walk, problem.size, cancel, &mut rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::random_move_plan;

    #[test]
    fn beam_reaches_an_integer_goal() {
        let target = 37i64;
        let beam = BeamSearch::new(3, 50);
        let best = beam.run(
            vec![0i64],
            |&x| vec![x - 1, x + 1],
            |&x| (x - target).abs() as f64,
            |&x| x == target,
            |&x| x as u64,
            || false,
        );
        assert_eq!(best, Some(target));
    }

    #[test]
    fn beam_returns_the_best_after_fixed_steps() {
        let target = 5i64;
        let beam = BeamSearch::new(100, 3);
        let best = beam.run(
            vec![0i64],
            |&x| vec![x - 1, x + 1],
            |&x| (x - target).abs() as f64,
            |_| false,
            |&x| (x + 1000) as u64,
            || false,
        );
        // After 3 steps the closest reachable state is 3.
        assert_eq!(best, Some(3));
    }

    #[test]
    fn beam_repairs_a_corrupted_history() {
        for seed in 0..3u64 {
            let mut rng = ChaCha20Rng::seed_from_u64(500 + seed);
            let hidden = crate::mapgen::random_single(8, &mut rng);
            let plan = random_move_plan(8 * 18, &mut rng);
            let result = hidden.simulate(&plan);
            let obs = Observations {
                plans: vec![plan],
                results: vec![result],
            };
            let walks = move_walks(&obs);
            let walk = &walks[0];

            // True history, then corrupt a few positions.
            let mut history = vec![hidden.start];
            let mut u = hidden.start;
            for &d in &walk.doors {
                u = hidden.step(u, d).0;
                history.push(u);
            }
            // Room ids in the search space must be congruent to their label
            // mod 4, so renumber the hidden rooms: first room seen with a
            // label takes the label itself, the second takes label + 4.
            let mut aligned: Vec<usize> = Vec::with_capacity(history.len());
            let mut assigned: Vec<Option<usize>> = vec![None; 8];
            let mut used = vec![false; 8];
            for (&room, &label) in history.iter().zip(walk.labels.iter()) {
                let id = match assigned[room] {
                    Some(id) => id,
                    None => {
                        let id = if !used[label] { label } else { label + 4 };
                        used[id] = true;
                        assigned[room] = Some(id);
                        id
                    }
                };
                aligned.push(id);
            }
            let mut corrupted = aligned.clone();
            for index in [5, 40, 90] {
                perturb(&mut corrupted, index, 8, &mut rng);
            }

            let solver = BeamHistorySolver {
                config: BeamHistoryConfig {
                    beam_size: 30,
                    max_steps: 200,
                    samples: 20,
                    initial_states: 1,
                },
            };
            // Seed the beam with the corrupted history directly.
            let beam = BeamSearch::new(solver.config.beam_size, solver.config.max_steps);
            let cancel = AtomicBool::new(false);
            let mut search_rng = ChaCha20Rng::seed_from_u64(900 + seed);
            let best = beam.run(
                vec![corrupted],
                |state| solver.expand_history(state, walk, 8, &mut search_rng),
                |state| evaluate_history(state, &walk.doors, 8).cost,
                |state| evaluate_history(state, &walk.doors, 8).cost == 0.0,
                |state| history_key(state),
                || cancel.load(Ordering::Relaxed),
            );
            if let Some(best) = best {
                if evaluate_history(&best, &walk.doors, 8).cost == 0.0 {
                    if let Some(candidate) = rebuild_history(&best, walk, 8) {
                        assert_eq!(candidate.simulate(&obs.plans[0]), obs.results[0]);
                        return;
                    }
                }
            }
        }
        panic!("no seed repaired the corrupted history");
    }
}
