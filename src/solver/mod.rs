//! Reconstruction solvers.
//!
//! Every solver implements the same contract: given the walk observations and
//! the problem parameters, produce a candidate map or `None`. Failures never
//! propagate as errors across the worker boundary; the orchestrator treats
//! `None` as "try another worker or restart".
//!
//! A solver that needs observations beyond the shared random walks (the
//! fingerprint solver) states them up front via `plan_requests`; the
//! orchestrator is the only component that talks to the judge.

use crate::judge::Observations;
use crate::map::{Action, Aedificium, DOORS};
use crate::problems::Problem;
use rand::prelude::*;
use std::sync::atomic::AtomicBool;

pub mod anneal;
pub mod beam;
pub mod fingerprint;
pub mod sat;

/// The common reconstruction contract.
pub trait Solver: Send + Sync {
    fn name(&self) -> &'static str;

    /// Extra plans to run before `reconstruct`, regenerable from `seed`.
    /// Their results are appended to the observations handed back.
    fn plan_requests(&self, problem: &Problem, seed: u64) -> Vec<Vec<Action>> {
        let _ = (problem, seed);
        vec![]
    }

    /// Produces a candidate map, or `None` when reconstruction is infeasible
    /// from the given observations. A returned map with `k` rooms is a base
    /// reconstruction awaiting the duplication lifter; one with `k * d` rooms
    /// is complete. Implementations poll `cancel` at least once per outer
    /// iteration.
    fn reconstruct(
        &self,
        obs: &Observations,
        problem: &Problem,
        cancel: &AtomicBool,
        seed: u64,
    ) -> Option<Aedificium>;
}

/// Uniform random move plan of the given length.
pub fn random_move_plan(len: usize, rng: &mut impl Rng) -> Vec<Action> {
    (0..len)
        .map(|_| Action::Move(rng.random_range(0..DOORS)))
        .collect()
}

/// Move plan where every door appears `len / 6` times, shuffled.
pub fn balanced_move_plan(len: usize, rng: &mut impl Rng) -> Vec<Action> {
    let mut doors = Vec::with_capacity(len);
    for d in 0..len {
        doors.push(d % DOORS);
    }
    doors.shuffle(rng);
    doors.into_iter().map(Action::Move).collect()
}

/// A single observed walk reduced to its moves.
pub struct MoveWalk {
    /// Door taken at each step.
    pub doors: Vec<usize>,
    /// Label written (by a charcoal immediately before the step), if any.
    pub writes: Vec<Option<usize>>,
    /// Labels observed at each move boundary; `doors.len() + 1` entries.
    pub labels: Vec<usize>,
}

impl MoveWalk {
    /// Whether this walk contains charcoal writes.
    pub fn has_writes(&self) -> bool {
        self.writes.iter().any(|w| w.is_some())
    }
}

/// Collapses plans to their move skeletons. A charcoal write sticks to the
/// move that follows it (a trailing charcoal is dropped), and the label
/// sequence keeps the starting entry plus one entry per move.
pub fn move_walks(obs: &Observations) -> Vec<MoveWalk> {
    obs.plans
        .iter()
        .zip(obs.results.iter())
        .map(|(plan, result)| {
            let mut doors = vec![];
            let mut writes = vec![];
            let mut labels = vec![result[0]];
            let mut pending = None;
            for (i, &action) in plan.iter().enumerate() {
                match action {
                    Action::Charcoal(x) => pending = Some(x),
                    Action::Move(d) => {
                        doors.push(d);
                        writes.push(pending.take());
                        labels.push(result[i + 1]);
                    }
                }
            }
            MoveWalk {
                doors,
                writes,
                labels,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::parse_plan;

    #[test]
    fn move_walks_strip_charcoal() {
        let obs = Observations {
            plans: vec![parse_plan("[1]0[2]12")],
            results: vec![vec![0, 1, 3, 2, 1, 0]],
        };
        let walks = move_walks(&obs);
        assert_eq!(walks.len(), 1);
        assert_eq!(walks[0].doors, vec![0, 1, 2]);
        assert_eq!(walks[0].writes, vec![Some(1), Some(2), None]);
        assert_eq!(walks[0].labels, vec![0, 3, 1, 0]);
        assert!(walks[0].has_writes());
    }

    #[test]
    fn balanced_plans_are_balanced() {
        let mut rng = rand::rng();
        let plan = balanced_move_plan(36, &mut rng);
        let mut counts = [0; 6];
        for a in &plan {
            if let Action::Move(d) = a {
                counts[*d] += 1;
            }
        }
        assert_eq!(counts, [6; 6]);
    }
}
