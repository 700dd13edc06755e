//! Fingerprint reconstruction.
//!
//! Every door string of length 0..L is a "prefix path"; a fixed panel of
//! random "hasher" suffixes is appended to each, and the whole batch goes to
//! the judge as one explore. The tuple of label sequences a prefix produces
//! under the panel is its fingerprint: two prefixes end in the same room iff
//! their fingerprints agree. From the identified rooms the solver reads off
//! labels, the starting room and a door-destination map.
//!
//! Labels cannot separate duplicated layers, so the solver always targets the
//! k-room base quotient; for d = 1 that is the whole graph.

use crate::connections;
use crate::judge::Observations;
use crate::map::{Action, Aedificium, DOORS, format_plan};
use crate::problems::Problem;
use crate::solver::Solver;
use itertools::Itertools;
use rand::prelude::*;
use rand_chacha::ChaCha20Rng;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Clone, Debug)]
pub struct FingerprintConfig {
    /// Prefix depths to enumerate: every door string of length 0..first_steps.
    pub first_steps: usize,
    /// Length of each hasher suffix.
    pub hash_length: usize,
    /// Number of hasher suffixes.
    pub hash_count: usize,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            first_steps: 5,
            hash_length: 6,
            hash_count: 6,
        }
    }
}

pub struct FingerprintSolver {
    pub config: FingerprintConfig,
}

impl Default for FingerprintSolver {
    fn default() -> Self {
        Self {
            config: FingerprintConfig::default(),
        }
    }
}

impl FingerprintSolver {
    pub fn new(config: FingerprintConfig) -> Self {
        Self { config }
    }

    /// Hasher suffixes, regenerable from the seed. Sorted so fingerprint
    /// components always appear in the same canonical order.
    fn hashers(&self, seed: u64) -> Vec<Vec<usize>> {
        let mut rng = ChaCha20Rng::seed_from_u64(seed ^ 0xf17e_5eed);
        let mut hashers: Vec<Vec<usize>> = (0..self.config.hash_count)
            .map(|_| {
                (0..self.config.hash_length)
                    .map(|_| rng.random_range(0..DOORS))
                    .collect()
            })
            .collect();
        hashers.sort();
        hashers.dedup();
        hashers
    }

    /// All prefixes of length 0..first_steps, shortest first.
    fn prefixes(&self) -> Vec<Vec<usize>> {
        let mut prefixes = vec![vec![]];
        for len in 1..self.config.first_steps {
            prefixes.extend(
                (0..len)
                    .map(|_| 0..DOORS)
                    .multi_cartesian_product()
                    .collect::<Vec<_>>(),
            );
        }
        prefixes
    }

    fn plan_for(prefix: &[usize], hasher: &[usize]) -> Vec<Action> {
        prefix
            .iter()
            .chain(hasher.iter())
            .map(|&d| Action::Move(d))
            .collect()
    }
}

impl Solver for FingerprintSolver {
    fn name(&self) -> &'static str {
        "fingerprint"
    }

    fn plan_requests(&self, problem: &Problem, seed: u64) -> Vec<Vec<Action>> {
        let max_len = 6 * problem.num_rooms();
        let hashers = self.hashers(seed);
        self.prefixes()
            .iter()
            .cartesian_product(hashers.iter())
            .map(|(prefix, hasher)| Self::plan_for(prefix, hasher))
            .filter(|plan| plan.len() <= max_len)
            .collect()
    }

    fn reconstruct(
        &self,
        obs: &Observations,
        problem: &Problem,
        cancel: &AtomicBool,
        seed: u64,
    ) -> Option<Aedificium> {
        if cancel.load(Ordering::Relaxed) {
            return None;
        }
        let num_rooms = problem.size;
        let hashers = self.hashers(seed);
        let prefixes = self.prefixes();

        // Locate this solver's plans among the observations.
        let mut by_plan: FxHashMap<String, &Vec<usize>> = FxHashMap::default();
        for (plan, result) in obs.plans.iter().zip(obs.results.iter()) {
            by_plan.insert(format_plan(plan), result);
        }

        // Fingerprint every prefix; remember the label seen at its end.
        let mut fingerprints: Vec<Vec<&[usize]>> = Vec::with_capacity(prefixes.len());
        let mut end_labels: Vec<usize> = Vec::with_capacity(prefixes.len());
        for prefix in &prefixes {
            let mut components: Vec<&[usize]> = Vec::with_capacity(hashers.len());
            let mut end_label = None;
            for hasher in &hashers {
                let key = format_plan(&Self::plan_for(prefix, hasher));
                let result = by_plan.get(&key)?;
                components.push(&result[prefix.len() + 1..]);
                end_label = Some(result[prefix.len()]);
            }
            fingerprints.push(components);
            end_labels.push(end_label?);
        }

        // Identify prefixes by fingerprint.
        let mut room_ids: FxHashMap<&[&[usize]], usize> = FxHashMap::default();
        let mut prefix_rooms: Vec<usize> = Vec::with_capacity(prefixes.len());
        for fp in &fingerprints {
            let next = room_ids.len();
            let id = *room_ids.entry(fp.as_slice()).or_insert(next);
            prefix_rooms.push(id);
        }
        if room_ids.len() < num_rooms {
            eprintln!(
                "fingerprint: only {} distinct fingerprints for {} rooms",
                room_ids.len(),
                num_rooms
            );
            return None;
        }
        if room_ids.len() > num_rooms {
            // More identities than rooms: hasher panel split a single room.
            return None;
        }

        // Labels per identified room.
        let mut rooms: Vec<Option<usize>> = vec![None; num_rooms];
        for (&room, &label) in prefix_rooms.iter().zip(end_labels.iter()) {
            match rooms[room] {
                None => rooms[room] = Some(label),
                Some(existing) if existing != label => return None,
                Some(_) => {}
            }
        }
        let rooms: Vec<usize> = rooms.into_iter().collect::<Option<Vec<_>>>()?;

        // Door destinations from prefix pairs (parent, parent + door).
        let mut index_of: FxHashMap<&[usize], usize> = FxHashMap::default();
        for (i, prefix) in prefixes.iter().enumerate() {
            index_of.insert(prefix.as_slice(), i);
        }
        let mut dests: FxHashMap<(usize, usize), usize> = FxHashMap::default();
        for (i, prefix) in prefixes.iter().enumerate() {
            let Some((&last_door, parent)) = prefix.split_last() else {
                continue;
            };
            let parent_room = prefix_rooms[index_of[parent]];
            let next_room = prefix_rooms[i];
            match dests.get(&(parent_room, last_door)) {
                None => {
                    dests.insert((parent_room, last_door), next_room);
                }
                Some(&existing) if existing != next_room => {
                    eprintln!(
                        "fingerprint: door ({}, {}) reaches both {} and {}",
                        parent_room, last_door, existing, next_room
                    );
                    return None;
                }
                Some(_) => {}
            }
        }
        if dests.len() != num_rooms * DOORS {
            eprintln!(
                "fingerprint: {} of {} doors observed",
                dests.len(),
                num_rooms * DOORS
            );
            return None;
        }

        // The first prefix is the empty path: it names the starting room.
        let start = prefix_rooms[0];
        let candidate = connections::assemble(rooms, start, &dests)?;
        candidate.validate().ok()?;
        // The candidate must replay every fingerprint walk.
        for prefix in &prefixes {
            for hasher in &hashers {
                let plan = Self::plan_for(prefix, hasher);
                if let Some(result) = by_plan.get(&format_plan(&plan)) {
                    if candidate.simulate(&plan) != **result {
                        return None;
                    }
                }
            }
        }
        Some(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_requests_cover_all_prefixes() {
        let solver = FingerprintSolver::new(FingerprintConfig {
            first_steps: 3,
            hash_length: 4,
            hash_count: 3,
        });
        let problem = Problem {
            problem: "test".to_string(),
            size: 6,
            duplication: 1,
        };
        let plans = solver.plan_requests(&problem, 9);
        // (1 + 6 + 36) prefixes x 3 hashers, unless a hasher collision
        // deduplicated the panel.
        assert!(plans.len() == 43 * 3 || plans.len() == 43 * 2);
        assert!(plans.iter().all(|p| p.len() <= 6 * 6));
    }

    #[test]
    fn reconstructs_random_six_room_maps() {
        // Depth-6 prefixes with a panel of four length-6 hashers.
        let solver = FingerprintSolver::new(FingerprintConfig {
            first_steps: 6,
            hash_length: 6,
            hash_count: 4,
        });
        let problem = Problem {
            problem: "test6".to_string(),
            size: 6,
            duplication: 1,
        };
        let cancel = AtomicBool::new(false);
        let mut successes = 0;
        for seed in 0..6u64 {
            let mut rng = ChaCha20Rng::seed_from_u64(1000 + seed);
            let hidden = crate::mapgen::random_single(6, &mut rng);
            let plans = solver.plan_requests(&problem, seed);
            let results: Vec<Vec<usize>> = plans.iter().map(|p| hidden.simulate(p)).collect();
            let obs = Observations { plans, results };
            if let Some(candidate) = solver.reconstruct(&obs, &problem, &cancel, seed) {
                assert_eq!(
                    hidden.equivalence_test(&candidate, true),
                    None,
                    "seed {} produced an inequivalent map",
                    seed
                );
                successes += 1;
            }
        }
        assert!(successes >= 4, "only {}/6 seeds reconstructed", successes);
    }
}
