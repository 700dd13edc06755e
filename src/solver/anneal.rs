//! Simulated-annealing reconstruction.
//!
//! Two variants share the exponential cooling schedule and Metropolis
//! acceptance rule:
//!
//! - `EdgeAnneal` searches door-destination tables directly: the state is a
//!   label vector plus a door involution, and the dominant mutation rewires
//!   two connections.
//! - `HistoryAnneal` searches per-step room identities for one observed walk;
//!   the door table is derived from the history and inconsistencies are the
//!   cost.
//!
//! Both treat the observations as move-only walks and return `None` unless
//! they reach cost zero.

use crate::SetMinMax;
use crate::connections;
use crate::judge::Observations;
use crate::map::{Aedificium, DOORS};
use crate::problems::Problem;
use crate::solver::{MoveWalk, Solver, move_walks};
use rand::prelude::*;
use rand_chacha::ChaCha20Rng;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::atomic::{AtomicBool, Ordering};

const CANCEL_CHECK_MASK: usize = 0x3ff;

/// Exponential cooling: `T(t) = T0 * exp(-alpha * t / t_max)` with
/// `alpha = ln(T0 / T_end)`.
#[derive(Clone, Copy, Debug)]
pub struct Cooling {
    pub t0: f64,
    pub t_end: f64,
}

impl Cooling {
    pub fn temperature(&self, iteration: usize, max_iterations: usize) -> f64 {
        let alpha = (self.t0 / self.t_end).ln();
        self.t0 * (-alpha * iteration as f64 / max_iterations as f64).exp()
    }

    /// Accepts strictly improving moves, worsening ones with probability
    /// `exp(-delta / T)`.
    pub fn accept(&self, delta: f64, temperature: f64, rng: &mut impl Rng) -> bool {
        delta < 0.0 || (temperature > 0.0 && rng.random::<f64>() < (-delta / temperature).exp())
    }
}

// --------------------------- n-gram fingerprints --------------------------

const NGRAM_PRIME: u64 = 11;
const NGRAM_MOD: u64 = 998244353;

fn ngram_hashes(seq: &[u64], n: usize) -> FxHashSet<u64> {
    let mut hashes = FxHashSet::default();
    if seq.len() < n {
        return hashes;
    }
    let mut pw = 1u64;
    for _ in 0..n {
        pw = pw * NGRAM_PRIME % NGRAM_MOD;
    }
    let mut hash = 0u64;
    for (i, &x) in seq.iter().enumerate() {
        hash = (hash * NGRAM_PRIME + x) % NGRAM_MOD;
        if i >= n {
            hash = (hash + NGRAM_MOD - seq[i - n] * pw % NGRAM_MOD) % NGRAM_MOD;
        }
        if i >= n - 1 {
            hashes.insert(hash);
        }
    }
    hashes
}

/// `1 - |a ∩ b| / |a ∪ b|`; zero iff the n-gram sets coincide.
fn ngram_distance(a: &[u64], b: &[u64], n: usize) -> f64 {
    let ha = ngram_hashes(a, n);
    let hb = ngram_hashes(b, n);
    let inter = ha.intersection(&hb).count();
    let union = ha.len() + hb.len() - inter;
    if union == 0 {
        0.0
    } else {
        1.0 - inter as f64 / union as f64
    }
}

// ------------------------- state space A: edges ---------------------------

/// Knobs for the door-table annealer. The mutation weights favour the
/// connection-rewiring move heavily; they are empirical.
#[derive(Clone, Debug)]
pub struct EdgeAnnealConfig {
    pub iterations: usize,
    pub cooling: Cooling,
    pub weights: [u32; 4],
    pub position_weight: f64,
    pub ngram_weight: f64,
    pub mutation_retries: usize,
}

impl Default for EdgeAnnealConfig {
    fn default() -> Self {
        Self {
            iterations: 400_000,
            cooling: Cooling {
                t0: 1e-1,
                t_end: 1e-4,
            },
            weights: [1, 17, 1, 1],
            position_weight: 0.5,
            ngram_weight: 0.5,
            mutation_retries: 10,
        }
    }
}

struct EdgeState {
    labels: Vec<usize>,
    graph: Vec<[(usize, usize); 6]>,
}

impl EdgeState {
    /// Random perfect matching over all doors; `labels[i] = i % 4` with the
    /// start room (index 0) holding the first observed label.
    fn random(n: usize, first_label: usize, rng: &mut impl Rng) -> Option<EdgeState> {
        let mut labels: Vec<usize> = (0..n).map(|i| i % 4).collect();
        if first_label >= n {
            return None;
        }
        labels.swap(0, first_label);

        let mut graph = vec![[(!0, !0); 6]; n];
        let mut doors: Vec<(usize, usize)> = (0..n)
            .flat_map(|r| (0..DOORS).map(move |d| (r, d)))
            .collect();
        let mut at = 0;
        while at < doors.len() {
            let target = rng.random_range(at..doors.len());
            if target == at {
                let (r, d) = doors[at];
                graph[r][d] = (r, d);
                at += 1;
            } else {
                let a = doors[at];
                let b = doors[target];
                graph[a.0][a.1] = b;
                graph[b.0][b.1] = a;
                doors[target] = doors[at + 1];
                at += 2;
            }
        }
        Some(EdgeState { labels, graph })
    }

    fn simulate(&self, doors: &[usize]) -> Vec<usize> {
        let mut u = 0;
        let mut out = Vec::with_capacity(doors.len() + 1);
        out.push(self.labels[u]);
        for &d in doors {
            u = self.graph[u][d].0;
            out.push(self.labels[u]);
        }
        out
    }
}

enum EdgeUndo {
    SwapLabels(usize, usize),
    Rewire([((usize, usize), (usize, usize)); 4]),
    Slots([((usize, usize), (usize, usize)); 2]),
}

fn apply_mutation(
    state: &mut EdgeState,
    kind: usize,
    rng: &mut impl Rng,
) -> Option<EdgeUndo> {
    let n = state.labels.len();
    match kind {
        0 => {
            // Swap the labels of two rooms (never the start room).
            if n <= 2 {
                return None;
            }
            let a = rng.random_range(1..n);
            let b = rng.random_range(1..n);
            if a == b || state.labels[a] == state.labels[b] {
                return None;
            }
            state.labels.swap(a, b);
            Some(EdgeUndo::SwapLabels(a, b))
        }
        1 => {
            // Rewire two connections by exchanging one endpoint.
            let a = (rng.random_range(0..n), rng.random_range(0..DOORS));
            let b = (rng.random_range(0..n), rng.random_range(0..DOORS));
            let pa = state.graph[a.0][a.1];
            let pb = state.graph[b.0][b.1];
            let doors = [a, pa, b, pb];
            for i in 0..4 {
                for j in i + 1..4 {
                    if doors[i] == doors[j] {
                        return None;
                    }
                }
            }
            let undo = EdgeUndo::Rewire([(a, pa), (pa, a), (b, pb), (pb, b)]);
            state.graph[a.0][a.1] = pb;
            state.graph[pb.0][pb.1] = a;
            state.graph[b.0][b.1] = pa;
            state.graph[pa.0][pa.1] = b;
            Some(undo)
        }
        2 => {
            // Fuse two self-loops into one cross connection.
            let loops: Vec<(usize, usize)> = (0..n)
                .flat_map(|r| (0..DOORS).map(move |d| (r, d)))
                .filter(|&(r, d)| state.graph[r][d] == (r, d))
                .collect();
            if loops.len() < 2 {
                return None;
            }
            let i = rng.random_range(0..loops.len());
            let mut j = rng.random_range(0..loops.len() - 1);
            if j >= i {
                j += 1;
            }
            let (a, b) = (loops[i], loops[j]);
            state.graph[a.0][a.1] = b;
            state.graph[b.0][b.1] = a;
            Some(EdgeUndo::Slots([(a, a), (b, b)]))
        }
        _ => {
            // Split a cross connection into two self-loops.
            let edges: Vec<(usize, usize)> = (0..n)
                .flat_map(|r| (0..DOORS).map(move |d| (r, d)))
                .filter(|&(r, d)| state.graph[r][d] != (r, d))
                .collect();
            if edges.is_empty() {
                return None;
            }
            let a = edges[rng.random_range(0..edges.len())];
            let b = state.graph[a.0][a.1];
            let undo = EdgeUndo::Slots([(a, b), (b, a)]);
            state.graph[a.0][a.1] = a;
            state.graph[b.0][b.1] = b;
            Some(undo)
        }
    }
}

fn revert_mutation(state: &mut EdgeState, undo: EdgeUndo) {
    match undo {
        EdgeUndo::SwapLabels(a, b) => state.labels.swap(a, b),
        EdgeUndo::Rewire(slots) => {
            for ((r, d), v) in slots {
                state.graph[r][d] = v;
            }
        }
        EdgeUndo::Slots(slots) => {
            for ((r, d), v) in slots {
                state.graph[r][d] = v;
            }
        }
    }
}

fn edge_cost(state: &EdgeState, walks: &[&MoveWalk], config: &EdgeAnnealConfig) -> f64 {
    let mut total = 0.0;
    for walk in walks {
        let sim = state.simulate(&walk.doors);
        let mismatches = sim
            .iter()
            .zip(walk.labels.iter())
            .filter(|(a, b)| a != b)
            .count();
        let positional = mismatches as f64 / sim.len() as f64;

        // Interleave labels with the doors taken so the n-grams carry the
        // plan context, not just the label stream.
        let interleave = |labels: &[usize]| -> Vec<u64> {
            let mut seq = Vec::with_capacity(labels.len() * 2);
            for (i, &l) in labels.iter().enumerate() {
                seq.push(l as u64);
                if i < walk.doors.len() {
                    seq.push(4 + walk.doors[i] as u64);
                }
            }
            seq
        };
        let observed = interleave(&walk.labels);
        let simulated = interleave(&sim);
        let ngram = (ngram_distance(&observed, &simulated, 3)
            + ngram_distance(&observed, &simulated, 5))
            / 2.0;

        total += config.position_weight * positional + config.ngram_weight * ngram;
    }
    total / walks.len() as f64
}

/// Door-destination-table annealer (state space A).
pub struct EdgeAnnealSolver {
    pub config: EdgeAnnealConfig,
}

impl Default for EdgeAnnealSolver {
    fn default() -> Self {
        Self {
            config: EdgeAnnealConfig::default(),
        }
    }
}

impl EdgeAnnealSolver {
    fn run(
        &self,
        walks: &[&MoveWalk],
        n: usize,
        cancel: &AtomicBool,
        rng: &mut impl Rng,
    ) -> Option<Aedificium> {
        let config = &self.config;
        let mut state = EdgeState::random(n, walks[0].labels[0], rng)?;
        let mut cost = edge_cost(&state, walks, config);
        let mut best = cost;
        let total_weight: u32 = config.weights.iter().sum();

        for iteration in 0..config.iterations {
            if iteration & CANCEL_CHECK_MASK == 0 && cancel.load(Ordering::Relaxed) {
                return None;
            }
            if best == 0.0 {
                break;
            }
            let temperature = config.cooling.temperature(iteration, config.iterations);

            let mut undo = None;
            for _ in 0..config.mutation_retries {
                let mut pick = rng.random_range(0..total_weight);
                let mut kind = 0;
                for (i, &w) in config.weights.iter().enumerate() {
                    if pick < w {
                        kind = i;
                        break;
                    }
                    pick -= w;
                }
                if let Some(u) = apply_mutation(&mut state, kind, rng) {
                    undo = Some(u);
                    break;
                }
            }
            let Some(undo) = undo else { continue };

            let new_cost = edge_cost(&state, walks, config);
            if config.cooling.accept(new_cost - cost, temperature, rng) {
                cost = new_cost;
                if best.setmin(cost) && iteration % 10_000 == 0 {
                    eprintln!("anneal-edge: iter {} best {:.5}", iteration, best);
                }
            } else {
                revert_mutation(&mut state, undo);
            }
        }

        // Zero cost breaks out on the very next iteration, so the live state
        // is the zero-cost state.
        if best > 0.0 || edge_cost(&state, walks, config) > 0.0 {
            return None;
        }
        let candidate = Aedificium {
            rooms: state.labels,
            start: 0,
            graph: state.graph,
        };
        candidate.validate().ok()?;
        Some(candidate)
    }
}

impl Solver for EdgeAnnealSolver {
    fn name(&self) -> &'static str {
        "anneal-edge"
    }

    fn reconstruct(
        &self,
        obs: &Observations,
        problem: &Problem,
        cancel: &AtomicBool,
        seed: u64,
    ) -> Option<Aedificium> {
        let walks = move_walks(obs);
        let selected: Vec<&MoveWalk> = walks.iter().filter(|w| !w.has_writes()).collect();
        if selected.is_empty() {
            return None;
        }
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        self.run(&selected, problem.size, cancel, &mut rng)
    }
}

// ------------------------ state space B: histories ------------------------

/// Knobs for the room-history annealer.
#[derive(Clone, Debug)]
pub struct HistoryAnnealConfig {
    pub iterations: usize,
    pub cooling: Cooling,
    pub weights: [u32; 3],
}

impl Default for HistoryAnnealConfig {
    fn default() -> Self {
        Self {
            iterations: 400_000,
            cooling: Cooling {
                t0: 1e-2,
                t_end: 1e-5,
            },
            weights: [1, 2, 3],
        }
    }
}

/// Cost data derived from one candidate history.
pub(crate) struct HistoryEval {
    pub(crate) conflicts: Vec<usize>,
    pub(crate) overflow_doors: Vec<(usize, usize)>,
    pub(crate) cost: f64,
}

pub(crate) fn evaluate_history(history: &[usize], doors: &[usize], n: usize) -> HistoryEval {
    let mut dests: FxHashMap<(usize, usize), (usize, usize)> = FxHashMap::default();
    let mut incoming: Vec<FxHashSet<(usize, usize)>> = vec![FxHashSet::default(); n];
    let mut conflicts = vec![];
    for (i, &door) in doors.iter().enumerate() {
        let from = history[i];
        let to = history[i + 1];
        match dests.get(&(from, door)) {
            Some(&(first_index, first_to)) if first_to != to => {
                conflicts.extend([i, i + 1, first_index, first_index + 1]);
            }
            Some(_) => {}
            None => {
                dests.insert((from, door), (i, to));
                incoming[to].insert((from, door));
            }
        }
    }
    let mut overflow_doors = vec![];
    let mut overflow = 0usize;
    for room_incoming in &incoming {
        if room_incoming.len() > DOORS {
            overflow += room_incoming.len() - DOORS;
            overflow_doors.extend(room_incoming.iter().copied());
        }
    }
    let cost = (conflicts.len() / 4 + overflow) as f64 / history.len() as f64;
    HistoryEval {
        conflicts,
        overflow_doors,
        cost,
    }
}

pub(crate) fn perturb(history: &mut [usize], index: usize, n: usize, rng: &mut impl Rng) {
    let label = history[index] % 4;
    let mut candidate = rng.random_range(0..n) / 4 * 4 + label;
    if candidate >= n {
        candidate -= 4;
    }
    history[index] = candidate;
}

/// Majority-vote door table over the whole history.
fn majority_dests(history: &[usize], doors: &[usize]) -> FxHashMap<(usize, usize), usize> {
    let mut votes: FxHashMap<(usize, usize), FxHashMap<usize, usize>> = FxHashMap::default();
    for (i, &door) in doors.iter().enumerate() {
        *votes
            .entry((history[i], door))
            .or_default()
            .entry(history[i + 1])
            .or_default() += 1;
    }
    votes
        .into_iter()
        .map(|(door, tally)| {
            let (to, _) = tally
                .into_iter()
                .max_by_key(|&(to, count)| (count, usize::MAX - to))
                .unwrap();
            (door, to)
        })
        .collect()
}

/// Room-history annealer (state space B). Consumes the first charcoal-free
/// observation.
pub struct HistoryAnnealSolver {
    pub config: HistoryAnnealConfig,
}

impl Default for HistoryAnnealSolver {
    fn default() -> Self {
        Self {
            config: HistoryAnnealConfig::default(),
        }
    }
}

impl HistoryAnnealSolver {
    /// Runs the annealing loop, returning the candidate and the best-cost
    /// trace (monotonically non-increasing).
    pub(crate) fn run(
        &self,
        walk: &MoveWalk,
        n: usize,
        cancel: &AtomicBool,
        rng: &mut impl Rng,
    ) -> (Option<Aedificium>, Vec<f64>) {
        let config = &self.config;
        // Initial history: the label itself is the smallest room congruent
        // to it mod 4.
        let history: Vec<usize> = walk.labels.clone();
        if history.iter().any(|&h| h >= n) {
            return (None, vec![]);
        }
        let mut history = history;
        let mut eval = evaluate_history(&history, &walk.doors, n);
        let mut cost = eval.cost;
        let mut best = cost;
        let mut best_history = history.clone();
        let mut trace = vec![best];
        let total_weight: u32 = config.weights.iter().sum();

        for iteration in 0..config.iterations {
            if iteration & CANCEL_CHECK_MASK == 0 && cancel.load(Ordering::Relaxed) {
                return (None, trace);
            }
            if best == 0.0 {
                break;
            }
            let temperature = config.cooling.temperature(iteration, config.iterations);

            let mut pick = rng.random_range(0..total_weight);
            let mut kind = 0;
            for (i, &w) in config.weights.iter().enumerate() {
                if pick < w {
                    kind = i;
                    break;
                }
                pick -= w;
            }
            let mut next = history.clone();
            match kind {
                1 if !eval.conflicts.is_empty() => {
                    let index = eval.conflicts[rng.random_range(0..eval.conflicts.len())];
                    perturb(&mut next, index, n, rng);
                }
                2 if !eval.overflow_doors.is_empty() => {
                    let door =
                        eval.overflow_doors[rng.random_range(0..eval.overflow_doors.len())];
                    for (i, &d) in walk.doors.iter().enumerate() {
                        if (next[i], d) == door {
                            perturb(&mut next, i + 1, n, rng);
                        }
                    }
                }
                _ => {
                    let index = rng.random_range(0..next.len());
                    perturb(&mut next, index, n, rng);
                }
            }

            let next_eval = evaluate_history(&next, &walk.doors, n);
            if config.cooling.accept(next_eval.cost - cost, temperature, rng) {
                history = next;
                eval = next_eval;
                cost = eval.cost;
                if best.setmin(cost) {
                    best_history = history.clone();
                    trace.push(best);
                }
            }
        }

        if best > 0.0 {
            return (None, trace);
        }
        (rebuild_history(&best_history, walk, n), trace)
    }
}

/// Turns a zero-cost history into a map: labels from the visited rooms, the
/// door table by majority vote, connections via the reconstructor.
pub(crate) fn rebuild_history(history: &[usize], walk: &MoveWalk, n: usize) -> Option<Aedificium> {
    let mut rooms: Vec<Option<usize>> = vec![None; n];
    for (&room, &label) in history.iter().zip(walk.labels.iter()) {
        match rooms[room] {
            None => rooms[room] = Some(label),
            Some(existing) if existing != label => return None,
            Some(_) => {}
        }
    }
    let rooms: Vec<usize> = rooms.into_iter().collect::<Option<Vec<_>>>()?;
    let dests = majority_dests(history, &walk.doors);
    let graph = connections::build_graph(&dests, n)?;
    let candidate = Aedificium {
        rooms,
        start: history[0],
        graph,
    };
    candidate.validate().ok()?;
    // The candidate must replay the walk it was built from.
    let plan: Vec<crate::map::Action> = walk
        .doors
        .iter()
        .map(|&d| crate::map::Action::Move(d))
        .collect();
    if candidate.simulate(&plan) != walk.labels {
        return None;
    }
    Some(candidate)
}

impl Solver for HistoryAnnealSolver {
    fn name(&self) -> &'static str {
        "anneal-history"
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
        self.run(walk, problem.size, cancel, &mut rng).0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::Observations;
    use crate::solver::random_move_plan;

    fn observe(n: usize, map_seed: u64, plan_len: usize, plan_seed: u64) -> (Aedificium, Observations) {
        let mut rng = ChaCha20Rng::seed_from_u64(map_seed);
        let hidden = crate::mapgen::random_single(n, &mut rng);
        let mut rng = ChaCha20Rng::seed_from_u64(plan_seed);
        let plan = random_move_plan(plan_len, &mut rng);
        let result = hidden.simulate(&plan);
        (
            hidden,
            Observations {
                plans: vec![plan],
                results: vec![result],
            },
        )
    }

    #[test]
    fn cooling_interpolates_between_endpoints() {
        let cooling = Cooling {
            t0: 1e-2,
            t_end: 1e-5,
        };
        assert!((cooling.temperature(0, 100) - 1e-2).abs() < 1e-9);
        assert!((cooling.temperature(100, 100) - 1e-5).abs() < 1e-9);
        assert!(cooling.temperature(50, 100) < 1e-2);
        assert!(cooling.temperature(50, 100) > 1e-5);
    }

    #[test]
    fn ngram_distance_is_zero_for_equal_sequences() {
        let seq: Vec<u64> = vec![1, 2, 3, 4, 1, 2, 3];
        assert_eq!(ngram_distance(&seq, &seq, 3), 0.0);
        let other: Vec<u64> = vec![4, 3, 2, 1, 4, 3, 2];
        assert!(ngram_distance(&seq, &other, 3) > 0.0);
    }

    #[test]
    fn edge_cost_is_zero_on_the_true_graph() {
        let (hidden, obs) = observe(8, 21, 8 * 18, 22);
        let walks = move_walks(&obs);
        let selected: Vec<&MoveWalk> = walks.iter().collect();
        // Rebuild the true state: same labels, same graph, start as room 0.
        // The hidden start may differ from 0, so re-anchor via a renaming.
        let mut order: Vec<usize> = (0..hidden.num_rooms()).collect();
        order.swap(0, hidden.start);
        let mut rename = vec![0; hidden.num_rooms()];
        for (new, &old) in order.iter().enumerate() {
            rename[old] = new;
        }
        let mut graph = vec![[(0, 0); 6]; hidden.num_rooms()];
        for r in 0..hidden.num_rooms() {
            for d in 0..DOORS {
                let (r2, d2) = hidden.graph[r][d];
                graph[rename[r]][d] = (rename[r2], d2);
            }
        }
        let mut labels = vec![0; hidden.num_rooms()];
        for r in 0..hidden.num_rooms() {
            labels[rename[r]] = hidden.rooms[r];
        }
        let state = EdgeState { labels, graph };
        let cost = edge_cost(&state, &selected, &EdgeAnnealConfig::default());
        assert_eq!(cost, 0.0);
    }

    #[test]
    fn edge_mutations_preserve_the_involution() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let mut state = EdgeState::random(6, 0, &mut rng).unwrap();
        for step in 0..2000 {
            let kind = step % 4;
            let _ = apply_mutation(&mut state, kind, &mut rng);
            for r in 0..6 {
                for d in 0..DOORS {
                    let (r2, d2) = state.graph[r][d];
                    assert_eq!(state.graph[r2][d2], (r, d), "broken at step {}", step);
                }
            }
        }
    }

    #[test]
    fn edge_anneal_recovers_a_small_map() {
        let cancel = AtomicBool::new(false);
        let solver = EdgeAnnealSolver {
            config: EdgeAnnealConfig {
                iterations: 80_000,
                ..EdgeAnnealConfig::default()
            },
        };
        let problem = Problem {
            problem: "tiny".to_string(),
            size: 3,
            duplication: 1,
        };
        for seed in 0..4 {
            let (_, obs) = observe(3, 100 + seed, 3 * 18, 200 + seed);
            if let Some(candidate) = solver.reconstruct(&obs, &problem, &cancel, seed) {
                assert_eq!(
                    candidate.simulate(&obs.plans[0]),
                    obs.results[0],
                    "candidate must replay the observation"
                );
                return;
            }
        }
        panic!("no seed annealed to zero cost");
    }

    #[test]
    fn history_cost_is_zero_on_the_true_history() {
        let (hidden, obs) = observe(8, 31, 8 * 18, 32);
        let walks = move_walks(&obs);
        // True history by replaying the hidden map.
        let mut u = hidden.start;
        let mut history = vec![u];
        for &d in &walks[0].doors {
            u = hidden.step(u, d).0;
            history.push(u);
        }
        // Room ids double as labels only when ids are label-consistent, so
        // evaluate conflicts directly: the true history has none.
        let eval = evaluate_history(&history, &walks[0].doors, hidden.num_rooms());
        assert_eq!(eval.cost, 0.0);
    }

    #[test]
    fn history_anneal_best_cost_never_increases() {
        let (_, obs) = observe(6, 41, 6 * 18, 42);
        let walks = move_walks(&obs);
        let solver = HistoryAnnealSolver {
            config: HistoryAnnealConfig {
                iterations: 60_000,
                ..HistoryAnnealConfig::default()
            },
        };
        let cancel = AtomicBool::new(false);
        let mut rng = ChaCha20Rng::seed_from_u64(0);
        let (_, trace) = solver.run(&walks[0], 6, &cancel, &mut rng);
        assert!(!trace.is_empty());
        for pair in trace.windows(2) {
            assert!(pair[1] <= pair[0], "best cost increased: {:?}", pair);
        }
    }

    #[test]
    fn history_anneal_recovers_a_small_map() {
        let cancel = AtomicBool::new(false);
        let solver = HistoryAnnealSolver {
            config: HistoryAnnealConfig {
                iterations: 150_000,
                ..HistoryAnnealConfig::default()
            },
        };
        let problem = Problem {
            problem: "tiny".to_string(),
            size: 8,
            duplication: 1,
        };
        for seed in 0..4 {
            let (_, obs) = observe(8, 300 + seed, 8 * 18, 400 + seed);
            if let Some(candidate) = solver.reconstruct(&obs, &problem, &cancel, seed) {
                assert_eq!(candidate.simulate(&obs.plans[0]), obs.results[0]);
                return;
            }
        }
        panic!("no seed annealed to zero cost");
    }
}
