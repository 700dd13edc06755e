//! Duplication lifting.
//!
//! A base reconstruction of the k-room quotient says nothing about how the
//! d layers cross-wire. The lifter runs additional charcoal-annotated
//! expeditions: marking every base room's first-visited copy makes the copies
//! distinguishable by label, and replaying the walk on the base map decodes
//! which layer each step was in. Copies are numbered by marking order, not by
//! any intrinsic layer identity, which is all a guess needs.
//!
//! Expeditions share a common covering prefix, so the marked copies are the
//! same in every expedition and their destination maps can be merged. A
//! destination conflict, or a door left unobserved, fails the lift; the
//! orchestrator restarts with fresh randomness.

use crate::connections;
use crate::judge::Judge;
use crate::map::{Action, Aedificium, DOORS, move_count};
use anyhow::Result;
use rand::prelude::*;
use rustc_hash::FxHashMap;

/// How many charcoal expeditions a lift runs per phase.
pub const DEFAULT_EXPEDITIONS: usize = 10;

/// Expands a base reconstruction to the full duplicated map, issuing the
/// necessary explorations through `judge`.
pub fn lift(
    judge: &mut dyn Judge,
    base: &Aedificium,
    expeditions: usize,
    rng: &mut impl Rng,
) -> Result<Option<Aedificium>> {
    match judge.problem().duplication {
        1 => Ok(Some(base.clone())),
        2 => lift_double(judge, base, expeditions, rng),
        3 => lift_triple(judge, base, expeditions, rng),
        d => anyhow::bail!("unsupported duplication factor {}", d),
    }
}

fn random_tail(len: usize, rng: &mut impl Rng) -> Vec<usize> {
    (0..len).map(|_| rng.random_range(0..DOORS)).collect()
}

fn merge_dests(
    merged: &mut FxHashMap<(usize, usize), usize>,
    dests: FxHashMap<(usize, usize), usize>,
) -> bool {
    for (door, to) in dests {
        match merged.get(&door) {
            Some(&existing) if existing != to => {
                eprintln!(
                    "lift: door ({}, {}) maps to both {} and {}",
                    door.0, door.1, existing, to
                );
                return false;
            }
            _ => {
                merged.insert(door, to);
            }
        }
    }
    true
}

fn assemble_layers(
    base: &Aedificium,
    duplication: usize,
    dests: &FxHashMap<(usize, usize), usize>,
) -> Option<Aedificium> {
    let num_rooms = base.num_rooms() * duplication;
    if dests.len() != num_rooms * DOORS {
        eprintln!(
            "lift: {} of {} doors observed",
            dests.len(),
            num_rooms * DOORS
        );
        return None;
    }
    let rooms: Vec<usize> = (0..num_rooms)
        .map(|r| base.rooms[r % base.num_rooms()])
        .collect();
    let candidate = connections::assemble(rooms, base.start, dests)?;
    candidate.validate().ok()?;
    Some(candidate)
}

// --------------------------------- d = 2 ----------------------------------

fn lift_double(
    judge: &mut dyn Judge,
    base: &Aedificium,
    expeditions: usize,
    rng: &mut impl Rng,
) -> Result<Option<Aedificium>> {
    let k = base.num_rooms();
    let targets: Vec<usize> = (0..k).collect();
    let cover = base.build_covering_path(&targets);
    let max_len = k * 2 * 6;
    if cover.len() > max_len {
        return Ok(None);
    }

    let plans: Vec<Vec<Action>> = (0..expeditions)
        .map(|_| {
            let mut doors = cover.clone();
            doors.extend(random_tail(max_len - cover.len(), rng));
            base.inject_charcoal_on_first_visit(&doors)
        })
        .collect();
    let results = judge.explore(&plans)?;

    let mut merged = FxHashMap::default();
    for (plan, result) in plans.iter().zip(results.iter()) {
        let Some(dests) = decode_double(base, plan, result) else {
            continue; // internally inconsistent expedition, drop it
        };
        if !merge_dests(&mut merged, dests) {
            return Ok(None);
        }
    }
    Ok(assemble_layers(base, 2, &merged))
}

/// Replays an expedition on the base map and classifies every step as
/// marked-copy (layer 0) or unmarked-copy (layer 1). A room whose label
/// still matches the base after its copy was repainted must be the other
/// copy; a room about to be repainted is being visited first, i.e. layer 0.
fn decode_double(
    base: &Aedificium,
    plan: &[Action],
    result: &[usize],
) -> Option<FxHashMap<(usize, usize), usize>> {
    let k = base.num_rooms();
    let mut dests = FxHashMap::default();
    let mut room = base.start;
    let mut layer = 0usize;
    for (i, &action) in plan.iter().enumerate() {
        let Action::Move(door) = action else {
            // Charcoal marks the copy we are standing in; by construction
            // that copy is layer 0.
            layer = 0;
            continue;
        };
        let next_room = base.step(room, door).0;
        let label = result[i + 1];
        let next_marked = matches!(plan.get(i + 1), Some(Action::Charcoal(_)));
        let next_layer = if !next_marked && base.rooms[next_room] == label {
            1
        } else {
            0
        };
        let from = (room + layer * k, door);
        let to = next_room + next_layer * k;
        match dests.get(&from) {
            Some(&existing) if existing != to => return None,
            _ => {
                dests.insert(from, to);
            }
        }
        room = next_room;
        layer = next_layer;
    }
    Some(dests)
}

// --------------------------------- d = 3 ----------------------------------

fn lift_triple(
    judge: &mut dyn Judge,
    base: &Aedificium,
    expeditions: usize,
    rng: &mut impl Rng,
) -> Result<Option<Aedificium>> {
    let k = base.num_rooms();
    let targets: Vec<usize> = (0..k).collect();
    let cover = base.build_covering_path(&targets);
    let max_len = k * 3 * 6;
    if cover.len() > max_len {
        return Ok(None);
    }

    // Phase 1: find, per base room, the step that first enters a copy other
    // than the marked one. An expedition qualifies when it does so for every
    // room; the shortest qualifying prefix wins.
    let first_plans: Vec<Vec<Action>> = (0..expeditions)
        .map(|_| {
            let mut doors = cover.clone();
            doors.extend(random_tail(max_len - cover.len(), rng));
            base.inject_charcoal_on_first_visit(&doors)
        })
        .collect();
    let first_results = judge.explore(&first_plans)?;

    let mut best_prefix: Option<Vec<Action>> = None;
    for (plan, result) in first_plans.iter().zip(first_results.iter()) {
        let layer_b_pos = second_layer_entries(base, plan, result);
        if layer_b_pos.len() != k {
            continue;
        }
        let annotated = inject_second_layer_charcoal(base, plan, &layer_b_pos);
        let Some(last_charcoal) = annotated
            .iter()
            .rposition(|a| matches!(a, Action::Charcoal(_)))
        else {
            continue;
        };
        let prefix = annotated[..=last_charcoal].to_vec();
        let better = match &best_prefix {
            None => true,
            Some(best) => move_count(&prefix) < move_count(best),
        };
        if better {
            best_prefix = Some(prefix);
        }
    }
    let Some(prefix) = best_prefix else {
        eprintln!("lift: no expedition separated the second layer everywhere");
        return Ok(None);
    };

    // Phase 2: replay the prefix (which now paints layer 0 with +1 and
    // layer 1 with +2) and explore freely; three label offsets now
    // disambiguate the three copies.
    let prefix_moves = move_count(&prefix);
    let second_plans: Vec<Vec<Action>> = (0..expeditions)
        .map(|_| {
            let mut plan = prefix.clone();
            plan.extend(
                random_tail(max_len - prefix_moves, rng)
                    .into_iter()
                    .map(Action::Move),
            );
            plan
        })
        .collect();
    let second_results = judge.explore(&second_plans)?;

    let mut merged = FxHashMap::default();
    for (plan, result) in second_plans.iter().zip(second_results.iter()) {
        let Some(dests) = decode_triple(base, plan, result) else {
            continue;
        };
        if !merge_dests(&mut merged, dests) {
            return Ok(None);
        }
    }
    Ok(assemble_layers(base, 3, &merged))
}

/// Token indices whose move first enters an unmarked copy of an
/// already-marked base room, keyed by index with the room as value.
fn second_layer_entries(
    base: &Aedificium,
    plan: &[Action],
    result: &[usize],
) -> FxHashMap<usize, usize> {
    let mut marked = vec![false; base.num_rooms()];
    let mut second_seen = vec![false; base.num_rooms()];
    let mut entries = FxHashMap::default();
    let mut room = base.start;
    for (i, &action) in plan.iter().enumerate() {
        let Action::Move(door) = action else {
            marked[room] = true;
            continue;
        };
        let next = base.step(room, door).0;
        if marked[next] && base.rooms[next] == result[i + 1] && !second_seen[next] {
            second_seen[next] = true;
            entries.insert(i, next);
        }
        room = next;
    }
    entries
}

/// Appends a `(label + 2) mod 4` charcoal after each recorded second-layer
/// entry, leaving the rest of the plan untouched.
fn inject_second_layer_charcoal(
    base: &Aedificium,
    plan: &[Action],
    entries: &FxHashMap<usize, usize>,
) -> Vec<Action> {
    let mut out = Vec::with_capacity(plan.len() + entries.len());
    let mut room = base.start;
    for (i, &action) in plan.iter().enumerate() {
        out.push(action);
        let Action::Move(door) = action else {
            continue;
        };
        let next = base.step(room, door).0;
        if entries.contains_key(&i) {
            out.push(Action::Charcoal((base.rooms[next] + 2) % 4));
        }
        room = next;
    }
    out
}

/// Classifies every step among three copies by label offset: `+1` is the
/// first-marked copy, `+2` the second, the original label the third.
fn decode_triple(
    base: &Aedificium,
    plan: &[Action],
    result: &[usize],
) -> Option<FxHashMap<(usize, usize), usize>> {
    let k = base.num_rooms();
    let mut dests = FxHashMap::default();
    let mut room = base.start;
    let mut layer = 0usize;
    for (i, &action) in plan.iter().enumerate() {
        let Action::Move(door) = action else {
            continue;
        };
        let next_room = base.step(room, door).0;
        let mut label = result[i + 1];
        if let Some(Action::Charcoal(v)) = plan.get(i + 1) {
            // The room is being repainted right now; classify by the paint.
            label = *v;
        }
        let expected = base.rooms[next_room];
        let next_layer = if label == (expected + 1) % 4 {
            0
        } else if label == (expected + 2) % 4 {
            1
        } else if label == expected {
            2
        } else {
            return None;
        };
        let from = (room + layer * k, door);
        let to = next_room + next_layer * k;
        match dests.get(&from) {
            Some(&existing) if existing != to => return None,
            _ => {
                dests.insert(from, to);
            }
        }
        room = next_room;
        layer = next_layer;
    }
    Some(dests)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::LocalJudge;
    use crate::problems::Problem;
    use rand_chacha::ChaCha20Rng;

    fn lift_roundtrip(k: usize, d: usize, seeds: std::ops::Range<u64>) {
        for seed in seeds.clone() {
            let mut map_rng = ChaCha20Rng::seed_from_u64(seed);
            let truth = crate::mapgen::random_duplicated(k, d, &mut map_rng);
            let base = truth.deduplicate(d).expect("generated maps must fold");
            let problem = Problem {
                problem: format!("lift-test-{}-{}", k, d),
                size: k,
                duplication: d,
            };
            let mut judge = LocalJudge::with_map(problem, truth.clone());
            let mut rng = ChaCha20Rng::seed_from_u64(seed ^ 0xbeef);
            let lifted = lift(&mut judge, &base, DEFAULT_EXPEDITIONS, &mut rng).unwrap();
            let Some(lifted) = lifted else {
                continue; // coverage shortfall; try the next seed
            };
            assert_eq!(lifted.num_rooms(), k * d);
            lifted.validate().unwrap();
            assert_eq!(
                lifted.to_map().connections.len(),
                k * d * DOORS / 2,
                "every door pairs up exactly once"
            );
            assert_eq!(
                truth.equivalence_test(&lifted, true),
                None,
                "lifted map must be observationally equivalent (seed {seed})"
            );
            return;
        }
        panic!("no seed in {:?} produced a complete lift", seeds);
    }

    #[test]
    fn lifts_a_doubled_map() {
        lift_roundtrip(6, 2, 0..4);
    }

    #[test]
    fn lifts_a_tripled_map() {
        lift_roundtrip(4, 3, 10..14);
    }

    #[test]
    fn double_decode_classifies_layers_consistently() {
        let mut rng = ChaCha20Rng::seed_from_u64(9);
        let truth = crate::mapgen::random_duplicated(5, 2, &mut rng);
        let base = truth.deduplicate(2).unwrap();
        let doors: Vec<usize> = base.build_covering_path(&(0..5).collect::<Vec<_>>());
        let plan = base.inject_charcoal_on_first_visit(&doors);
        let result = truth.simulate(&plan);
        let dests = decode_double(&base, &plan, &result).expect("consistent expedition");
        // Every recorded destination projects onto the base transition.
        for (&(from, door), &to) in &dests {
            assert_eq!(base.step(from % 5, door).0, to % 5);
        }
    }
}
