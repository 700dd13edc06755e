//! Random map generation.
//!
//! Instances are built the way the judge builds them: labels are `i % 4`
//! shuffled, doors are paired by drawing uniformly (with replacement) from the
//! still-unused doors so self-loops occur naturally, and generation retries
//! until the result is connected with every door used. Duplicated instances
//! clone the base connection list into `d` layers and randomly swap endpoints
//! between the layers.

use crate::map::{Aedificium, DOORS};
use rand::prelude::*;

fn build_graph(n: usize, connections: &[((usize, usize), (usize, usize))]) -> Vec<[(usize, usize); 6]> {
    let mut graph = vec![[(!0, !0); 6]; n];
    for &((r1, d1), (r2, d2)) in connections {
        graph[r1][d1] = (r2, d2);
        graph[r2][d2] = (r1, d1);
    }
    graph
}

fn is_connected(n: usize, graph: &[[(usize, usize); 6]]) -> bool {
    if n == 0 {
        return true;
    }
    let mut seen = vec![false; n];
    let mut stack = vec![0];
    seen[0] = true;
    while let Some(u) = stack.pop() {
        for d in 0..DOORS {
            let v = graph[u][d].0;
            if !seen[v] {
                seen[v] = true;
                stack.push(v);
            }
        }
    }
    seen.iter().all(|&s| s)
}

fn all_doors_used(n: usize, graph: &[[(usize, usize); 6]]) -> bool {
    (0..n).all(|r| (0..DOORS).all(|d| graph[r][d] != (!0, !0)))
}

/// Generates a random single-layer instance with `num_rooms` rooms.
pub fn random_single(num_rooms: usize, rng: &mut impl Rng) -> Aedificium {
    let mut rooms: Vec<usize> = (0..num_rooms).map(|i| i % 4).collect();
    rooms.shuffle(rng);
    let zero_rooms: Vec<usize> = (0..num_rooms).filter(|&i| rooms[i] == 0).collect();
    let start = *zero_rooms.choose(rng).unwrap_or(&0);

    let max_attempts = 1000;
    let mut graph = vec![];
    for _ in 0..max_attempts {
        let mut unused: Vec<(usize, usize)> = (0..num_rooms)
            .flat_map(|r| (0..DOORS).map(move |d| (r, d)))
            .collect();
        let mut connections = vec![];
        while !unused.is_empty() {
            // Draw with replacement so the pair may be a single door,
            // which becomes a self-loop.
            let a = unused[rng.random_range(0..unused.len())];
            let b = unused[rng.random_range(0..unused.len())];
            connections.push((a, b));
            unused.retain(|&door| door != a && door != b);
        }
        graph = build_graph(num_rooms, &connections);
        if is_connected(num_rooms, &graph) && all_doors_used(num_rooms, &graph) {
            break;
        }
    }
    Aedificium {
        rooms,
        start,
        graph,
    }
}

/// Generates a random `d`-layer instance over a `single_rooms`-room base.
///
/// The base connection list is cloned once per layer, then endpoints of each
/// connection are swapped between layers 8..=12 times; a base self-loop door
/// is instead rewired once across two random layers. Labels repeat across
/// layers: `label(r) = label(r mod k)`.
pub fn random_duplicated(
    single_rooms: usize,
    duplication: usize,
    rng: &mut impl Rng,
) -> Aedificium {
    assert!(duplication >= 1);
    if duplication == 1 {
        return random_single(single_rooms, rng);
    }
    let num_rooms = single_rooms * duplication;
    let max_attempts = 10;
    let mut candidate = None;
    for _ in 0..max_attempts {
        let base = random_single(single_rooms, rng);
        let base_connections: Vec<((usize, usize), (usize, usize))> = base
            .to_map()
            .connections
            .iter()
            .map(|c| ((c.from.room, c.from.door), (c.to.room, c.to.door)))
            .collect();

        // One copy of every base connection per layer, offset by layer.
        let mut dupes: Vec<Vec<Option<((usize, usize), (usize, usize))>>> = (0..duplication)
            .map(|layer| {
                base_connections
                    .iter()
                    .map(|&((r1, d1), (r2, d2))| {
                        Some((
                            (r1 + layer * single_rooms, d1),
                            (r2 + layer * single_rooms, d2),
                        ))
                    })
                    .collect()
            })
            .collect();

        for ci in 0..base_connections.len() {
            let (from, to) = base_connections[ci];
            if from == to {
                // Self-loop door: merge two layers' loops into one cross edge.
                let i1 = rng.random_range(0..duplication);
                let i2 = rng.random_range(0..duplication);
                if i1 == i2 {
                    continue;
                }
                let other_from = dupes[i2][ci].unwrap().0;
                dupes[i1][ci] = Some((dupes[i1][ci].unwrap().0, other_from));
                dupes[i2][ci] = None;
            } else {
                for _ in 0..rng.random_range(8..=12) {
                    let swap_from = rng.random_bool(0.5);
                    let i1 = rng.random_range(0..duplication);
                    let mut i2 = rng.random_range(0..duplication - 1);
                    if i2 >= i1 {
                        i2 += 1;
                    }
                    let (mut a, mut b) = (dupes[i1][ci].unwrap(), dupes[i2][ci].unwrap());
                    if swap_from {
                        std::mem::swap(&mut a.0, &mut b.0);
                    } else {
                        std::mem::swap(&mut a.1, &mut b.1);
                    }
                    dupes[i1][ci] = Some(a);
                    dupes[i2][ci] = Some(b);
                }
            }
        }

        let connections: Vec<_> = dupes.into_iter().flatten().flatten().collect();
        let graph = build_graph(num_rooms, &connections);
        let rooms: Vec<usize> = (0..num_rooms)
            .map(|r| base.rooms[r % single_rooms])
            .collect();
        let aed = Aedificium {
            rooms,
            start: base.start,
            graph,
        };
        let ok = all_doors_used(num_rooms, &aed.graph) && is_connected(num_rooms, &aed.graph);
        candidate = Some(aed);
        if ok {
            break;
        }
    }
    candidate.unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn single_maps_are_valid() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        for n in [1, 3, 6, 12, 30] {
            let aed = random_single(n, &mut rng);
            assert_eq!(aed.num_rooms(), n);
            aed.validate().unwrap();
            // Label multiset is i % 4 shuffled.
            let mut sorted = aed.rooms.clone();
            sorted.sort();
            let mut expected: Vec<usize> = (0..n).map(|i| i % 4).collect();
            expected.sort();
            assert_eq!(sorted, expected);
        }
    }

    #[test]
    fn duplicated_maps_repeat_labels_across_layers() {
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        for (k, d) in [(6, 2), (6, 3), (12, 2)] {
            let aed = random_duplicated(k, d, &mut rng);
            assert_eq!(aed.num_rooms(), k * d);
            aed.validate().unwrap();
            for r in 0..k * d {
                assert_eq!(aed.rooms[r], aed.rooms[r % k]);
            }
        }
    }

    #[test]
    fn duplicated_maps_fold_back_onto_their_base() {
        let mut rng = ChaCha20Rng::seed_from_u64(13);
        let aed = random_duplicated(6, 2, &mut rng);
        let base = aed.deduplicate(2).expect("folding must be consistent");
        assert_eq!(base.num_rooms(), 6);
        base.validate().unwrap();
        // The duplicated walk projects onto the base walk.
        let plan: Vec<crate::map::Action> =
            (0..60).map(|i| crate::map::Action::Move(i % 6)).collect();
        assert_eq!(aed.simulate(&plan), base.simulate(&plan));
    }
}
