//! # The Ædificium
//!
//! Core data structure for the labelled six-door graph: route-plan parsing,
//! deterministic walk simulation with per-walk charcoal overlays, the
//! randomized observational-equivalence test, covering-path construction and
//! the JSON wire format used by `/guess`.
//!
//! A map is stored as a door involution: `graph[room][door]` is the
//! `(room, door)` pair on the other side of the passage. Every door is always
//! present; doors a source map left unspecified become self-loops, which makes
//! moving through them a stay-in-place step.

use itertools::Itertools;
use rand::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Number of doors per room.
pub const DOORS: usize = 6;

/// One token of a route plan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    /// Walk through the given door (0..5).
    Move(usize),
    /// Overwrite the current room's label (0..3) without moving.
    Charcoal(usize),
}

/// Parses a route plan string such as `"01[3]25"`.
///
/// Digits are moves, `[x]` is a charcoal write. Panics on malformed input;
/// plans are produced programmatically and the grammar is unambiguous.
pub fn parse_plan(plan: &str) -> Vec<Action> {
    let mut res = vec![];
    let mut chars = plan.chars();
    while let Some(c) = chars.next() {
        match c {
            '[' => {
                let x = chars.next().expect("truncated charcoal token");
                assert!(('0'..'4').contains(&x), "bad charcoal label: {}", x);
                assert_eq!(chars.next(), Some(']'), "unterminated charcoal token");
                res.push(Action::Charcoal((x as u8 - b'0') as usize));
            }
            '0'..='5' => res.push(Action::Move((c as u8 - b'0') as usize)),
            _ => panic!("unexpected character in plan: {}", c),
        }
    }
    res
}

/// Formats a plan back into the wire syntax accepted by `/explore`.
pub fn format_plan(plan: &[Action]) -> String {
    plan.iter()
        .map(|a| match a {
            Action::Move(d) => d.to_string(),
            Action::Charcoal(x) => format!("[{}]", x),
        })
        .join("")
}

/// Number of `Move` tokens in a plan. The judge's per-plan budget counts
/// only these.
pub fn move_count(plan: &[Action]) -> usize {
    plan.iter()
        .filter(|a| matches!(a, Action::Move(_)))
        .count()
}

/// One end of a passage in the wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapConnectionEnd {
    pub room: usize,
    pub door: usize,
}

/// A passage between two doors in the wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapConnection {
    pub from: MapConnectionEnd,
    pub to: MapConnectionEnd,
}

/// The `/guess` map payload: room labels, starting room and passages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Map {
    pub rooms: Vec<usize>,
    #[serde(rename = "startingRoom")]
    pub starting_room: usize,
    pub connections: Vec<MapConnection>,
}

/// Structural defects detected when building or validating a map.
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("label {label} of room {room} is out of range")]
    BadLabel { room: usize, label: usize },
    #[error("starting room {start} is out of range")]
    BadStart { start: usize },
    #[error("door {door} of room {room} is used by two connections")]
    DoorReused { room: usize, door: usize },
    #[error("connection endpoint refers to room {room} door {door}")]
    BadEndpoint { room: usize, door: usize },
    #[error("step is not an involution at room {room} door {door}")]
    NotInvolutive { room: usize, door: usize },
    #[error("the room graph is not connected")]
    Disconnected,
}

/// A fully specified Ædificium.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Aedificium {
    /// 2-bit label of each room.
    pub rooms: Vec<usize>,
    /// Index of the room every walk starts in.
    pub start: usize,
    /// Door involution: `graph[r][d]` is the opposite end of door `d` of
    /// room `r`. Self-loops are `graph[r][d] == (r, d)`.
    pub graph: Vec<[(usize, usize); 6]>,
}

impl Aedificium {
    pub fn num_rooms(&self) -> usize {
        self.rooms.len()
    }

    /// The other end of door `d` of room `r`.
    #[inline]
    pub fn step(&self, r: usize, d: usize) -> (usize, usize) {
        self.graph[r][d]
    }

    /// Executes a plan and returns the observed label sequence.
    ///
    /// The output has one entry per token plus the starting observation.
    /// Charcoal writes are applied to a per-walk copy of the labels, so the
    /// map itself is never mutated and repeated calls are identical.
    pub fn simulate(&self, plan: &[Action]) -> Vec<usize> {
        let mut labels = self.rooms.clone();
        let mut u = self.start;
        let mut route = Vec::with_capacity(plan.len() + 1);
        route.push(labels[u]);
        for &action in plan {
            match action {
                Action::Move(d) => u = self.graph[u][d].0,
                Action::Charcoal(x) => labels[u] = x,
            }
            route.push(labels[u]);
        }
        route
    }

    /// Randomized observational-equivalence test against `other`.
    ///
    /// Runs 100 uniform random walks (and, when `with_charcoal` is set,
    /// another 100 walks with a charcoal write after every move) and returns
    /// the first plan the two maps disagree on, or `None` when all plans
    /// agree. Walk length is `6n` with charcoal and `18n` without.
    pub fn equivalence_test(&self, other: &Aedificium, with_charcoal: bool) -> Option<String> {
        if self.num_rooms() != other.num_rooms() {
            return Some("DIFFERENT_ROOM_COUNT".to_string());
        }
        let n = self.num_rooms();
        let plan_length = n * if with_charcoal { 6 } else { 18 };
        let mut rng = rand::rng();

        let mut plans: Vec<Vec<Action>> = (0..100)
            .map(|_| {
                (0..plan_length)
                    .map(|_| Action::Move(rng.random_range(0..DOORS)))
                    .collect()
            })
            .collect();
        if with_charcoal {
            plans.extend((0..100).map(|_| {
                let mut plan = Vec::with_capacity(plan_length * 2);
                for _ in 0..plan_length {
                    plan.push(Action::Move(rng.random_range(0..DOORS)));
                    plan.push(Action::Charcoal(rng.random_range(0..4)));
                }
                plan
            }));
        }

        plans
            .par_iter()
            .find_map_first(|plan| {
                if self.simulate(plan) != other.simulate(plan) {
                    Some(format_plan(plan))
                } else {
                    None
                }
            })
    }

    /// Decorates a move-only walk with charcoal writes at first visits.
    ///
    /// The starting room and every room entered for the first time gets its
    /// label overwritten with `(label + 1) mod 4`, so a later walk can tell
    /// marked rooms from their unmarked duplicates.
    pub fn inject_charcoal_on_first_visit(&self, doors: &[usize]) -> Vec<Action> {
        let mut visited = vec![false; self.num_rooms()];
        let mut u = self.start;
        visited[u] = true;
        let mut plan = vec![Action::Charcoal((self.rooms[u] + 1) % 4)];
        for &d in doors {
            plan.push(Action::Move(d));
            let next = self.graph[u][d].0;
            if !visited[next] {
                visited[next] = true;
                plan.push(Action::Charcoal((self.rooms[next] + 1) % 4));
            }
            u = next;
        }
        plan
    }

    /// Greedy shortest-path tour visiting every room in `targets`.
    ///
    /// Repeatedly BFS-walks from the current room to the nearest still
    /// unvisited target, marking every room along the way as covered.
    /// Unreachable targets are skipped.
    pub fn build_covering_path(&self, targets: &[usize]) -> Vec<usize> {
        let n = self.num_rooms();
        let mut pending = vec![false; n];
        for &t in targets {
            pending[t] = true;
        }
        let mut cur = self.start;
        pending[cur] = false;
        let mut path = vec![];
        while pending.iter().any(|&p| p) {
            // BFS to the nearest pending room.
            let mut prev: Vec<Option<(usize, usize)>> = vec![None; n];
            let mut seen = vec![false; n];
            seen[cur] = true;
            let mut queue = std::collections::VecDeque::from([cur]);
            let mut goal = None;
            while let Some(u) = queue.pop_front() {
                if pending[u] {
                    goal = Some(u);
                    break;
                }
                for d in 0..DOORS {
                    let v = self.graph[u][d].0;
                    if !seen[v] {
                        seen[v] = true;
                        prev[v] = Some((u, d));
                        queue.push_back(v);
                    }
                }
            }
            let Some(goal) = goal else {
                break; // remaining targets unreachable
            };
            let mut doors = vec![];
            let mut r = goal;
            pending[r] = false;
            while let Some((u, d)) = prev[r] {
                doors.push(d);
                pending[u] = false;
                r = u;
            }
            doors.reverse();
            path.extend(doors);
            cur = goal;
        }
        path
    }

    /// Converts to the `/guess` wire format, emitting each passage once.
    pub fn to_map(&self) -> Map {
        let mut connections = vec![];
        for r in 0..self.num_rooms() {
            for d in 0..DOORS {
                if (r, d) <= self.graph[r][d] {
                    let (r2, d2) = self.graph[r][d];
                    connections.push(MapConnection {
                        from: MapConnectionEnd { room: r, door: d },
                        to: MapConnectionEnd { room: r2, door: d2 },
                    });
                }
            }
        }
        Map {
            rooms: self.rooms.clone(),
            starting_room: self.start,
            connections,
        }
    }

    /// Builds an Ædificium from the wire format.
    ///
    /// Listing the same passage twice (e.g. once per direction) is accepted;
    /// claiming a door for two different passages is not. Doors the map does
    /// not mention become self-loops.
    pub fn from_map(map: &Map) -> Result<Aedificium, MapError> {
        let n = map.rooms.len();
        for (room, &label) in map.rooms.iter().enumerate() {
            if label >= 4 {
                return Err(MapError::BadLabel { room, label });
            }
        }
        if map.starting_room >= n {
            return Err(MapError::BadStart {
                start: map.starting_room,
            });
        }
        let mut graph: Vec<[Option<(usize, usize)>; 6]> = vec![[None; 6]; n];
        for conn in &map.connections {
            let a = (conn.from.room, conn.from.door);
            let b = (conn.to.room, conn.to.door);
            for &(room, door) in [&a, &b] {
                if room >= n || door >= DOORS {
                    return Err(MapError::BadEndpoint { room, door });
                }
            }
            for (&(r, d), &target) in [(&a, &b), (&b, &a)] {
                match graph[r][d] {
                    None => graph[r][d] = Some(target),
                    Some(existing) if existing == target => {}
                    Some(_) => return Err(MapError::DoorReused { room: r, door: d }),
                }
            }
        }
        let graph = graph
            .into_iter()
            .enumerate()
            .map(|(r, row)| {
                let mut out = [(0, 0); 6];
                for (d, slot) in row.into_iter().enumerate() {
                    out[d] = slot.unwrap_or((r, d));
                }
                out
            })
            .collect();
        Ok(Aedificium {
            rooms: map.rooms.clone(),
            start: map.starting_room,
            graph,
        })
    }

    /// Checks the structural invariants: label range, involution and
    /// connectivity.
    pub fn validate(&self) -> Result<(), MapError> {
        let n = self.num_rooms();
        for (room, &label) in self.rooms.iter().enumerate() {
            if label >= 4 {
                return Err(MapError::BadLabel { room, label });
            }
        }
        if self.start >= n {
            return Err(MapError::BadStart { start: self.start });
        }
        for r in 0..n {
            for d in 0..DOORS {
                let (r2, d2) = self.graph[r][d];
                if r2 >= n || d2 >= DOORS {
                    return Err(MapError::BadEndpoint { room: r2, door: d2 });
                }
                if self.graph[r2][d2] != (r, d) {
                    return Err(MapError::NotInvolutive { room: r, door: d });
                }
            }
        }
        // Connectivity over the room multigraph.
        let mut seen = vec![false; n];
        let mut stack = vec![self.start];
        seen[self.start] = true;
        while let Some(u) = stack.pop() {
            for d in 0..DOORS {
                let v = self.graph[u][d].0;
                if !seen[v] {
                    seen[v] = true;
                    stack.push(v);
                }
            }
        }
        if seen.iter().all(|&s| s) {
            Ok(())
        } else {
            Err(MapError::Disconnected)
        }
    }

    /// Folds a `d`-layer map onto its `n / d`-room base graph.
    ///
    /// Every connection endpoint is mapped to `room mod k`; returns `None`
    /// when the folded doors conflict, i.e. the map does not actually consist
    /// of `d` door-compatible layers.
    pub fn deduplicate(&self, duplication: usize) -> Option<Aedificium> {
        let n = self.num_rooms();
        if duplication == 0 || n % duplication != 0 {
            return None;
        }
        let k = n / duplication;
        let mut graph: Vec<[Option<(usize, usize)>; 6]> = vec![[None; 6]; k];
        for r in 0..n {
            for d in 0..DOORS {
                let (r2, d2) = self.graph[r][d];
                let a = (r % k, d);
                let b = (r2 % k, d2);
                for (&(fr, fd), &target) in [(&a, &b), (&b, &a)] {
                    match graph[fr][fd] {
                        None => graph[fr][fd] = Some(target),
                        Some(existing) if existing == target => {}
                        Some(_) => return None,
                    }
                }
            }
        }
        let graph = graph
            .into_iter()
            .map(|row| {
                let mut out = [(0, 0); 6];
                for (d, slot) in row.into_iter().enumerate() {
                    out[d] = slot?;
                }
                Some(out)
            })
            .collect::<Option<Vec<_>>>()?;
        Some(Aedificium {
            rooms: self.rooms[..k].to_vec(),
            start: self.start % k,
            graph,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 3-room ring: 0/0-1/0, 1/1-2/0, 2/1-0/1, remaining doors self-loops.
    pub(crate) fn simple_aedificium() -> Aedificium {
        let map = Map {
            rooms: vec![0, 1, 2],
            starting_room: 0,
            connections: vec![
                MapConnection {
                    from: MapConnectionEnd { room: 0, door: 0 },
                    to: MapConnectionEnd { room: 1, door: 0 },
                },
                MapConnection {
                    from: MapConnectionEnd { room: 1, door: 1 },
                    to: MapConnectionEnd { room: 2, door: 0 },
                },
                MapConnection {
                    from: MapConnectionEnd { room: 2, door: 1 },
                    to: MapConnectionEnd { room: 0, door: 1 },
                },
            ],
        };
        Aedificium::from_map(&map).unwrap()
    }

    #[test]
    fn parse_and_format_round_trip() {
        let plan = "01[3]25[0]4";
        let parsed = parse_plan(plan);
        assert_eq!(
            parsed,
            vec![
                Action::Move(0),
                Action::Move(1),
                Action::Charcoal(3),
                Action::Move(2),
                Action::Move(5),
                Action::Charcoal(0),
                Action::Move(4),
            ]
        );
        assert_eq!(format_plan(&parsed), plan);
        assert_eq!(move_count(&parsed), 5);
    }

    #[test]
    fn simulate_ring_walk() {
        let aed = simple_aedificium();
        assert_eq!(aed.simulate(&parse_plan("011")), vec![0, 1, 2, 0]);
        // The charcoal repaints room 2 before the final move back to room 0.
        assert_eq!(aed.simulate(&parse_plan("01[3]1")), vec![0, 1, 2, 3, 0]);
        // Unspecified doors are self-loops: the walk stays put.
        assert_eq!(aed.simulate(&parse_plan("555")), vec![0, 0, 0, 0]);
    }

    #[test]
    fn simulate_single_room() {
        let aed = Aedificium {
            rooms: vec![2],
            start: 0,
            graph: vec![[(0, 0), (0, 1), (0, 2), (0, 3), (0, 4), (0, 5)]],
        };
        assert_eq!(aed.simulate(&parse_plan("012345")), vec![2; 7]);
    }

    #[test]
    fn simulate_is_pure() {
        let aed = simple_aedificium();
        let plan = parse_plan("0[1]1[2]10[0]");
        assert_eq!(aed.simulate(&plan), aed.simulate(&plan));
        // Charcoal did not leak into the map.
        assert_eq!(aed.rooms, vec![0, 1, 2]);
    }

    #[test]
    fn map_json_round_trip() {
        let aed = simple_aedificium();
        let json = serde_json::to_string(&aed.to_map()).unwrap();
        let map: Map = serde_json::from_str(&json).unwrap();
        assert_eq!(Aedificium::from_map(&map).unwrap(), aed);
    }

    #[test]
    fn map_json_uses_the_wire_field_names() {
        let json = serde_json::to_string(&simple_aedificium().to_map()).unwrap();
        assert!(json.contains("\"rooms\""));
        assert!(json.contains("\"startingRoom\""));
        assert!(json.contains("\"connections\""));
        assert!(json.contains("\"from\""));
        assert!(json.contains("\"door\""));

        let map: Map = serde_json::from_str(
            r#"{"rooms":[0,1],"startingRoom":1,
                "connections":[{"from":{"room":0,"door":0},"to":{"room":1,"door":5}}]}"#,
        )
        .unwrap();
        assert_eq!(map.starting_room, 1);
        assert_eq!(map.connections[0].to.door, 5);
    }

    #[test]
    fn from_map_rejects_reused_door() {
        let mut map = simple_aedificium().to_map();
        map.connections.push(MapConnection {
            from: MapConnectionEnd { room: 0, door: 0 },
            to: MapConnectionEnd { room: 2, door: 5 },
        });
        assert!(matches!(
            Aedificium::from_map(&map),
            Err(MapError::DoorReused { room: 0, door: 0 })
        ));
    }

    #[test]
    fn equivalence_of_identical_maps() {
        let aed = simple_aedificium();
        assert_eq!(aed.equivalence_test(&aed.clone(), true), None);
    }

    #[test]
    fn equivalence_detects_label_difference() {
        let aed = simple_aedificium();
        let mut other = aed.clone();
        other.rooms[2] = 3;
        assert!(aed.equivalence_test(&other, false).is_some());
    }

    #[test]
    fn covering_path_visits_all_targets() {
        let aed = simple_aedificium();
        let path = aed.build_covering_path(&[0, 1, 2]);
        let mut visited = vec![false; 3];
        let mut u = aed.start;
        visited[u] = true;
        for &d in &path {
            u = aed.step(u, d).0;
            visited[u] = true;
        }
        assert!(visited.iter().all(|&v| v));
    }

    #[test]
    fn charcoal_injection_marks_first_visits() {
        let aed = simple_aedificium();
        let plan = aed.inject_charcoal_on_first_visit(&[0, 1, 1]);
        // Start room marked, then each newly reached room right after its move.
        assert_eq!(
            plan,
            vec![
                Action::Charcoal(1),
                Action::Move(0),
                Action::Charcoal(2),
                Action::Move(1),
                Action::Charcoal(3),
                Action::Move(1),
            ]
        );
    }

    #[test]
    fn validate_catches_broken_involution() {
        let mut aed = simple_aedificium();
        aed.graph[0][0] = (2, 2);
        assert!(matches!(
            aed.validate(),
            Err(MapError::NotInvolutive { .. })
        ));
    }
}
