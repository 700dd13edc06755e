//! # Contest Problem Definitions
//!
//! Static definitions for the named problems (base room count and duplication
//! factor), plus synthetic `random_full_<k>_<d>_<seed>` names used against
//! the local judge.

use once_cell::sync::Lazy;
use serde::Deserialize;
use std::collections::HashMap;

/// A single problem: `size` base rooms replicated into `duplication` layers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Problem {
    /// The official name, e.g. "probatio".
    pub problem: String,
    /// Base room count k (before duplication).
    pub size: usize,
    /// Duplication factor d in {1, 2, 3}.
    pub duplication: usize,
}

impl Problem {
    /// Total room count N = k * d.
    pub fn num_rooms(&self) -> usize {
        self.size * self.duplication
    }
}

static PROBLEMS_DATA: Lazy<Vec<Problem>> = Lazy::new(|| {
    const PROBLEMS_JSON: &str = include_str!("problems.json");
    serde_json::from_str(PROBLEMS_JSON).expect("failed to parse problems.json")
});

/// Returns a slice containing all named contest problems.
pub fn all_problems() -> &'static [Problem] {
    &PROBLEMS_DATA
}

static PROBLEM_MAP: Lazy<HashMap<&str, &Problem>> = Lazy::new(|| {
    let mut m = HashMap::new();
    for p in PROBLEMS_DATA.iter() {
        m.insert(p.problem.as_str(), p);
    }
    m
});

/// Parses a `random_full_<k>_<d>_<seed>` name into `(k, d, seed)`.
pub fn parse_random_full(name: &str) -> Option<(usize, usize, u64)> {
    let rest = name.strip_prefix("random_full_")?;
    let mut parts = rest.split('_');
    let k = parts.next()?.parse().ok()?;
    let d: usize = parts.next()?.parse().ok()?;
    let seed = parts.next()?.parse().ok()?;
    if parts.next().is_some() || !(1..=3).contains(&d) {
        return None;
    }
    Some((k, d, seed))
}

/// Looks up a problem by name, accepting synthetic `random_full_*` names.
pub fn get_problem(name: &str) -> Option<Problem> {
    if let Some(p) = PROBLEM_MAP.get(name) {
        return Some((*p).clone());
    }
    let (k, d, _seed) = parse_random_full(name)?;
    Some(Problem {
        problem: name.to_string(),
        size: k,
        duplication: d,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_problems_contains_expected_entries() {
        let all = all_problems();
        assert_eq!(all.len(), 16);
        let all = all
            .iter()
            .map(|p| (p.problem.as_str(), p.size, p.duplication))
            .collect::<Vec<_>>();
        for expected in [("probatio", 3, 1), ("aleph", 6, 2), ("vau", 6, 3)] {
            assert!(all.contains(&expected), "missing problem: {:?}", expected);
        }
    }

    #[test]
    fn get_problem_returns_expected() {
        let p = get_problem("quintus").expect("quintus should exist");
        assert_eq!((p.size, p.duplication, p.num_rooms()), (30, 1, 30));
        let p = get_problem("teth").expect("teth should exist");
        assert_eq!((p.size, p.duplication, p.num_rooms()), (24, 3, 72));
        assert!(get_problem("unknown").is_none());
    }

    #[test]
    fn synthetic_names_parse() {
        let p = get_problem("random_full_12_2_42").unwrap();
        assert_eq!((p.size, p.duplication), (12, 2));
        assert_eq!(parse_random_full("random_full_12_2_42"), Some((12, 2, 42)));
        assert_eq!(parse_random_full("random_full_12_9_42"), None);
        assert_eq!(parse_random_full("random_room_size_12"), None);
    }
}
