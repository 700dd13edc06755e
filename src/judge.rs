//! # Judging and Environment Interaction
//!
//! The `Judge` trait abstracts the problem environment so solver and
//! orchestration code can run unchanged against either implementation:
//!
//! - `LocalJudge`: an in-process mock holding a randomly generated map. Used
//!   for testing and for `random_full_*` problems.
//! - `RemoteJudge`: the HTTP judge, via the `api` module (feature `reqwest`).
//!
//! Both keep a log of every exploration and the running query count
//! (`plans.len() + 1` per `/explore`, as charged by the judge).

use crate::map::{Action, Aedificium, move_count};
use crate::problems::{self, Problem};
use anyhow::{Context, Result, bail};
use rand::prelude::*;

/// A log of exploration queries and their observed label sequences.
#[derive(Clone, Debug, Default)]
pub struct Observations {
    pub plans: Vec<Vec<Action>>,
    pub results: Vec<Vec<usize>>,
}

impl Observations {
    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    pub fn extend(&mut self, plans: &[Vec<Action>], results: &[Vec<usize>]) {
        self.plans.extend(plans.iter().cloned());
        self.results.extend(results.iter().cloned());
    }
}

/// Verdict of a `/guess` submission.
#[derive(Clone, Debug)]
pub struct GuessOutcome {
    pub correct: bool,
    pub reason: Option<String>,
}

/// The problem environment.
pub trait Judge {
    /// The selected problem (base rooms + duplication).
    fn problem(&self) -> &Problem;
    /// Total room count N = k * d.
    fn num_rooms(&self) -> usize {
        self.problem().num_rooms()
    }
    /// Submits route plans and returns one label sequence per plan
    /// (one entry per token, plus the starting observation).
    fn explore(&mut self, plans: &[Vec<Action>]) -> Result<Vec<Vec<usize>>>;
    /// Submits a candidate map. Ends the session either way; call
    /// `restart` before exploring again.
    fn guess(&mut self, candidate: &Aedificium) -> Result<GuessOutcome>;
    /// Reveals the hidden map (local judge / mock server only).
    fn spoiler(&mut self) -> Result<Aedificium>;
    /// Everything explored since the last restart.
    fn observations(&self) -> &Observations;
    /// Queries consumed since the last restart.
    fn query_count(&self) -> usize;
    /// Re-selects the problem and clears session state.
    fn restart(&mut self) -> Result<()>;
}

/// In-process judge over a generated hidden map.
pub struct LocalJudge {
    problem: Problem,
    hidden: Aedificium,
    seed: u64,
    generation: u64,
    selected: bool,
    query_count: usize,
    log: Observations,
}

impl LocalJudge {
    /// Creates a judge for `problem_name`, generating the hidden map from
    /// `seed`. For `random_full_<k>_<d>_<s>` names the embedded `<s>` wins.
    pub fn new(problem_name: &str, seed: u64) -> Result<Self> {
        let problem = problems::get_problem(problem_name)
            .with_context(|| format!("unknown problem: {}", problem_name))?;
        let seed = problems::parse_random_full(problem_name)
            .map(|(_, _, s)| s)
            .unwrap_or(seed);
        let hidden = Self::generate(&problem, seed, 0);
        Ok(Self {
            problem,
            hidden,
            seed,
            generation: 0,
            selected: true,
            query_count: 0,
            log: Observations::default(),
        })
    }

    /// Wraps a known map, for replaying fixed scenarios.
    pub fn with_map(problem: Problem, hidden: Aedificium) -> Self {
        assert_eq!(problem.num_rooms(), hidden.num_rooms());
        Self {
            problem,
            hidden,
            seed: 0,
            generation: 0,
            selected: true,
            query_count: 0,
            log: Observations::default(),
        }
    }

    fn generate(problem: &Problem, seed: u64, generation: u64) -> Aedificium {
        let mut rng =
            rand_chacha::ChaCha20Rng::seed_from_u64(seed.wrapping_add(generation));
        crate::mapgen::random_duplicated(problem.size, problem.duplication, &mut rng)
    }
}

impl Judge for LocalJudge {
    fn problem(&self) -> &Problem {
        &self.problem
    }

    fn explore(&mut self, plans: &[Vec<Action>]) -> Result<Vec<Vec<usize>>> {
        if !self.selected {
            bail!("no problem selected; call restart first");
        }
        let max_len = 6 * self.num_rooms();
        for plan in plans {
            let moves = move_count(plan);
            if moves > max_len {
                bail!("plan length {} exceeds limit {}", moves, max_len);
            }
        }
        let results: Vec<Vec<usize>> = plans.iter().map(|p| self.hidden.simulate(p)).collect();
        self.query_count += plans.len() + 1;
        self.log.extend(plans, &results);
        eprintln!(
            "explore {} plans, {} queries total",
            plans.len(),
            self.query_count
        );
        Ok(results)
    }

    fn guess(&mut self, candidate: &Aedificium) -> Result<GuessOutcome> {
        if !self.selected {
            bail!("no problem selected; call restart first");
        }
        self.selected = false;
        if let Err(e) = candidate.validate() {
            eprintln!("!log status WA ({})", e);
            return Ok(GuessOutcome {
                correct: false,
                reason: Some(e.to_string()),
            });
        }
        match self.hidden.equivalence_test(candidate, true) {
            None => {
                eprintln!("!log status AC");
                eprintln!("!log score {}", self.query_count);
                Ok(GuessOutcome {
                    correct: true,
                    reason: None,
                })
            }
            Some(reason) => {
                eprintln!("!log status WA ({})", reason);
                Ok(GuessOutcome {
                    correct: false,
                    reason: Some(reason),
                })
            }
        }
    }

    fn spoiler(&mut self) -> Result<Aedificium> {
        Ok(self.hidden.clone())
    }

    fn observations(&self) -> &Observations {
        &self.log
    }

    fn query_count(&self) -> usize {
        self.query_count
    }

    fn restart(&mut self) -> Result<()> {
        self.generation += 1;
        self.hidden = Self::generate(&self.problem, self.seed, self.generation);
        self.selected = true;
        self.query_count = 0;
        self.log = Observations::default();
        Ok(())
    }
}

/// Judge talking to the HTTP service.
#[cfg(feature = "reqwest")]
pub struct RemoteJudge {
    problem: Problem,
    query_count: usize,
    log: Observations,
}

#[cfg(feature = "reqwest")]
impl RemoteJudge {
    /// Selects `problem_name` on the server.
    pub fn new(problem_name: &str) -> Result<Self> {
        let problem = problems::get_problem(problem_name)
            .with_context(|| format!("unknown problem: {}", problem_name))?;
        crate::api::select(problem_name)?;
        Ok(Self {
            problem,
            query_count: 0,
            log: Observations::default(),
        })
    }
}

#[cfg(feature = "reqwest")]
impl Judge for RemoteJudge {
    fn problem(&self) -> &Problem {
        &self.problem
    }

    fn explore(&mut self, plans: &[Vec<Action>]) -> Result<Vec<Vec<usize>>> {
        let max_len = 6 * self.num_rooms();
        for plan in plans {
            let moves = move_count(plan);
            if moves > max_len {
                bail!("plan length {} exceeds limit {}", moves, max_len);
            }
        }
        let strs: Vec<String> = plans.iter().map(|p| crate::map::format_plan(p)).collect();
        let res = crate::api::explore(&strs)?;
        if res.results.len() != plans.len() {
            bail!(
                "judge returned {} results for {} plans",
                res.results.len(),
                plans.len()
            );
        }
        self.query_count = res.query_count as usize;
        self.log.extend(plans, &res.results);
        eprintln!(
            "explore {} plans, {} queries total",
            plans.len(),
            self.query_count
        );
        Ok(res.results)
    }

    fn guess(&mut self, candidate: &Aedificium) -> Result<GuessOutcome> {
        let res = crate::api::guess(&candidate.to_map())?;
        if res.correct {
            eprintln!("!log status AC");
            eprintln!("!log score {}", self.query_count);
        } else {
            eprintln!(
                "!log status WA ({})",
                res.reason.as_deref().unwrap_or("no reason given")
            );
        }
        Ok(GuessOutcome {
            correct: res.correct,
            reason: res.reason,
        })
    }

    fn spoiler(&mut self) -> Result<Aedificium> {
        let map = crate::api::spoiler()?;
        Aedificium::from_map(&map).context("spoiler map is inconsistent")
    }

    fn observations(&self) -> &Observations {
        &self.log
    }

    fn query_count(&self) -> usize {
        self.query_count
    }

    fn restart(&mut self) -> Result<()> {
        crate::api::select(&self.problem.problem)?;
        self.query_count = 0;
        self.log = Observations::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::parse_plan;

    #[test]
    fn local_judge_counts_queries_and_logs() {
        let mut judge = LocalJudge::new("probatio", 1).unwrap();
        let plans = vec![parse_plan("012"), parse_plan("[1]34")];
        let results = judge.explore(&plans).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].len(), 4);
        assert_eq!(results[1].len(), 4);
        assert_eq!(judge.query_count(), 3);
        assert_eq!(judge.observations().len(), 2);
    }

    #[test]
    fn local_judge_enforces_plan_budget() {
        let mut judge = LocalJudge::new("probatio", 1).unwrap();
        let too_long = vec![vec![Action::Move(0); 6 * 3 + 1]];
        assert!(judge.explore(&too_long).is_err());
    }

    #[test]
    fn local_judge_accepts_the_spoiler() {
        let mut judge = LocalJudge::new("probatio", 3).unwrap();
        let truth = judge.spoiler().unwrap();
        let outcome = judge.guess(&truth).unwrap();
        assert!(outcome.correct, "reason: {:?}", outcome.reason);
        // Session over until restart.
        assert!(judge.explore(&[parse_plan("0")]).is_err());
        judge.restart().unwrap();
        assert!(judge.explore(&[parse_plan("0")]).is_ok());
    }

    #[test]
    fn local_judge_rejects_a_wrong_map() {
        let mut judge = LocalJudge::new("primus", 5).unwrap();
        let mut wrong = judge.spoiler().unwrap();
        // Permute labels until something differs observably.
        for r in 0..wrong.num_rooms() {
            wrong.rooms[r] = (wrong.rooms[r] + 1) % 4;
        }
        let outcome = judge.guess(&wrong).unwrap();
        assert!(!outcome.correct);
        assert!(outcome.reason.is_some());
    }

    #[test]
    fn random_full_names_fix_their_seed() {
        let mut a = LocalJudge::new("random_full_6_2_42", 0).unwrap();
        let mut b = LocalJudge::new("random_full_6_2_42", 99).unwrap();
        assert_eq!(a.spoiler().unwrap(), b.spoiler().unwrap());
    }
}
