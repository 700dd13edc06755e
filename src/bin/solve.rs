//! End-to-end reconstruction pipeline: select, explore, solve, lift, guess.

use aedificium::judge::{Judge, LocalJudge};
use aedificium::orchestrator::{self, PipelineConfig};
use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Parser, Debug)]
#[command(about = "Reconstruct an Aedificium and submit the guess")]
struct Args {
    /// Problem name, e.g. "probatio" or "random_full_6_2_42".
    problem: String,
    /// Solve against an in-process judge instead of the HTTP service.
    #[arg(long)]
    local: bool,
    /// Map seed for the local judge.
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Worker threads (0 = cores minus one).
    #[arg(long, short = 'j', default_value_t = 0)]
    workers: usize,
    /// Shared random expeditions before dispatching solvers.
    #[arg(long, default_value_t = 3)]
    initial_expeditions: usize,
    /// Charcoal expeditions per duplication-lift phase.
    #[arg(long, default_value_t = 10)]
    deep_expeditions: usize,
    /// Pipeline restarts before giving up.
    #[arg(long, default_value_t = 10)]
    attempts: usize,
    /// Enroll the fingerprint solver (query-hungry).
    #[arg(long)]
    fingerprint: bool,
}

#[cfg(feature = "reqwest")]
fn remote_judge(problem: &str) -> Result<Box<dyn Judge>> {
    Ok(Box::new(aedificium::judge::RemoteJudge::new(problem)?))
}

#[cfg(not(feature = "reqwest"))]
fn remote_judge(_problem: &str) -> Result<Box<dyn Judge>> {
    anyhow::bail!("built without HTTP support; run with --local")
}

fn run(args: &Args) -> Result<bool> {
    let mut judge: Box<dyn Judge> = if args.local {
        Box::new(LocalJudge::new(&args.problem, args.seed)?)
    } else {
        remote_judge(&args.problem)?
    };

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        ctrlc::set_handler(move || {
            eprintln!("interrupted, stopping workers");
            cancel.store(true, Ordering::Relaxed);
        })?;
    }

    let config = PipelineConfig {
        workers: args.workers,
        initial_expeditions: args.initial_expeditions,
        deep_expeditions: args.deep_expeditions,
        max_attempts: args.attempts,
        use_fingerprint: args.fingerprint,
        seed: args.seed,
    };
    orchestrator::run(judge.as_mut(), &config, &cancel)
}

fn main() {
    let args = Args::parse();
    match run(&args) {
        Ok(true) => {}
        Ok(false) => {
            eprintln!("failed to reconstruct {}", args.problem);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("error: {:#}", e);
            std::process::exit(1);
        }
    }
}
