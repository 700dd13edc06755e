//! Thin command-line client for the judge API.

use aedificium::api;
use aedificium::map::Map;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use itertools::Itertools;

#[derive(Parser, Debug)]
#[command(about = "Talk to the judge API directly")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a team and persist the issued id.
    Register {
        name: String,
        pl: String,
        email: String,
    },
    /// Select a problem.
    Select { problem_name: String },
    /// Run route plans, e.g. `explore 012 3[1]45`.
    Explore { plans: Vec<String> },
    /// Submit a map guess from a JSON file.
    Guess { map_file: String },
    /// Fetch the hidden map (mock server only).
    Spoiler,
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Register { name, pl, email } => {
            let id = api::register(&name, &pl, &email)?;
            println!("registered: {}", id);
        }
        Command::Select { problem_name } => {
            let name = api::select(&problem_name)?;
            println!("selected: {}", name);
        }
        Command::Explore { plans } => {
            let res = api::explore(&plans)?;
            for (plan, result) in plans.iter().zip(res.results.iter()) {
                println!("{}: {}", plan, result.iter().join(""));
            }
            println!("queryCount: {}", res.query_count);
        }
        Command::Guess { map_file } => {
            let raw = std::fs::read_to_string(&map_file)
                .with_context(|| format!("failed to read {}", map_file))?;
            let map: Map = serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse {}", map_file))?;
            let res = api::guess(&map)?;
            if res.correct {
                println!("correct!");
            } else {
                println!(
                    "incorrect ({})",
                    res.reason.as_deref().unwrap_or("no reason given")
                );
            }
        }
        Command::Spoiler => {
            let map = api::spoiler()?;
            println!("{}", serde_json::to_string_pretty(&map)?);
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli.command) {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}
