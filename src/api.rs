//! # Judge API Client
//!
//! Blocking client for the judge web service: team registration, problem
//! selection, exploration and final map submission, plus the mock-server-only
//! `/spoiler`. All endpoints are JSON-over-POST.
//!
//! Configuration comes from the environment: `AEDIFICIUM_ENDPOINT` overrides
//! the base URL and `AEDIFICIUM_ID_PATH` the location of the team-id file
//! written by `register` (default `id.json`).
//!
//! Requests are single-shot: transport and HTTP errors surface as `Err` and
//! the orchestrator decides whether to restart the pipeline.

use anyhow::{Context, Result, bail};
use once_cell::sync::{Lazy, OnceCell};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::map::Map;

static BLOCKING_CLIENT: Lazy<Client> = Lazy::new(Client::new);

fn api_base() -> String {
    std::env::var("AEDIFICIUM_ENDPOINT")
        .ok()
        .map(|s| s.trim_end_matches('/').to_string())
        .unwrap_or_else(|| "https://31pwr5t6ij.execute-api.eu-west-2.amazonaws.com".to_string())
}

fn id_path() -> String {
    std::env::var("AEDIFICIUM_ID_PATH").unwrap_or_else(|_| "id.json".to_string())
}

#[derive(Serialize, Deserialize)]
struct IdJson {
    id: String,
}

/// Reads and caches the team id from the id file.
pub fn get_id() -> Result<String> {
    static ID_CACHE: OnceCell<String> = OnceCell::new();
    if let Some(id) = ID_CACHE.get() {
        return Ok(id.clone());
    }
    let path = id_path();
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {} (register first?)", path))?;
    let parsed: IdJson =
        serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path))?;
    let _ = ID_CACHE.set(parsed.id.clone());
    Ok(parsed.id)
}

fn post_json<B: Serialize, R: for<'de> Deserialize<'de>>(path: &str, body: &B) -> Result<R> {
    let url = format!("{}{}", api_base(), path);
    let res = BLOCKING_CLIENT
        .post(&url)
        .json(body)
        .send()
        .with_context(|| format!("POST {} failed", path))?;
    let status = res.status();
    if !status.is_success() {
        let body = res.text().unwrap_or_default();
        bail!("{} returned {}: {}", path, status, body);
    }
    res.json()
        .with_context(|| format!("failed to parse {} response", path))
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    name: &'a str,
    pl: &'a str,
    email: &'a str,
}

#[derive(Deserialize)]
struct RegisterResponse {
    id: String,
}

/// Registers a team via `POST /register` and persists the issued id.
pub fn register(name: &str, pl: &str, email: &str) -> Result<String> {
    let body: RegisterResponse = post_json("/register", &RegisterRequest { name, pl, email })?;
    let path = id_path();
    std::fs::write(
        &path,
        serde_json::to_string(&IdJson {
            id: body.id.clone(),
        })?,
    )
    .with_context(|| format!("failed to write {}", path))?;
    Ok(body.id)
}

#[derive(Serialize)]
struct SelectRequest<'a> {
    id: &'a str,
    #[serde(rename = "problemName")]
    problem_name: &'a str,
}

#[derive(Deserialize)]
struct SelectResponse {
    #[serde(rename = "problemName")]
    problem_name: String,
}

/// Selects a problem via `POST /select`; returns the echoed name.
pub fn select(problem_name: &str) -> Result<String> {
    let id = get_id()?;
    let body: SelectResponse = post_json(
        "/select",
        &SelectRequest {
            id: id.as_str(),
            problem_name,
        },
    )?;
    Ok(body.problem_name)
}

#[derive(Serialize)]
struct ExploreRequest<'a> {
    id: &'a str,
    plans: &'a [String],
}

/// Response from `POST /explore`.
#[derive(Debug, Clone, Deserialize)]
pub struct ExploreResponse {
    /// One label sequence per submitted plan.
    pub results: Vec<Vec<usize>>,
    /// Total queries consumed this session.
    #[serde(rename = "queryCount")]
    pub query_count: u64,
}

/// Submits route plans via `POST /explore`.
pub fn explore(plans: &[String]) -> Result<ExploreResponse> {
    let id = get_id()?;
    post_json(
        "/explore",
        &ExploreRequest {
            id: id.as_str(),
            plans,
        },
    )
}

#[derive(Serialize)]
struct GuessRequest<'a> {
    id: &'a str,
    map: &'a Map,
}

/// Response from `POST /guess`.
#[derive(Debug, Clone, Deserialize)]
pub struct GuessResponse {
    pub correct: bool,
    /// Failure detail, provided by the mock server.
    #[serde(default)]
    pub reason: Option<String>,
}

/// Submits a candidate map via `POST /guess`. Ends the session.
pub fn guess(map: &Map) -> Result<GuessResponse> {
    let id = get_id()?;
    post_json(
        "/guess",
        &GuessRequest {
            id: id.as_str(),
            map,
        },
    )
}

#[derive(Serialize)]
struct SpoilerRequest<'a> {
    id: &'a str,
}

#[derive(Deserialize)]
struct SpoilerResponse {
    map: Map,
}

/// Fetches the hidden map via `POST /spoiler` (mock server only).
pub fn spoiler() -> Result<Map> {
    let id = get_id()?;
    let body: SpoilerResponse = post_json("/spoiler", &SpoilerRequest { id: id.as_str() })?;
    Ok(body.map)
}
