use std::str::FromStr;

use anyhow::{bail, Context, Result};

use crate::pipeline::board::BoardSource;
use crate::pipeline::bulk::BulkMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardKind {
    Applications,
    Candidates,
}

impl BoardKind {
    /// Path segment of the backend resource holding this board's entities.
    pub fn resource(self) -> &'static str {
        match self {
            BoardKind::Applications => "applications",
            BoardKind::Candidates => "candidates",
        }
    }
}

impl FromStr for BoardKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "applications" => Ok(BoardKind::Applications),
            "candidates" => Ok(BoardKind::Candidates),
            other => Err(format!("unknown board kind '{other}'")),
        }
    }
}

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub backend_url: String,
    pub backend_token: Option<String>,
    pub board_kind: BoardKind,
    pub job_id: Option<String>,
    pub min_match_score: f64,
    pub load_limit: u32,
    pub compare_cap: usize,
    pub bulk_mode: BulkMode,
    pub request_timeout_secs: u64,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let board_kind: BoardKind = parse_or(&get, "BOARD_KIND", BoardKind::Applications)?;
        let job_id = get("JOB_ID").filter(|v| !v.trim().is_empty());
        if board_kind == BoardKind::Candidates && job_id.is_none() {
            bail!("JOB_ID is required when BOARD_KIND=candidates");
        }

        let compare_cap: usize = parse_or(&get, "COMPARE_CAP", 3)?;
        if compare_cap == 0 {
            bail!("COMPARE_CAP must be at least 1");
        }

        Ok(Config {
            backend_url: get("BACKEND_URL")
                .context("Required environment variable 'BACKEND_URL' is not set")?,
            backend_token: get("BACKEND_TOKEN").filter(|v| !v.is_empty()),
            board_kind,
            job_id,
            min_match_score: parse_or(&get, "MIN_MATCH_SCORE", 0.0)?,
            load_limit: parse_or(&get, "LOAD_LIMIT", 100)?,
            compare_cap,
            bulk_mode: parse_or(&get, "BULK_MODE", BulkMode::PerEntity)?,
            request_timeout_secs: parse_or(&get, "REQUEST_TIMEOUT_SECS", 15)?,
            port: parse_or(&get, "PORT", 8080)?,
            rust_log: get("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }

    pub fn board_source(&self) -> BoardSource {
        match self.board_kind {
            BoardKind::Applications => BoardSource::Applications {
                limit: self.load_limit,
            },
            BoardKind::Candidates => BoardSource::Candidates {
                job_id: self.job_id.clone().unwrap_or_default(),
                min_match_score: self.min_match_score,
                limit: self.load_limit,
            },
        }
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{key} is invalid ('{raw}'): {e}")),
    }
}
