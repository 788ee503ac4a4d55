//! Typed configuration from environment variables.
//!
//! Loads once at startup and fails fast on malformed values. Every variable
//! has a default, so an empty environment yields a single-slot queue.

use crate::error::{Error, Result};
use std::path::PathBuf;

pub const DEFAULT_CONCURRENCY: usize = 1;
pub const DEFAULT_VERIFIER_DIR: &str = "verifiers";

#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum verifications running at once. Always at least 1.
    pub concurrency: usize,
    /// Directory of `*.toml` command verifier definitions.
    pub verifier_dir: PathBuf,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            concurrency: concurrency_var("VERIFYQ_CONCURRENCY")?,
            verifier_dir: std::env::var("VERIFYQ_VERIFIER_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_VERIFIER_DIR)),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok().filter(|s| !s.is_empty()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn concurrency_var(name: &str) -> Result<usize> {
    let Ok(raw) = std::env::var(name) else {
        return Ok(DEFAULT_CONCURRENCY);
    };
    match raw.trim().parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(Error::Config(format!(
            "{name} must be a positive integer, got {raw:?}"
        ))),
    }
}
