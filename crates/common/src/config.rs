//! Configuration management following 12-factor app principles
//!
//! All configuration is loaded from environment variables to ensure
//! clean separation between code and config. Provider-specific settings
//! (LLM, media backends) are loaded by their own crates.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

const DEFAULT_STAGE_TIMEOUT_SECS: u64 = 600;
const DEFAULT_MAX_STAGE_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database connection URL; the in-memory store is used when absent
    pub database_url: Option<String>,

    /// Artifact generator provider (llm, mock)
    pub generator_provider: String,

    /// Per-stage generator budget in seconds, 0 disables the timeout
    pub stage_timeout_secs: u64,

    /// Generator invocations allowed per stage, 0 means unlimited
    pub max_stage_attempts: u32,

    /// Runtime configuration
    pub log_format: String,
    pub rust_log: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let stage_timeout_secs = match lookup("STAGE_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("STAGE_TIMEOUT_SECS must be a whole number"))?,
            None => DEFAULT_STAGE_TIMEOUT_SECS,
        };

        let max_stage_attempts = match lookup("MAX_STAGE_ATTEMPTS") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("MAX_STAGE_ATTEMPTS must be a whole number"))?,
            None => DEFAULT_MAX_STAGE_ATTEMPTS,
        };

        let config = Self {
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            generator_provider: lookup("GENERATOR_PROVIDER").unwrap_or_else(|| "mock".to_string()),
            stage_timeout_secs,
            max_stage_attempts,
            log_format: lookup("LOG_FORMAT").unwrap_or_else(|| "pretty".to_string()),
            rust_log: lookup("RUST_LOG").unwrap_or_else(|| "tubeflow=debug".to_string()),
        };

        Ok(config)
    }

    /// Default generator budget, `None` when disabled
    pub fn stage_timeout(&self) -> Option<Duration> {
        (self.stage_timeout_secs > 0).then(|| Duration::from_secs(self.stage_timeout_secs))
    }

    /// Attempt ceiling per stage, `None` when unlimited
    pub fn max_attempts(&self) -> Option<u32> {
        (self.max_stage_attempts > 0).then_some(self.max_stage_attempts)
    }
}
