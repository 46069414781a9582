// src/config.rs

use std::{env, net::SocketAddr, str::FromStr, time::Duration};

use dotenvy::dotenv;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Settings for the external grading oracle.
#[derive(Debug, Clone)]
pub struct OracleConfig {
    /// Without a key every free-text answer is scored by the fallback scorer.
    pub api_key: Option<String>,
    pub base_url: Url,
    pub model: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub fallback_on_failure: bool,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: Url::parse("https://api.openai.com/v1").expect("static url"),
            model: "gpt-4o-mini".to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_backoff: Duration::from_millis(500),
            fallback_on_failure: true,
        }
    }
}

/// Settings for dispatching per-question grading within a submission.
#[derive(Debug, Clone)]
pub struct GradingConfig {
    /// Dispatch free-text evaluations concurrently instead of one at a time.
    pub concurrent: bool,
    /// Delay between concurrent oracle dispatches.
    pub stagger: Duration,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            concurrent: false,
            stagger: Duration::from_millis(200),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// When unset the in-memory store is used.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub rust_log: String,
    pub bind_addr: SocketAddr,
    pub oracle: OracleConfig,
    pub grading: GradingConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let jwt_secret = env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let oracle_defaults = OracleConfig::default();
        let base_url = match optional("ORACLE_BASE_URL") {
            Some(raw) => Url::parse(&raw).map_err(|e| ConfigError::Invalid {
                name: "ORACLE_BASE_URL",
                reason: e.to_string(),
            })?,
            None => oracle_defaults.base_url,
        };

        let oracle = OracleConfig {
            api_key: optional("ORACLE_API_KEY"),
            base_url,
            model: optional("ORACLE_MODEL").unwrap_or(oracle_defaults.model),
            timeout: Duration::from_secs(parse_or("ORACLE_TIMEOUT_SECS", 30)?),
            max_retries: parse_or("ORACLE_MAX_RETRIES", oracle_defaults.max_retries)?,
            retry_backoff: Duration::from_millis(parse_or("ORACLE_RETRY_BACKOFF_MS", 500)?),
            fallback_on_failure: parse_or("ORACLE_FALLBACK", true)?,
        };

        let grading = GradingConfig {
            concurrent: parse_or("GRADING_CONCURRENT", false)?,
            stagger: Duration::from_millis(parse_or("GRADING_STAGGER_MS", 200)?),
        };

        Ok(Self {
            database_url: optional("DATABASE_URL"),
            jwt_secret,
            rust_log,
            bind_addr: parse_or("BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000)))?,
            oracle,
            grading,
        })
    }
}

/// Reads a variable, treating blank values as unset.
fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional(name) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}
