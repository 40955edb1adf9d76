//! services/client/src/config.rs
//!
//! Defines the client's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use reqwest::Url;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    /// Base URL every endpoint path is joined onto. Always ends in `/`.
    pub api_url: Url,
    pub log_level: Level,
    pub request_timeout: Duration,
    pub poll_interval: Duration,
    pub poll_max_attempts: u32,
    pub email: Option<String>,
    pub password: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Service Endpoint ---
        let api_url_str = lookup("DOCUNEXUS_API_URL")
            .ok_or_else(|| ConfigError::MissingVar("DOCUNEXUS_API_URL".to_string()))?;
        let api_url = parse_base_url(&api_url_str).map_err(|e| {
            ConfigError::InvalidValue("DOCUNEXUS_API_URL".to_string(), e)
        })?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Timing ---
        let request_timeout =
            Duration::from_secs(parse_positive(&lookup, "DOCUNEXUS_REQUEST_TIMEOUT_SECS", 30)?);
        let poll_interval =
            Duration::from_secs(parse_positive(&lookup, "DOCUNEXUS_POLL_INTERVAL_SECS", 5)?);
        let poll_max_attempts: u32 = parse_number(&lookup, "DOCUNEXUS_POLL_MAX_ATTEMPTS", 60)?;

        // --- Credentials (as optional) ---
        let email = lookup("DOCUNEXUS_EMAIL");
        let password = lookup("DOCUNEXUS_PASSWORD");

        Ok(Self {
            api_url,
            log_level,
            request_timeout,
            poll_interval,
            poll_max_attempts,
            email,
            password,
        })
    }
}

/// Endpoint paths are joined relative to the base, so the base must end in `/`
/// or its last segment would be replaced.
fn parse_base_url(raw: &str) -> Result<Url, String> {
    let mut normalized = raw.trim().to_string();
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    let url = Url::parse(&normalized).map_err(|e| e.to_string())?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(format!("unsupported scheme '{}'", other)),
    }
}

fn parse_number<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}

/// Durations feed timers that reject a zero period.
fn parse_positive<F>(lookup: &F, key: &str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match parse_number(lookup, key, default)? {
        0 => Err(ConfigError::InvalidValue(
            key.to_string(),
            "must be greater than zero".to_string(),
        )),
        value => Ok(value),
    }
}
