use std::time::Duration;

use anyhow::Context;

use crate::aggregate::RetryPolicy;

pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_MAX_CONNECTIONS: &str = "METRICS_MAX_CONNECTIONS";
pub const ENV_RETRY_ATTEMPTS: &str = "METRICS_RETRY_ATTEMPTS";
pub const ENV_RETRY_BASE_MS: &str = "METRICS_RETRY_BASE_MS";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub retry: RetryPolicy,
}

impl Config {
    /// Reads settings from the process environment, after loading `.env`
    /// if one is present.
    pub fn from_env() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = lookup(ENV_DATABASE_URL)
            .filter(|value| !value.trim().is_empty())
            .context("DATABASE_URL must be set to a production Postgres instance")?;

        let defaults = RetryPolicy::default();
        let max_connections = parse_or(&lookup, ENV_MAX_CONNECTIONS, 5u32)?;
        let attempts = parse_or(&lookup, ENV_RETRY_ATTEMPTS, defaults.attempts)?;
        let base_ms = parse_or(
            &lookup,
            ENV_RETRY_BASE_MS,
            defaults.base_delay.as_millis() as u64,
        )?;

        Ok(Self {
            database_url,
            max_connections: max_connections.max(1),
            retry: RetryPolicy {
                attempts: attempts.max(1),
                base_delay: Duration::from_millis(base_ms),
            },
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a non-negative integer, got {raw:?}")),
        None => Ok(default),
    }
}
