use anyhow::{anyhow, Result};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_DB_HOST: &str = "localhost";
const DEFAULT_DB_PORT: &str = "5432";
const DEFAULT_DB_NAME: &str = "item_data_db";
const DEFAULT_DB_USER: &str = "item_data_user";
const DEFAULT_USER_AGENT: &str = "ItemDataCollector/1.0";
const DEFAULT_API_BASE_URL: &str = "https://prices.runescape.wiki/api/v1/osrs";
const DEFAULT_QUEUE_DIR: &str = "queue";
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY_SECS: u64 = 5;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

/// Bounded, fixed-delay retry used at the fetch layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_ATTEMPTS,
            delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
        }
    }
}

/// Process-wide configuration, built once in `main` and passed down by reference.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub database_url: String,
    pub user_agent: String,
    pub api_base_url: String,
    pub queue_dir: PathBuf,
    pub fetch_retry: RetryPolicy,
    pub http_timeout: Duration,
}

impl IngestConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let setting = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let database_url = match setting("DATABASE_URL") {
            Some(url) => url,
            None => {
                let password = setting("DB_PASSWORD").ok_or_else(|| {
                    anyhow!("Either DATABASE_URL or DB_PASSWORD must be set")
                })?;
                format!(
                    "host={} port={} dbname={} user={} password={}",
                    setting("DB_HOST").unwrap_or_else(|| DEFAULT_DB_HOST.to_string()),
                    setting("DB_PORT").unwrap_or_else(|| DEFAULT_DB_PORT.to_string()),
                    setting("DB_NAME").unwrap_or_else(|| DEFAULT_DB_NAME.to_string()),
                    setting("DB_USER").unwrap_or_else(|| DEFAULT_DB_USER.to_string()),
                    password
                )
            }
        };

        let max_attempts = parse_u64(
            setting("FETCH_RETRY_ATTEMPTS"),
            "FETCH_RETRY_ATTEMPTS",
            DEFAULT_RETRY_ATTEMPTS as u64,
            1,
        )?;
        let max_attempts = u32::try_from(max_attempts).map_err(|_| {
            anyhow!(
                "Setting FETCH_RETRY_ATTEMPTS is too large (value: {})",
                max_attempts
            )
        })?;
        let retry_delay_secs = parse_u64(
            setting("FETCH_RETRY_DELAY_SECS"),
            "FETCH_RETRY_DELAY_SECS",
            DEFAULT_RETRY_DELAY_SECS,
            0,
        )?;
        let http_timeout_secs = parse_u64(
            setting("HTTP_TIMEOUT_SECS"),
            "HTTP_TIMEOUT_SECS",
            DEFAULT_HTTP_TIMEOUT_SECS,
            1,
        )?;

        Ok(Self {
            database_url,
            user_agent: setting("USER_AGENT").unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            api_base_url: setting("PRICES_API_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            queue_dir: PathBuf::from(
                setting("QUEUE_DIR").unwrap_or_else(|| DEFAULT_QUEUE_DIR.to_string()),
            ),
            fetch_retry: RetryPolicy {
                max_attempts,
                delay: Duration::from_secs(retry_delay_secs),
            },
            http_timeout: Duration::from_secs(http_timeout_secs),
        })
    }
}

fn parse_u64(raw: Option<String>, key: &str, default: u64, min: u64) -> Result<u64> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    let value = raw
        .parse::<u64>()
        .map_err(|_| anyhow!("Setting {} must be a non-negative integer (value: {})", key, raw))?;
    if value < min {
        return Err(anyhow!(
            "Setting {} must be >= {} (value: {})",
            key,
            min,
            raw
        ));
    }
    Ok(value)
}
