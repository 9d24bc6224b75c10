use std::time::Duration;

use crate::client::{PollConfig, RetryConfig};
use crate::jobs::ProcessorConfig;

// ServerConfig is everything the server binary reads from the environment,
// loaded once at startup into typed fields with defaults.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: String,
    // None -> in-memory progress store
    pub database_url: Option<String>,
    pub migrate_on_startup: bool,
    pub max_batch_items: usize,
    pub item_delay_ms: u64,
    pub item_timeout_ms: u64,
    pub retention_secs: i64,
    pub maintenance_interval_secs: u64,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let bind_addr = env_or_fallback("ENROLLFLOW_BIND_ADDR", "BIND_ADDR")
            .unwrap_or_else(|| "127.0.0.1:8080".to_string());

        let database_url = env_or_fallback("ENROLLFLOW_DATABASE_URL", "DATABASE_URL");

        let migrate_on_startup = env_bool("ENROLLFLOW_MIGRATE_ON_STARTUP").unwrap_or(false);

        let max_batch_items: usize = env_parse("ENROLLFLOW_MAX_BATCH_ITEMS").unwrap_or(5000);
        if max_batch_items == 0 {
            anyhow::bail!("ENROLLFLOW_MAX_BATCH_ITEMS must be > 0");
        }

        Ok(Self {
            bind_addr,
            database_url,
            migrate_on_startup,
            max_batch_items,
            item_delay_ms: env_parse("ENROLLFLOW_ITEM_DELAY_MS").unwrap_or(0),
            item_timeout_ms: env_parse("ENROLLFLOW_ITEM_TIMEOUT_MS").unwrap_or(10_000),
            retention_secs: env_parse("ENROLLFLOW_RETENTION_SECS").unwrap_or(3600),
            maintenance_interval_secs: env_parse("ENROLLFLOW_MAINTENANCE_INTERVAL_SECS")
                .unwrap_or(60)
                .max(1),
        })
    }

    pub fn processor(&self) -> ProcessorConfig {
        ProcessorConfig {
            item_timeout: Duration::from_millis(self.item_timeout_ms.max(1)),
            item_delay: Duration::from_millis(self.item_delay_ms),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub api_url: String,
    pub api_token: Option<String>,
    pub poll_interval_ms: u64,
    pub poll_max_attempts: u32,
    pub max_retries: u32,
}

impl ClientConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let api_url = env_or_fallback("ENROLLFLOW_API_URL", "API_URL")
            .unwrap_or_else(|| "http://127.0.0.1:8080".to_string());
        if !api_url.starts_with("http://") && !api_url.starts_with("https://") {
            anyhow::bail!("ENROLLFLOW_API_URL must be an http(s) URL, got {api_url}");
        }

        Ok(Self {
            api_url,
            api_token: env_or_fallback("ENROLLFLOW_API_TOKEN", "API_TOKEN"),
            poll_interval_ms: env_parse("ENROLLFLOW_POLL_INTERVAL_MS").unwrap_or(1000),
            poll_max_attempts: env_parse("ENROLLFLOW_POLL_MAX_ATTEMPTS").unwrap_or(300),
            max_retries: env_parse("ENROLLFLOW_POLL_MAX_RETRIES").unwrap_or(5),
        })
    }

    pub fn poll(&self) -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(self.poll_interval_ms),
            max_attempts: self.poll_max_attempts.max(1),
        }
    }

    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            ..RetryConfig::default()
        }
    }
}

fn env_or_fallback(primary: &str, fallback: &str) -> Option<String> {
    non_blank(std::env::var(primary).ok()).or_else(|| non_blank(std::env::var(fallback).ok()))
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key).ok().map(|v| parse_bool(&v))
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
