use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use compras_entities::DEFAULT_BASE_URL;
use compras_storage::{BackoffPolicy, HttpClientConfig};

/// Every tunable of a run, read once at startup and passed down explicitly.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    pub database_url: Option<String>,
    /// Primary base URL first, then fallbacks tried on 404.
    pub base_urls: Vec<String>,
    pub page_size: u32,
    pub http_timeout_secs: u64,
    pub max_attempts: usize,
    pub backoff_base_ms: u64,
    pub max_window_days: u32,
    /// Delay between consecutive upstream fetches.
    pub pacing: Duration,
    pub start_date: NaiveDate,
    pub lookback_days: u64,
    pub force_full: bool,
    /// Management unit (UASG) every windowed job is scoped to.
    pub unidade: String,
    pub modalidades: Vec<u32>,
    pub target_limit: u32,
    pub user_agent: String,
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; missing or unparseable values
    /// fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let text = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let parsed = |key: &str| text(key).and_then(|v| v.parse::<u64>().ok());

        let mut base_urls = vec![text("COMPRAS_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string())];
        if let Some(fallbacks) = text("COMPRAS_BASE_URL_FALLBACKS") {
            base_urls.extend(
                fallbacks
                    .split(',')
                    .map(str::trim)
                    .filter(|url| !url.is_empty())
                    .map(str::to_string),
            );
        }

        let modalidades = text("COMPRAS_MODALIDADES")
            .map(|v| {
                v.split(',')
                    .filter_map(|m| m.trim().parse().ok())
                    .collect::<Vec<u32>>()
            })
            .filter(|list| !list.is_empty())
            .unwrap_or_else(|| vec![5, 6, 7]);

        Self {
            database_url: text("DATABASE_URL"),
            base_urls,
            page_size: parsed("COMPRAS_PAGE_SIZE")
                .and_then(|v| u32::try_from(v).ok())
                .filter(|v| *v > 0)
                .unwrap_or(500),
            http_timeout_secs: parsed("COMPRAS_TIMEOUT").filter(|v| *v > 0).unwrap_or(60),
            max_attempts: parsed("COMPRAS_MAX_ATTEMPTS")
                .and_then(|v| usize::try_from(v).ok())
                .filter(|v| *v > 0)
                .unwrap_or(5),
            backoff_base_ms: parsed("COMPRAS_BACKOFF_BASE_MS").unwrap_or(2000),
            max_window_days: parsed("COMPRAS_MAX_WINDOW_DAYS")
                .and_then(|v| u32::try_from(v).ok())
                .filter(|v| *v > 0)
                .unwrap_or(365),
            pacing: text("COMPRAS_SLEEP_S")
                .and_then(|v| v.parse::<f64>().ok())
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
                .unwrap_or(Duration::from_millis(100)),
            start_date: text("COMPRAS_START_DATE")
                .and_then(|v| NaiveDate::parse_from_str(&v, "%Y-%m-%d").ok())
                .unwrap_or_else(default_start_date),
            lookback_days: parsed("COMPRAS_LOOKBACK_DAYS").unwrap_or(7),
            force_full: text("COMPRAS_FORCE_FULL")
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "sim"))
                .unwrap_or(false),
            unidade: text("COMPRAS_UNIDADE").unwrap_or_else(|| "155125".to_string()),
            modalidades,
            target_limit: parsed("COMPRAS_TARGET_LIMIT")
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(1000),
            user_agent: text("COMPRAS_USER_AGENT").unwrap_or_else(|| "compras-ingest/0.1".to_string()),
        }
    }

    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: Duration::from_secs(self.http_timeout_secs),
            user_agent: Some(self.user_agent.clone()),
            backoff: BackoffPolicy {
                max_attempts: self.max_attempts,
                base_delay: Duration::from_millis(self.backoff_base_ms),
                ..Default::default()
            },
        }
    }

    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .ok_or_else(|| anyhow!("DATABASE_URL is not set"))
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

fn default_start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2021, 1, 1).unwrap_or(NaiveDate::MIN)
}
