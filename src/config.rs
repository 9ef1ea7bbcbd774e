use std::time::Duration;

use crate::error::{AppError, Result};

pub const COINGECKO_API_URL: &str = "https://api.coingecko.com/api/v3";

/// Header the demo tier of the market API reads the key from.
pub const API_KEY_HEADER: &str = "x-cg-demo-api-key";

pub const DEFAULT_API_PORT: u16 = 3000;
pub const DEFAULT_PROXY_URL: &str = "http://localhost:3000";
pub const DEFAULT_WATCHLIST_PATH: &str = "watchlist.json";

/// Key the watchlist is persisted under in the client key-value store.
pub const WATCHLIST_KEY: &str = "crypto-watchlist";

/// Outbound defaults applied when the caller omits a parameter.
pub mod defaults {
    pub const VS_CURRENCY: &str = "usd";
    pub const ORDER: &str = "market_cap_desc";
    pub const PER_PAGE: u32 = 50;
    pub const PAGE: u32 = 1;
    pub const CHART_DAYS: &str = "1";
}

/// How long a cached response is served before the client refetches it.
pub mod stale_time {
    use std::time::Duration;

    pub const GLOBAL: Duration = Duration::from_secs(5 * 60);
    pub const COIN_LIST: Duration = Duration::from_secs(2 * 60);
    pub const COIN_DETAIL: Duration = Duration::from_secs(2 * 60);
    pub const CHART: Duration = Duration::from_secs(60);
}

/// Search input must sit unchanged this long before the table is re-filtered.
pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(300);

/// Page sizes offered by the markets table.
pub const PER_PAGE_OPTIONS: &[u32] = &[50, 100, 250];

/// The watchlist view pulls one large page and filters it locally.
pub const WATCHLIST_PAGE_SIZE: u32 = 250;

/// Dashboard auto-refresh tick. Fresh cache entries make most ticks free.
pub const DASHBOARD_REFRESH_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
    pub upstream_url: String,
    /// None means requests go out unauthenticated.
    pub api_key: Option<String>,
    pub log_level: String,
    pub api_port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("COINGECKO_API_KEY")
            .or_else(|_| std::env::var("VITE_COINGECKO_API_KEY"))
            .ok();

        let upstream_url = std::env::var("COINGECKO_API_URL")
            .unwrap_or_else(|_| COINGECKO_API_URL.to_string());
        if !upstream_url.starts_with("http://") && !upstream_url.starts_with("https://") {
            return Err(AppError::Config(format!(
                "COINGECKO_API_URL must be an http(s) URL, got {upstream_url}"
            )));
        }

        Ok(Self {
            upstream_url,
            api_key: normalize_key(api_key),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| DEFAULT_API_PORT.to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
        })
    }

    /// Config pointing at `upstream_url` with no key, for tests and local tooling.
    pub fn with_upstream(upstream_url: impl Into<String>) -> Self {
        Self {
            upstream_url: upstream_url.into(),
            api_key: None,
            log_level: "info".to_string(),
            api_port: 0,
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub api_url: String,
    pub watchlist_path: String,
}

impl DashboardConfig {
    pub fn from_env() -> Self {
        Self {
            api_url: std::env::var("API_URL").unwrap_or_else(|_| DEFAULT_PROXY_URL.to_string()),
            watchlist_path: std::env::var("WATCHLIST_PATH")
                .unwrap_or_else(|_| DEFAULT_WATCHLIST_PATH.to_string()),
        }
    }
}

/// An empty or whitespace-only key counts as no key.
fn normalize_key(key: Option<String>) -> Option<String> {
    key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_key_is_treated_as_absent() {
        assert_eq!(normalize_key(Some("   ".to_string())), None);
        assert_eq!(normalize_key(Some(String::new())), None);
        assert_eq!(normalize_key(None), None);
        assert_eq!(normalize_key(Some(" abc ".to_string())), Some("abc".to_string()));
    }

    #[test]
    fn with_upstream_has_no_key() {
        let cfg = Config::with_upstream("http://127.0.0.1:9");
        assert!(!cfg.has_api_key());
        assert_eq!(cfg.upstream_url, "http://127.0.0.1:9");
    }
}
