//! The four logical market-data resources, described once.
//!
//! A `Resource` carries its parameters with defaults already applied. The proxy
//! turns it into an upstream request; the dashboard turns it into a proxy request
//! and a cache key. Both sides share the same path segments and query order.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::{defaults, stale_time};
use crate::error::{AppError, Result};
use crate::types::ChartPeriod;

// ---------------------------------------------------------------------------
// Parameter sets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinListParams {
    pub vs_currency: String,
    pub order: String,
    pub per_page: u32,
    pub page: u32,
    pub sparkline: bool,
}

impl Default for CoinListParams {
    fn default() -> Self {
        Self {
            vs_currency: defaults::VS_CURRENCY.to_string(),
            order: defaults::ORDER.to_string(),
            per_page: defaults::PER_PAGE,
            page: defaults::PAGE,
            sparkline: false,
        }
    }
}

impl CoinListParams {
    pub fn page(per_page: u32, page: u32) -> Self {
        Self { per_page, page, ..Self::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinDetailParams {
    pub localization: bool,
    pub tickers: bool,
    pub market_data: bool,
    pub community_data: bool,
    pub developer_data: bool,
    pub sparkline: bool,
}

impl Default for CoinDetailParams {
    fn default() -> Self {
        Self {
            localization: false,
            tickers: false,
            market_data: true,
            community_data: false,
            developer_data: false,
            sparkline: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartParams {
    pub vs_currency: String,
    /// Kept as text: the upstream also accepts `max`.
    pub days: String,
    /// None leaves granularity to the upstream.
    pub interval: Option<String>,
}

impl Default for ChartParams {
    fn default() -> Self {
        Self {
            vs_currency: defaults::VS_CURRENCY.to_string(),
            days: defaults::CHART_DAYS.to_string(),
            interval: None,
        }
    }
}

impl ChartParams {
    pub fn for_period(period: ChartPeriod) -> Self {
        Self { days: period.days().to_string(), ..Self::default() }
    }
}

// ---------------------------------------------------------------------------
// Resource
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    Global,
    CoinList(CoinListParams),
    CoinDetail { id: String, params: CoinDetailParams },
    CoinChart { id: String, params: ChartParams },
}

impl Resource {
    pub fn coin_detail(id: &str) -> Result<Self> {
        Ok(Resource::CoinDetail {
            id: validate_coin_id(id)?.to_string(),
            params: CoinDetailParams::default(),
        })
    }

    pub fn coin_chart(id: &str, period: ChartPeriod) -> Result<Self> {
        Ok(Resource::CoinChart {
            id: validate_coin_id(id)?.to_string(),
            params: ChartParams::for_period(period),
        })
    }

    /// Stable logical name, the first half of the cache key.
    pub fn name(&self) -> &'static str {
        match self {
            Resource::Global => "global",
            Resource::CoinList(_) => "coins/markets",
            Resource::CoinDetail { .. } => "coins/detail",
            Resource::CoinChart { .. } => "coins/market_chart",
        }
    }

    /// Path segments, identical on the proxy and the upstream.
    pub fn segments(&self) -> Vec<&str> {
        match self {
            Resource::Global => vec!["global"],
            Resource::CoinList(_) => vec!["coins", "markets"],
            Resource::CoinDetail { id, .. } => vec!["coins", id.as_str()],
            Resource::CoinChart { id, .. } => vec!["coins", id.as_str(), "market_chart"],
        }
    }

    /// Outbound query in documented order, defaults applied.
    pub fn query(&self) -> Vec<(&'static str, String)> {
        match self {
            Resource::Global => Vec::new(),
            Resource::CoinList(p) => vec![
                ("vs_currency", p.vs_currency.clone()),
                ("order", p.order.clone()),
                ("per_page", p.per_page.to_string()),
                ("page", p.page.to_string()),
                ("sparkline", p.sparkline.to_string()),
            ],
            Resource::CoinDetail { params: p, .. } => vec![
                ("localization", p.localization.to_string()),
                ("tickers", p.tickers.to_string()),
                ("market_data", p.market_data.to_string()),
                ("community_data", p.community_data.to_string()),
                ("developer_data", p.developer_data.to_string()),
                ("sparkline", p.sparkline.to_string()),
            ],
            Resource::CoinChart { params: p, .. } => {
                let mut q = vec![
                    ("vs_currency", p.vs_currency.clone()),
                    ("days", p.days.clone()),
                ];
                if let Some(interval) = &p.interval {
                    q.push(("interval", interval.clone()));
                }
                q
            }
        }
    }

    pub fn cache_key(&self) -> CacheKey {
        let mut params: BTreeMap<String, String> = self
            .query()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        match self {
            Resource::CoinDetail { id, .. } | Resource::CoinChart { id, .. } => {
                params.insert("id".to_string(), id.clone());
            }
            _ => {}
        }
        CacheKey { resource: self.name(), params }
    }

    pub fn stale_time(&self) -> Duration {
        match self {
            Resource::Global => stale_time::GLOBAL,
            Resource::CoinList(_) => stale_time::COIN_LIST,
            Resource::CoinDetail { .. } => stale_time::COIN_DETAIL,
            Resource::CoinChart { .. } => stale_time::CHART,
        }
    }

    /// Message returned to callers when this resource cannot be fetched.
    pub fn failure_message(&self) -> &'static str {
        match self {
            Resource::Global => "Failed to fetch global market data",
            Resource::CoinList(_) => "Failed to fetch cryptocurrency market data",
            Resource::CoinDetail { .. } => "Failed to fetch coin data",
            Resource::CoinChart { .. } => "Failed to fetch chart data",
        }
    }
}

// ---------------------------------------------------------------------------
// CacheKey
// ---------------------------------------------------------------------------

/// `(resource name, normalized parameters)`. Parameters are stored after
/// defaults are applied, so equivalent requests always produce equal keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    resource: &'static str,
    params: BTreeMap<String, String>,
}

impl CacheKey {
    pub fn resource(&self) -> &'static str {
        self.resource
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.resource)?;
        for (i, (k, v)) in self.params.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{sep}{k}={v}")?;
        }
        Ok(())
    }
}

/// Coin ids are opaque upstream strings; the only local rule is that one must
/// be present.
pub fn validate_coin_id(id: &str) -> Result<&str> {
    let id = id.trim();
    if id.is_empty() {
        return Err(AppError::Validation("Coin ID is required".to_string()));
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(q: &[(&'static str, String)]) -> Vec<&'static str> {
        q.iter().map(|(k, _)| *k).collect()
    }

    #[test]
    fn coin_list_defaults_fill_all_five_params() {
        let q = Resource::CoinList(CoinListParams::default()).query();
        assert_eq!(keys(&q), ["vs_currency", "order", "per_page", "page", "sparkline"]);
        let values: Vec<_> = q.iter().map(|(_, v)| v.as_str()).collect();
        assert_eq!(values, ["usd", "market_cap_desc", "50", "1", "false"]);
    }

    #[test]
    fn coin_list_always_has_exactly_five_params() {
        for (per_page, page) in [(50, 1), (100, 3), (250, 999)] {
            let q = Resource::CoinList(CoinListParams::page(per_page, page)).query();
            assert_eq!(q.len(), 5);
            assert_eq!(q[2].1, per_page.to_string());
            assert_eq!(q[3].1, page.to_string());
        }
    }

    #[test]
    fn chart_omits_interval_when_unset() {
        let r = Resource::coin_chart("bitcoin", ChartPeriod::Week).unwrap();
        let q = r.query();
        assert_eq!(keys(&q), ["vs_currency", "days"]);
        assert_eq!(q[1].1, "7");

        let with_interval = Resource::CoinChart {
            id: "bitcoin".to_string(),
            params: ChartParams { interval: Some("daily".to_string()), ..ChartParams::default() },
        };
        assert_eq!(keys(&with_interval.query()), ["vs_currency", "days", "interval"]);
    }

    #[test]
    fn detail_defaults_only_enable_market_data() {
        let r = Resource::coin_detail("bitcoin").unwrap();
        let enabled: Vec<_> = r
            .query()
            .into_iter()
            .filter(|(_, v)| v == "true")
            .map(|(k, _)| k)
            .collect();
        assert_eq!(enabled, ["market_data"]);
        assert_eq!(r.segments(), ["coins", "bitcoin"]);
    }

    #[test]
    fn blank_coin_id_is_rejected() {
        assert!(matches!(Resource::coin_detail(""), Err(AppError::Validation(_))));
        assert!(matches!(
            Resource::coin_chart("   ", ChartPeriod::Day),
            Err(AppError::Validation(_))
        ));
        assert_eq!(validate_coin_id(" bitcoin ").unwrap(), "bitcoin");
    }

    #[test]
    fn equivalent_requests_share_a_cache_key() {
        let implicit = Resource::CoinList(CoinListParams::default()).cache_key();
        let explicit = Resource::CoinList(CoinListParams::page(50, 1)).cache_key();
        assert_eq!(implicit, explicit);

        let other_page = Resource::CoinList(CoinListParams::page(50, 2)).cache_key();
        assert_ne!(implicit, other_page);
    }

    #[test]
    fn cache_key_distinguishes_coins_and_periods() {
        let btc_day = Resource::coin_chart("bitcoin", ChartPeriod::Day).unwrap().cache_key();
        let btc_week = Resource::coin_chart("bitcoin", ChartPeriod::Week).unwrap().cache_key();
        let eth_day = Resource::coin_chart("ethereum", ChartPeriod::Day).unwrap().cache_key();
        assert_ne!(btc_day, btc_week);
        assert_ne!(btc_day, eth_day);
        assert_eq!(btc_day.resource(), "coins/market_chart");
        assert_eq!(btc_day.param("id"), Some("bitcoin"));
        assert_eq!(btc_day.to_string(), "coins/market_chart?days=1&id=bitcoin&vs_currency=usd");
    }
}
