use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Coin list rows (GET /coins/markets)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinMarket {
    pub id: String,
    pub symbol: String,
    pub name: String,
    pub image: String,
    pub current_price: f64,
    pub market_cap: f64,
    pub market_cap_rank: u32,
    pub fully_diluted_valuation: Option<f64>,
    pub total_volume: f64,
    pub high_24h: f64,
    pub low_24h: f64,
    pub price_change_24h: f64,
    pub price_change_percentage_24h: f64,
    pub market_cap_change_24h: f64,
    pub market_cap_change_percentage_24h: f64,
    pub circulating_supply: f64,
    /// None when the coin has no fixed cap.
    pub total_supply: Option<f64>,
    pub max_supply: Option<f64>,
    pub ath: f64,
    pub ath_change_percentage: f64,
    pub ath_date: String,
    pub atl: f64,
    pub atl_change_percentage: f64,
    pub atl_date: String,
    pub last_updated: String,
}

// ---------------------------------------------------------------------------
// Coin detail (GET /coins/{id})
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinDetail {
    pub id: String,
    pub symbol: String,
    pub name: String,
    /// language code -> text
    #[serde(default)]
    pub description: HashMap<String, String>,
    pub image: CoinImage,
    pub market_cap_rank: u32,
    pub market_data: CoinMarketData,
}

impl CoinDetail {
    pub fn description_en(&self) -> &str {
        self.description.get("en").map(String::as_str).unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinImage {
    pub thumb: String,
    pub small: String,
    pub large: String,
}

/// Market figures for one coin. Currency-keyed maps hold one value per
/// reporting currency; callers read the one they display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinMarketData {
    pub current_price: HashMap<String, f64>,
    pub market_cap: HashMap<String, f64>,
    pub total_volume: HashMap<String, f64>,
    pub price_change_percentage_24h: f64,
    pub price_change_percentage_7d: f64,
    pub price_change_percentage_30d: f64,
    pub circulating_supply: f64,
    pub total_supply: Option<f64>,
    pub max_supply: Option<f64>,
    pub ath: HashMap<String, f64>,
    pub atl: HashMap<String, f64>,
}

impl CoinMarketData {
    pub fn price_in(&self, currency: &str) -> Option<f64> {
        self.current_price.get(currency).copied()
    }

    pub fn market_cap_in(&self, currency: &str) -> Option<f64> {
        self.market_cap.get(currency).copied()
    }

    pub fn volume_in(&self, currency: &str) -> Option<f64> {
        self.total_volume.get(currency).copied()
    }

    pub fn ath_in(&self, currency: &str) -> Option<f64> {
        self.ath.get(currency).copied()
    }

    pub fn atl_in(&self, currency: &str) -> Option<f64> {
        self.atl.get(currency).copied()
    }
}

// ---------------------------------------------------------------------------
// Chart series (GET /coins/{id}/market_chart)
// ---------------------------------------------------------------------------

/// Three parallel `[timestamp_ms, value]` series over the requested window.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChartSeries {
    pub prices: Vec<[f64; 2]>,
    pub market_caps: Vec<[f64; 2]>,
    pub total_volumes: Vec<[f64; 2]>,
}

impl ChartSeries {
    /// Timestamps never go backwards within any of the three series.
    pub fn is_ordered(&self) -> bool {
        [&self.prices, &self.market_caps, &self.total_volumes]
            .iter()
            .all(|series| series.windows(2).all(|w| w[0][0] <= w[1][0]))
    }

    /// Last price minus first price; None with fewer than two points.
    pub fn price_change(&self) -> Option<f64> {
        match (self.prices.first(), self.prices.last()) {
            (Some(first), Some(last)) if self.prices.len() > 1 => Some(last[1] - first[1]),
            _ => None,
        }
    }

    /// `(min, max)` over price values.
    pub fn price_bounds(&self) -> Option<(f64, f64)> {
        self.prices.iter().map(|p| p[1]).fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
    }

    /// `(first_ts, last_ts)` of the price series.
    pub fn time_bounds(&self) -> Option<(f64, f64)> {
        Some((self.prices.first()?[0], self.prices.last()?[0]))
    }

    pub fn price_points(&self) -> Vec<(f64, f64)> {
        self.prices.iter().map(|p| (p[0], p[1])).collect()
    }
}

// ---------------------------------------------------------------------------
// Global snapshot (GET /global)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalSnapshot {
    pub data: GlobalData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalData {
    pub active_cryptocurrencies: u64,
    pub upcoming_icos: u64,
    pub ongoing_icos: u64,
    pub ended_icos: u64,
    pub markets: u64,
    pub total_market_cap: HashMap<String, f64>,
    pub total_volume: HashMap<String, f64>,
    /// asset symbol -> share of total market cap, in percent
    pub market_cap_percentage: HashMap<String, f64>,
    pub market_cap_change_percentage_24h_usd: f64,
}

impl GlobalData {
    pub fn total_market_cap_in(&self, currency: &str) -> Option<f64> {
        self.total_market_cap.get(currency).copied()
    }

    pub fn total_volume_in(&self, currency: &str) -> Option<f64> {
        self.total_volume.get(currency).copied()
    }

    /// Share held by the dominant asset (btc).
    pub fn btc_dominance(&self) -> Option<f64> {
        self.market_cap_percentage.get("btc").copied()
    }
}

// ---------------------------------------------------------------------------
// Chart period selector
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChartPeriod {
    #[default]
    Day,
    Week,
    Month,
    Quarter,
}

impl ChartPeriod {
    pub const ALL: [ChartPeriod; 4] =
        [ChartPeriod::Day, ChartPeriod::Week, ChartPeriod::Month, ChartPeriod::Quarter];

    /// Value sent as the `days` query parameter.
    pub fn days(self) -> &'static str {
        match self {
            ChartPeriod::Day => "1",
            ChartPeriod::Week => "7",
            ChartPeriod::Month => "30",
            ChartPeriod::Quarter => "90",
        }
    }
}

impl std::fmt::Display for ChartPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChartPeriod::Day => "24H",
            ChartPeriod::Week => "7D",
            ChartPeriod::Month => "30D",
            ChartPeriod::Quarter => "90D",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod fixtures {
    use super::CoinMarket;

    pub fn coin(id: &str, symbol: &str, market_cap: f64, change_pct: f64) -> CoinMarket {
        CoinMarket {
            id: id.to_string(),
            symbol: symbol.to_string(),
            name: id.to_string(),
            image: format!("https://img.example/{id}.png"),
            current_price: 1.0,
            market_cap,
            market_cap_rank: 1,
            fully_diluted_valuation: None,
            total_volume: 1_000.0,
            high_24h: 1.1,
            low_24h: 0.9,
            price_change_24h: change_pct / 100.0,
            price_change_percentage_24h: change_pct,
            market_cap_change_24h: 0.0,
            market_cap_change_percentage_24h: 0.0,
            circulating_supply: 1_000_000.0,
            total_supply: None,
            max_supply: None,
            ath: 2.0,
            ath_change_percentage: -50.0,
            ath_date: "2021-11-10T14:24:11.849Z".to_string(),
            atl: 0.1,
            atl_change_percentage: 900.0,
            atl_date: "2015-10-20T00:00:00.000Z".to_string(),
            last_updated: "2024-01-01T00:00:00.000Z".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coin_market_accepts_null_supply_caps() {
        let raw = r#"{
            "id":"ethereum","symbol":"eth","name":"Ethereum","image":"https://img/eth.png",
            "current_price":3000.5,"market_cap":360000000000,"market_cap_rank":2,
            "fully_diluted_valuation":null,"total_volume":15000000000,
            "high_24h":3100,"low_24h":2900,"price_change_24h":-12.5,
            "price_change_percentage_24h":-0.41,"market_cap_change_24h":-1,
            "market_cap_change_percentage_24h":-0.4,"circulating_supply":120000000,
            "total_supply":null,"max_supply":null,"ath":4878.26,
            "ath_change_percentage":-38.5,"ath_date":"2021-11-10T14:24:19.604Z",
            "atl":0.43,"atl_change_percentage":697000,"atl_date":"2015-10-20T00:00:00.000Z",
            "roi":null,"last_updated":"2024-01-01T00:00:00.000Z"
        }"#;
        let coin: CoinMarket = serde_json::from_str(raw).unwrap();
        assert_eq!(coin.id, "ethereum");
        assert_eq!(coin.market_cap_rank, 2);
        assert!(coin.max_supply.is_none());
        assert!(coin.total_supply.is_none());
    }

    #[test]
    fn coin_market_rejects_missing_price() {
        let raw = r#"{"id":"x","symbol":"x","name":"X","image":""}"#;
        assert!(serde_json::from_str::<CoinMarket>(raw).is_err());
    }

    #[test]
    fn chart_series_ordering_and_change() {
        let series = ChartSeries {
            prices: vec![[1.0, 10.0], [2.0, 12.0], [2.0, 11.0], [3.0, 15.0]],
            market_caps: vec![[1.0, 100.0], [3.0, 120.0]],
            total_volumes: vec![],
        };
        assert!(series.is_ordered());
        assert_eq!(series.price_change(), Some(5.0));
        assert_eq!(series.price_bounds(), Some((10.0, 15.0)));
        assert_eq!(series.time_bounds(), Some((1.0, 3.0)));

        let unordered = ChartSeries {
            prices: vec![[5.0, 1.0], [4.0, 1.0]],
            ..Default::default()
        };
        assert!(!unordered.is_ordered());
        assert_eq!(ChartSeries::default().price_change(), None);
    }

    #[test]
    fn global_snapshot_reads_usd_figures() {
        let raw = r#"{"data":{
            "active_cryptocurrencies":13456,"upcoming_icos":0,"ongoing_icos":49,
            "ended_icos":3376,"markets":1100,
            "total_market_cap":{"usd":2.5e12,"eur":2.3e12},
            "total_volume":{"usd":9.0e10},
            "market_cap_percentage":{"btc":52.1,"eth":16.9},
            "market_cap_change_percentage_24h_usd":1.25,
            "updated_at":1700000000
        }}"#;
        let global: GlobalSnapshot = serde_json::from_str(raw).unwrap();
        assert_eq!(global.data.active_cryptocurrencies, 13456);
        assert_eq!(global.data.total_market_cap_in("usd"), Some(2.5e12));
        assert_eq!(global.data.btc_dominance(), Some(52.1));
    }

    #[test]
    fn chart_period_days() {
        let days: Vec<_> = ChartPeriod::ALL.iter().map(|p| p.days()).collect();
        assert_eq!(days, ["1", "7", "30", "90"]);
        assert_eq!(ChartPeriod::Week.to_string(), "7D");
    }
}
