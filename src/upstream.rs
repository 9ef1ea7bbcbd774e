use std::sync::Arc;
use std::time::Instant;

use reqwest::header::ACCEPT;
use reqwest::Url;
use tracing::debug;

use crate::api::latency::LatencyStats;
use crate::config::{Config, API_KEY_HEADER};
use crate::error::{AppError, Result};
use crate::resource::Resource;

/// Pass-through client for the market API. One request per call: no retry,
/// no timeout beyond reqwest's defaults.
pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
    latency: Arc<LatencyStats>,
}

impl UpstreamClient {
    pub fn new(cfg: &Config, latency: Arc<LatencyStats>) -> Result<Self> {
        let base_url = Url::parse(&cfg.upstream_url)
            .map_err(|e| AppError::Config(format!("invalid upstream URL {}: {e}", cfg.upstream_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::Config(format!(
                "upstream URL {} cannot carry a path",
                cfg.upstream_url
            )));
        }

        let http = reqwest::Client::builder().build()?;

        Ok(Self {
            http,
            base_url,
            api_key: cfg.api_key.clone(),
            latency,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Base URL + percent-encoded path segments + query pairs in the given
    /// order. No `?` is appended when the query is empty.
    pub fn build_url(&self, segments: &[&str], query: &[(&str, String)]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::Config(format!("{} cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        Ok(url)
    }

    /// GET and parse a JSON body. Non-2xx statuses become `AppError::Upstream`
    /// carrying the response text when it can be read.
    pub async fn fetch(&self, segments: &[&str], query: &[(&str, String)]) -> Result<serde_json::Value> {
        let url = self.build_url(segments, query)?;

        let mut request = self.http.get(url.clone()).header(ACCEPT, "application/json");
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let started = Instant::now();
        let sent = request.send().await;
        let elapsed = started.elapsed();
        self.latency.record(elapsed);
        let response = sent?;

        let status = response.status();
        debug!(
            url = %url,
            status = status.as_u16(),
            elapsed_ms = elapsed.as_millis() as u64,
            authenticated = self.api_key.is_some(),
            "upstream response"
        );

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream { status: status.as_u16(), body });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn fetch_resource(&self, resource: &Resource) -> Result<serde_json::Value> {
        self.fetch(&resource.segments(), &resource.query()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::CoinListParams;

    fn client(base: &str) -> UpstreamClient {
        UpstreamClient::new(&Config::with_upstream(base), Arc::new(LatencyStats::new())).unwrap()
    }

    #[test]
    fn global_url_has_no_query_marker() {
        let c = client("https://api.coingecko.com/api/v3");
        let url = c.build_url(&Resource::Global.segments(), &Resource::Global.query()).unwrap();
        assert_eq!(url.as_str(), "https://api.coingecko.com/api/v3/global");
    }

    #[test]
    fn coin_list_url_carries_defaults_in_order() {
        let c = client("https://api.coingecko.com/api/v3/");
        let r = Resource::CoinList(CoinListParams::default());
        let url = c.build_url(&r.segments(), &r.query()).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.coingecko.com/api/v3/coins/markets?vs_currency=usd&order=market_cap_desc&per_page=50&page=1&sparkline=false"
        );
    }

    #[test]
    fn coin_id_cannot_escape_its_segment() {
        let c = client("http://127.0.0.1:1/api/v3");
        let url = c.build_url(&["coins", "../global"], &[]).unwrap();
        assert_eq!(url.path(), "/api/v3/coins/..%2Fglobal");
    }

    #[test]
    fn bad_base_url_is_a_config_error() {
        let result = UpstreamClient::new(
            &Config::with_upstream("not a url"),
            Arc::new(LatencyStats::new()),
        );
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn connection_refused_is_a_transport_error() {
        // Port 9 (discard) is closed on loopback in test environments.
        let c = client("http://127.0.0.1:9");
        let err = c.fetch_resource(&Resource::Global).await.unwrap_err();
        assert!(matches!(err, AppError::Transport(_)), "{err:?}");
    }
}
