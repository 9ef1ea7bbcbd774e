//! Dashboard-side access to the proxy: HTTP calls routed through a shared
//! `QueryCache`.

pub mod cache;
pub mod slot;

use std::sync::Arc;

use reqwest::header::ACCEPT;
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{AppError, Result};
use crate::resource::Resource;

pub use cache::{QueryCache, QueryState};
pub use slot::LatestSlot;

/// Error body the proxy returns on 4xx/5xx.
#[derive(Debug, Deserialize)]
struct ProxyError {
    message: String,
}

#[derive(Clone)]
pub struct DataClient {
    http: reqwest::Client,
    base_url: Url,
    cache: Arc<QueryCache>,
}

impl DataClient {
    pub fn new(api_url: &str) -> Result<Self> {
        let base_url = Url::parse(api_url)
            .map_err(|e| AppError::Config(format!("invalid API_URL {api_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::Config(format!("API_URL {api_url} cannot carry a path")));
        }
        Ok(Self {
            http: reqwest::Client::builder().build()?,
            base_url,
            cache: Arc::new(QueryCache::new()),
        })
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn url_for(&self, resource: &Resource) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::Config(format!("{} cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .extend(resource.segments());
        let query = resource.query();
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        Ok(url)
    }

    /// Cached fetch of `resource` through the proxy, honoring its stale time.
    pub async fn fetch(&self, resource: &Resource) -> Result<Arc<Value>> {
        let key = resource.cache_key();
        self.cache
            .get_or_fetch(&key, resource.stale_time(), || self.fetch_uncached(resource))
            .await
    }

    async fn fetch_uncached(&self, resource: &Resource) -> Result<Value> {
        let url = self.url_for(resource)?;
        let response = self.http.get(url.clone()).header(ACCEPT, "application/json").send().await?;
        let status = response.status();
        debug!(url = %url, status = status.as_u16(), "proxy response");

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let body = serde_json::from_str::<ProxyError>(&text)
                .map(|e| e.message)
                .unwrap_or(text);
            return Err(AppError::Upstream { status: status.as_u16(), body });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn state(&self, resource: &Resource) -> QueryState {
        self.cache.state(&resource.cache_key())
    }

    pub fn invalidate_all(&self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChartPeriod;

    #[test]
    fn proxy_urls_mirror_resource_paths() {
        let client = DataClient::new("http://localhost:3000").unwrap();
        let chart = Resource::coin_chart("bitcoin", ChartPeriod::Month).unwrap();
        assert_eq!(
            client.url_for(&chart).unwrap().as_str(),
            "http://localhost:3000/coins/bitcoin/market_chart?vs_currency=usd&days=30"
        );
        assert_eq!(
            client.url_for(&Resource::Global).unwrap().as_str(),
            "http://localhost:3000/global"
        );
    }

    #[test]
    fn api_url_must_parse() {
        assert!(matches!(DataClient::new("localhost"), Err(AppError::Config(_))));
    }
}
