use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, warn};

use crate::api::health::{HealthResponse, ProxyStats};
use crate::api::latency::{LatencySnapshot, LatencyStats};
use crate::config::{defaults, Config};
use crate::error::{ApiError, AppError, Result};
use crate::resource::{validate_coin_id, ChartParams, CoinDetailParams, CoinListParams, Resource};
use crate::upstream::UpstreamClient;

#[derive(Clone)]
pub struct ApiState {
    pub upstream: Arc<UpstreamClient>,
    pub stats: Arc<ProxyStats>,
    pub latency: Arc<LatencyStats>,
}

impl ApiState {
    pub fn new(cfg: &Config) -> Result<Self> {
        let latency = Arc::new(LatencyStats::new());
        let upstream = UpstreamClient::new(cfg, Arc::clone(&latency))?;
        Ok(Self {
            upstream: Arc::new(upstream),
            stats: Arc::new(ProxyStats::new()),
            latency,
        })
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/global", get(get_global))
        .route("/coins/markets", get(get_coin_markets))
        .route("/coins/", get(get_missing_coin))
        .route("/coins/:id", get(get_coin))
        .route("/coins/:id/market_chart", get(get_coin_chart))
        .route("/health", get(get_health))
        .route("/stats/latency", get(get_stats_latency))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct CoinListQuery {
    pub vs_currency: Option<String>,
    pub order: Option<String>,
    pub per_page: Option<u32>,
    pub page: Option<u32>,
    pub sparkline: Option<bool>,
}

impl CoinListQuery {
    fn into_params(self) -> CoinListParams {
        let d = CoinListParams::default();
        CoinListParams {
            vs_currency: non_blank(self.vs_currency).unwrap_or(d.vs_currency),
            order: non_blank(self.order).unwrap_or(d.order),
            per_page: self.per_page.unwrap_or(d.per_page),
            page: self.page.unwrap_or(d.page),
            sparkline: self.sparkline.unwrap_or(d.sparkline),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CoinDetailQuery {
    pub localization: Option<bool>,
    pub tickers: Option<bool>,
    pub market_data: Option<bool>,
    pub community_data: Option<bool>,
    pub developer_data: Option<bool>,
    pub sparkline: Option<bool>,
}

impl CoinDetailQuery {
    fn into_params(self) -> CoinDetailParams {
        let d = CoinDetailParams::default();
        CoinDetailParams {
            localization: self.localization.unwrap_or(d.localization),
            tickers: self.tickers.unwrap_or(d.tickers),
            market_data: self.market_data.unwrap_or(d.market_data),
            community_data: self.community_data.unwrap_or(d.community_data),
            developer_data: self.developer_data.unwrap_or(d.developer_data),
            sparkline: self.sparkline.unwrap_or(d.sparkline),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ChartQuery {
    pub vs_currency: Option<String>,
    pub days: Option<String>,
    pub interval: Option<String>,
}

impl ChartQuery {
    fn into_params(self) -> ChartParams {
        ChartParams {
            vs_currency: non_blank(self.vs_currency)
                .unwrap_or_else(|| defaults::VS_CURRENCY.to_string()),
            days: non_blank(self.days).unwrap_or_else(|| defaults::CHART_DAYS.to_string()),
            interval: non_blank(self.interval),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn invalid_query(rejection: QueryRejection) -> AppError {
    AppError::Validation(rejection.body_text())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_global(State(state): State<ApiState>) -> std::result::Result<Json<Value>, ApiError> {
    proxy(&state, Ok(Resource::Global)).await
}

async fn get_coin_markets(
    State(state): State<ApiState>,
    query: std::result::Result<Query<CoinListQuery>, QueryRejection>,
) -> std::result::Result<Json<Value>, ApiError> {
    let resource = query
        .map(|Query(q)| Resource::CoinList(q.into_params()))
        .map_err(invalid_query);
    proxy(&state, resource).await
}

async fn get_missing_coin(State(state): State<ApiState>) -> std::result::Result<Json<Value>, ApiError> {
    proxy(&state, coin_detail("", Ok(Query(CoinDetailQuery::default())))).await
}

async fn get_coin(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    query: std::result::Result<Query<CoinDetailQuery>, QueryRejection>,
) -> std::result::Result<Json<Value>, ApiError> {
    proxy(&state, coin_detail(&id, query)).await
}

async fn get_coin_chart(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    query: std::result::Result<Query<ChartQuery>, QueryRejection>,
) -> std::result::Result<Json<Value>, ApiError> {
    proxy(&state, coin_chart(&id, query)).await
}

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        has_api_key: state.upstream.has_api_key(),
        upstream_url: state.upstream.base_url().to_string(),
        requests_total: state.stats.requests_total(),
        upstream_failures: state.stats.upstream_failures(),
        validation_failures: state.stats.validation_failures(),
        last_upstream_status: state.stats.last_upstream_status(),
    })
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencySnapshot> {
    Json(state.latency.snapshot())
}

// The id is checked before the query so a blank id always reports
// "Coin ID is required".
fn coin_detail(
    id: &str,
    query: std::result::Result<Query<CoinDetailQuery>, QueryRejection>,
) -> Result<Resource> {
    let id = validate_coin_id(id)?;
    let Query(q) = query.map_err(invalid_query)?;
    Ok(Resource::CoinDetail { id: id.to_string(), params: q.into_params() })
}

fn coin_chart(id: &str, query: std::result::Result<Query<ChartQuery>, QueryRejection>) -> Result<Resource> {
    let id = validate_coin_id(id)?;
    let Query(q) = query.map_err(invalid_query)?;
    Ok(Resource::CoinChart { id: id.to_string(), params: q.into_params() })
}

/// One upstream call per accepted request. Rejected requests never reach the
/// upstream; failures are logged here and relayed as 500s with the resource's
/// failure message.
async fn proxy(state: &ApiState, resource: Result<Resource>) -> std::result::Result<Json<Value>, ApiError> {
    state.stats.inc_requests();

    let resource = match resource {
        Ok(r) => r,
        Err(e) => {
            state.stats.inc_validation_failures();
            warn!(error = %e, "request rejected");
            return Err(ApiError::from_failure("Invalid request", e));
        }
    };

    match state.upstream.fetch_resource(&resource).await {
        Ok(body) => {
            state.stats.set_last_upstream_status(200);
            Ok(Json(body))
        }
        Err(e) => {
            state.stats.inc_upstream_failures();
            if let Some(status) = e.upstream_status() {
                state.stats.set_last_upstream_status(status);
            }
            error!(
                resource = resource.name(),
                status = ?e.upstream_status(),
                error = %e,
                "{}",
                resource.failure_message()
            );
            Err(ApiError::from_failure(resource.failure_message(), e))
        }
    }
}
