use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use coin_dashboard::api::routes::{router, ApiState};
use coin_dashboard::config::Config;
use coin_dashboard::error::Result;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    if !cfg.has_api_key() {
        warn!("COINGECKO_API_KEY not set, upstream requests go out unauthenticated and may be rate limited");
    }

    let state = ApiState::new(&cfg)?;
    info!(upstream = %state.upstream.base_url(), "Upstream client ready");

    let app = router(state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
