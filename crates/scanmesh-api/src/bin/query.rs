//! Query Service: `GET /scans`.

use std::sync::Arc;

use anyhow::Result;
use axum::routing::get;
use axum::Router;
use scanmesh_api::{get_scans, ElasticSearcher, QueryState};
use scanmesh_core::config;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::new(config::log_filter())).init();

    let bind = std::env::var("QUERY_BIND").unwrap_or_else(|_| "0.0.0.0:8081".to_string());
    let elastic_url = config::require_env("ELASTIC_URL")?;
    let alias = std::env::var("ELASTIC_ALIAS").unwrap_or_else(|_| "scans-000001".to_string());

    let searcher = Arc::new(ElasticSearcher::new(elastic_url, alias));
    let state = QueryState { searcher };

    let app = Router::new()
        .route("/scans", get(get_scans::<ElasticSearcher>))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http());

    info!(%bind, "query service listening");
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
