//! Orchestrator ingress: `POST /scan`, `GET /health`.

use std::sync::Arc;

use anyhow::Result;
use axum::routing::{get, post};
use axum::Router;
use scanmesh_api::{get_health, post_scan, OrchestratorState};
use scanmesh_core::bus::InMemoryProducer;
use scanmesh_core::{config, InMemoryTopic};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::new(config::log_filter())).init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let bind = format!("0.0.0.0:{port}");
    let queue_capacity = config::StageConfig::from_env()?.queue_capacity;
    config::require_bus_broker()?;

    // `scan.request`'s producer side lives here; see DESIGN.md for why the
    // consumer side (the scanner worker) isn't wired to it across process
    // boundaries yet. `_topic` is kept alive for the process lifetime so the
    // channel doesn't close under the producer.
    let _topic: InMemoryTopic<scanmesh_core::ScanRequest> = InMemoryTopic::new(queue_capacity);
    let producer: InMemoryProducer<scanmesh_core::ScanRequest> = _topic.producer();

    let health = Arc::new(scanmesh_api::HealthProbes {
        elastic_url: std::env::var("ELASTIC_URL").ok(),
        bus_health_url: std::env::var("BUS_HEALTH_URL").ok(),
        k8s_metrics_api: std::env::var("K8S_METRICS_API").ok(),
    });
    let state = OrchestratorState { producer: Arc::new(producer), health };

    let app = Router::new()
        .route("/scan", post(post_scan::<InMemoryProducer<scanmesh_core::ScanRequest>>))
        .route("/health", get(get_health::<InMemoryProducer<scanmesh_core::ScanRequest>>))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http());

    info!(%bind, "orchestrator listening");
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
