//! Indexer worker process.

use std::sync::Arc;

use anyhow::Result;
use scanmesh_core::{config, InMemoryTopic};
use scanmesh_index::{BulkWriter, ElasticClient};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::new(config::log_filter())).init();
    let cfg = config::StageConfig::from_env()?;
    config::require_bus_broker()?;

    let elastic_url = config::require_env("ELASTIC_URL")?;
    let alias = std::env::var("ELASTIC_ALIAS").unwrap_or_else(|_| "scans-000001".to_string());
    let client = Arc::new(ElasticClient::new(elastic_url));
    let writer = Arc::new(BulkWriter::new(client, alias));

    let mut enriched_topic: InMemoryTopic<scanmesh_core::Observation> = InMemoryTopic::new(cfg.queue_capacity);
    let consumer = enriched_topic.consumer();

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown.cancel();
    });

    info!("indexer worker starting");
    if let Err(e) = scanmesh_index::stage::run(consumer, writer, cfg.worker_count, cfg.queue_capacity, cancel).await {
        error!(error = %e, "indexer worker exited with error");
        std::process::exit(1);
    }
    Ok(())
}
