//! Port Scanner worker process.

use std::sync::Arc;

use anyhow::Result;
use scanmesh_core::{config, InMemoryTopic};
use scanmesh_scanner::ConnectScanEngine;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::new(config::log_filter())).init();
    let cfg = config::StageConfig::from_env()?;
    config::require_bus_broker()?;

    // See DESIGN.md: this worker owns both ends of its topics until a real
    // cross-process bus client is wired in behind BusProducer/BusConsumer.
    let mut request_topic: InMemoryTopic<scanmesh_core::ScanRequest> = InMemoryTopic::new(cfg.queue_capacity);
    let consumer = request_topic.consumer();
    let mut result_topic: InMemoryTopic<scanmesh_core::HostOpenPorts> = InMemoryTopic::new(cfg.queue_capacity);
    let producer = result_topic.producer();

    let engine = Arc::new(ConnectScanEngine::default());
    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown.cancel();
    });

    info!("scanner worker starting");
    if let Err(e) = scanmesh_scanner::stage::run(engine, consumer, producer, cfg.worker_count, cfg.queue_capacity, cancel).await {
        error!(error = %e, "scanner worker exited with error");
        std::process::exit(1);
    }
    Ok(())
}
