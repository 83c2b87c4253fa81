//! Banner Grabber worker process.

use anyhow::Result;
use scanmesh_core::{config, InMemoryTopic};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::new(config::log_filter())).init();
    let cfg = config::StageConfig::from_env()?;
    config::require_bus_broker()?;

    let mut ports_topic: InMemoryTopic<scanmesh_core::HostOpenPorts> = InMemoryTopic::new(cfg.queue_capacity);
    let consumer = ports_topic.consumer();
    let mut observation_topic: InMemoryTopic<scanmesh_core::Observation> = InMemoryTopic::new(cfg.queue_capacity);
    let producer = observation_topic.producer();

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown.cancel();
    });

    info!("banner worker starting");
    if let Err(e) = scanmesh_banner::stage::run(consumer, producer, cfg.worker_count, cfg.queue_capacity, cancel).await {
        error!(error = %e, "banner worker exited with error");
        std::process::exit(1);
    }
    Ok(())
}
