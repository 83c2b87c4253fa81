//! Enricher worker process.

use std::sync::Arc;

use anyhow::{Context, Result};
use scanmesh_core::{config, InMemoryTopic};
use scanmesh_enrich::{Enricher, MaxmindAsnDatabase, MaxmindGeoDatabase, RdnsResolver};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::new(config::log_filter())).init();
    let cfg = config::StageConfig::from_env()?;
    config::require_bus_broker()?;

    let city_db_path = config::require_env("MAXMIND_CITY_DB").context("enricher requires a City database at startup")?;
    let geo_db = Arc::new(MaxmindGeoDatabase::open(&city_db_path)?);
    let asn_db = match std::env::var("MAXMIND_ASN_DB") {
        Ok(path) => Some(Arc::new(MaxmindAsnDatabase::open(&path)?) as Arc<dyn scanmesh_enrich::AsnDatabase>),
        Err(_) => None,
    };
    let rdns = Arc::new(RdnsResolver::new()?);
    let enricher = Arc::new(Enricher::new(geo_db, asn_db, rdns));

    let mut raw_topic: InMemoryTopic<scanmesh_core::Observation> = InMemoryTopic::new(cfg.queue_capacity);
    let consumer = raw_topic.consumer();
    let mut enriched_topic: InMemoryTopic<scanmesh_core::Observation> = InMemoryTopic::new(cfg.queue_capacity);
    let producer = enriched_topic.producer();

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown.cancel();
    });

    info!("enrich worker starting");
    if let Err(e) = scanmesh_enrich::stage::run(enricher, consumer, producer, cfg.worker_count, cfg.queue_capacity, cancel).await {
        error!(error = %e, "enrich worker exited with error");
        std::process::exit(1);
    }
    Ok(())
}
