//! Enricher stage loop.
//!
//! Consumes `observation.raw`, attaches `meta.geo`/`meta.asn`/`meta.hostname`
//! behind a reader-biased combined cache (§4.4), and republishes to
//! `observation.enriched`. Uses the same bounded-queue worker-pool shape as
//! the other stages even though a single lookup is cheap, so the consumer
//! loop never blocks on a cold-cache DNS round trip.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use scanmesh_core::cache::{TtlCache, ENRICHMENT_TTL};
use scanmesh_core::{BusConsumer, BusProducer, Observation};
use serde_json::json;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::geoip::{AsnDatabase, GeoDatabase};
use crate::rdns::RdnsResolver;

#[derive(Clone, Default)]
struct CombinedEntry {
    geo: Option<crate::geoip::GeoInfo>,
    asn: Option<crate::geoip::AsnInfo>,
}

/// Holds the lookup backends and caches shared by every worker. Cheap to
/// clone (everything inside is an `Arc`), so each worker task gets its own
/// handle rather than sharing a reference across task boundaries.
#[derive(Clone)]
pub struct Enricher {
    geo_db: Arc<dyn GeoDatabase>,
    asn_db: Option<Arc<dyn AsnDatabase>>,
    rdns: Arc<RdnsResolver>,
    cache: TtlCache<Ipv4Addr, CombinedEntry>,
}

impl Enricher {
    pub fn new(geo_db: Arc<dyn GeoDatabase>, asn_db: Option<Arc<dyn AsnDatabase>>, rdns: Arc<RdnsResolver>) -> Self {
        Enricher {
            geo_db,
            asn_db,
            rdns,
            cache: TtlCache::new(ENRICHMENT_TTL),
        }
    }

    /// Attaches `meta.geo`, `meta.asn`, `meta.hostname` when non-empty. A
    /// cache hit performs zero network syscalls and zero database reads.
    pub async fn enrich(&self, mut obs: Observation) -> Observation {
        let entry = match self.cache.get(&obs.ip) {
            Some(entry) => entry,
            None => {
                let entry = CombinedEntry {
                    geo: self.geo_db.lookup(obs.ip),
                    asn: self.asn_db.as_ref().and_then(|db| db.lookup(obs.ip)),
                };
                self.cache.insert(obs.ip, entry.clone());
                entry
            }
        };

        if let Some(geo) = &entry.geo {
            obs.meta.insert(
                "geo".to_string(),
                json!({
                    "country": geo.country,
                    "city": geo.city,
                    "location": { "lat": geo.lat, "lon": geo.lon },
                }),
            );
        }
        if let Some(asn) = &entry.asn {
            obs.meta.insert(
                "asn".to_string(),
                json!({ "number": asn.number, "org": asn.org }),
            );
        }
        if let Some(hostname) = self.rdns.lookup(obs.ip).await {
            obs.meta.insert("hostname".to_string(), json!(hostname));
        }

        obs
    }
}

pub async fn run<C, P>(
    enricher: Arc<Enricher>,
    mut consumer: C,
    producer: P,
    worker_count: usize,
    queue_capacity: usize,
    cancel: CancellationToken,
) -> crate::error::Result<()>
where
    C: BusConsumer<Observation> + Send + 'static,
    P: BusProducer<Observation> + Clone + Send + Sync + 'static,
{
    let (job_tx, job_rx) = mpmc::channel(queue_capacity);
    let job_rx = Arc::new(job_rx);

    let mut workers = Vec::with_capacity(worker_count);
    for id in 0..worker_count {
        let enricher = enricher.clone();
        let producer = producer.clone();
        let job_rx = job_rx.clone();
        let cancel = cancel.clone();
        workers.push(tokio::spawn(async move {
            worker_loop(id, enricher, job_rx, producer, cancel).await;
        }));
    }

    info!(worker_count, queue_capacity, "enricher stage started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("enricher stage cancelled, draining queue");
                break;
            }
            polled = consumer.poll() => {
                match polled {
                    Ok(Some(obs)) => {
                        if job_tx.send(obs).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        info!("observation.raw topic exhausted");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "bus poll error, backing off");
                        tokio::time::sleep(Duration::from_millis(750)).await;
                    }
                }
            }
        }
    }

    drop(job_tx);
    for worker in workers {
        let _ = worker.await;
    }
    Ok(())
}

async fn worker_loop<P>(
    id: usize,
    enricher: Arc<Enricher>,
    job_rx: Arc<mpmc::Receiver<Observation>>,
    producer: P,
    cancel: CancellationToken,
) where
    P: BusProducer<Observation> + Clone + Send + Sync + 'static,
{
    loop {
        let obs = tokio::select! {
            _ = cancel.cancelled() => break,
            job = job_rx.recv() => match job {
                Ok(obs) => obs,
                Err(_) => break,
            },
        };

        let enriched = enricher.enrich(obs).await;
        if let Err(e) = producer.publish(enriched).await {
            warn!(worker = id, error = %e, "failed to publish observation.enriched");
        }
    }
}

mod mpmc {
    use std::sync::Arc;

    pub struct Receiver<T> {
        inner: Arc<super::Mutex<tokio::sync::mpsc::Receiver<T>>>,
    }

    impl<T> Clone for Receiver<T> {
        fn clone(&self) -> Self {
            Receiver { inner: self.inner.clone() }
        }
    }

    impl<T> Receiver<T> {
        pub async fn recv(&self) -> Result<T, ()> {
            self.inner.lock().await.recv().await.ok_or(())
        }
    }

    pub struct Sender<T>(tokio::sync::mpsc::Sender<T>);

    impl<T> Sender<T> {
        pub async fn send(&self, value: T) -> Result<(), ()> {
            self.0.send(value).await.map_err(|_| ())
        }
    }

    pub fn channel<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
        let (tx, rx) = tokio::sync::mpsc::channel(capacity);
        (Sender(tx), Receiver { inner: Arc::new(super::Mutex::new(rx)) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geoip::{AsnInfo, GeoInfo};
    use scanmesh_core::{InMemoryTopic, Protocol};

    struct StubGeo;
    impl GeoDatabase for StubGeo {
        fn lookup(&self, _ip: Ipv4Addr) -> Option<GeoInfo> {
            Some(GeoInfo {
                country: Some("US".to_string()),
                city: Some("Mountain View".to_string()),
                lat: Some(37.4),
                lon: Some(-122.0),
            })
        }
    }

    struct StubAsn;
    impl AsnDatabase for StubAsn {
        fn lookup(&self, _ip: Ipv4Addr) -> Option<AsnInfo> {
            Some(AsnInfo { number: Some(15169), org: Some("Google LLC".to_string()) })
        }
    }

    fn test_enricher() -> Enricher {
        let rdns = RdnsResolver::new().unwrap();
        Enricher::new(Arc::new(StubGeo), Some(Arc::new(StubAsn)), Arc::new(rdns))
    }

    #[tokio::test]
    async fn enrich_sets_geo_and_asn_meta() {
        let enricher = test_enricher();
        let obs = Observation::new(uuid::Uuid::new_v4(), Ipv4Addr::new(8, 8, 8, 8), 53, Protocol::Tcp, 0);
        let enriched = enricher.enrich(obs).await;
        assert_eq!(enriched.meta["geo"]["country"], "US");
        assert_eq!(enriched.meta["asn"]["number"], 15169);
    }

    #[tokio::test]
    async fn second_enrichment_within_ttl_reuses_cache() {
        let enricher = test_enricher();
        let ip = Ipv4Addr::new(8, 8, 8, 8);
        let first = Observation::new(uuid::Uuid::new_v4(), ip, 53, Protocol::Tcp, 0);
        enricher.enrich(first).await;
        assert_eq!(enricher.cache.len(), 1);

        let second = Observation::new(uuid::Uuid::new_v4(), ip, 80, Protocol::Tcp, 0);
        enricher.enrich(second).await;
        assert_eq!(enricher.cache.len(), 1);
    }

    #[tokio::test]
    async fn stage_run_enriches_one_observation() {
        let mut raw_topic: InMemoryTopic<Observation> = InMemoryTopic::new(4);
        let raw_producer = raw_topic.producer();
        let raw_consumer = raw_topic.consumer();

        let mut enriched_topic: InMemoryTopic<Observation> = InMemoryTopic::new(4);
        let enriched_producer = enriched_topic.producer();
        let mut enriched_consumer = enriched_topic.consumer();

        let scan_id = uuid::Uuid::new_v4();
        raw_producer
            .publish(Observation::new(scan_id, Ipv4Addr::new(8, 8, 8, 8), 53, Protocol::Tcp, 0))
            .await
            .unwrap();
        drop(raw_producer);

        let cancel = CancellationToken::new();
        let cancel_for_run = cancel.clone();
        let enricher = Arc::new(test_enricher());
        let handle = tokio::spawn(async move {
            run(enricher, raw_consumer, enriched_producer, 2, 8, cancel_for_run).await.unwrap();
        });

        let record = tokio::time::timeout(Duration::from_secs(5), enriched_consumer.poll())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(record.scan_id, scan_id);
        assert!(record.meta.contains_key("geo"));

        cancel.cancel();
        let _ = handle.await;
    }
}
