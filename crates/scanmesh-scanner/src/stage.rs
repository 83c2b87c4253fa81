//! Port Scanner stage loop.
//!
//! One consumer loop polls `scan.request`; decoded requests are pushed onto
//! a bounded in-memory queue (capacity from [`scanmesh_core::StageConfig`])
//! served by a fixed worker pool, so the consumer loop never blocks on scan
//! I/O (§4.2, §5). Each worker runs the scan engine against its request's
//! subnet under a 10-minute deadline and emits one `host.openports` record
//! per host with at least one open port.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ipnetwork::Ipv4Network;
use scanmesh_core::{BusConsumer, BusProducer, HostOpenPorts, ScanRequest};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::engine::{HostResult, ScanEngine};
use crate::error::Result;

const PER_REQUEST_DEADLINE: Duration = Duration::from_secs(600);

/// Drives the Port Scanner stage: polls `consumer`, fans requests out to
/// `worker_count` workers each running `engine`, and publishes results via
/// `producer`. Runs until `cancel` fires, at which point the consumer loop
/// stops polling and outstanding workers are allowed to drain.
pub async fn run<E, C, P>(
    engine: Arc<E>,
    mut consumer: C,
    producer: P,
    worker_count: usize,
    queue_capacity: usize,
    cancel: CancellationToken,
) -> Result<()>
where
    E: ScanEngine + 'static,
    C: BusConsumer<ScanRequest> + Send + 'static,
    P: BusProducer<HostOpenPorts> + Clone + Send + Sync + 'static,
{
    let (job_tx, job_rx) = mpmc::channel(queue_capacity);
    let job_rx = Arc::new(job_rx);

    let mut workers = Vec::with_capacity(worker_count);
    for id in 0..worker_count {
        let engine = engine.clone();
        let producer = producer.clone();
        let job_rx = job_rx.clone();
        let cancel = cancel.clone();
        workers.push(tokio::spawn(async move {
            worker_loop(id, engine, job_rx, producer, cancel).await;
        }));
    }

    info!(worker_count, queue_capacity, "port scanner stage started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("port scanner stage cancelled, draining queue");
                break;
            }
            polled = consumer.poll() => {
                match polled {
                    Ok(Some(request)) => {
                        if job_tx.send(request).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        info!("scan.request topic exhausted");
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

async fn worker_loop<E, P>(
    id: usize,
    engine: Arc<E>,
    job_rx: Arc<mpmc::Receiver<ScanRequest>>,
    producer: P,
    cancel: CancellationToken,
) where
    E: ScanEngine + 'static,
    P: BusProducer<HostOpenPorts> + Clone + Send + Sync + 'static,
{
    loop {
        let request = tokio::select! {
            _ = cancel.cancelled() => break,
            job = job_rx.recv() => match job {
                Ok(req) => req,
                Err(_) => break,
            },
        };

        if let Err(e) = process_request(&*engine, &request, &producer).await {
            error!(worker = id, scan_id = %request.scan_id, error = %e, "scan.request failed");
        }
    }
}

async fn process_request<E, P>(engine: &E, request: &ScanRequest, producer: &P) -> Result<()>
where
    E: ScanEngine,
    P: BusProducer<HostOpenPorts> + Clone + Send + Sync + 'static,
{
    let subnet: Ipv4Network = request
        .ip_range
        .parse()
        .map_err(|e: ipnetwork::IpNetworkError| scanmesh_core::Error::InvalidCidr(e.to_string()))?;
    let ports: Vec<u16> = request
        .ports
        .split(',')
        .filter_map(|p| p.trim().parse::<u16>().ok())
        .collect();

    let (tx, mut rx) = mpsc::channel::<HostResult>(256);
    let scan_id = request.scan_id;
    let producer_task = {
        let producer = producer_clone_handle(producer);
        tokio::spawn(async move { forward_results(scan_id, &mut rx, producer).await })
    };

    let scan = engine.scan_subnet(subnet, ports, tx);
    match tokio::time::timeout(PER_REQUEST_DEADLINE, scan).await {
        Ok(inner) => inner?,
        Err(_) => return Err(crate::error::Error::DeadlineExceeded),
    }

    let _ = producer_task.await;
    Ok(())
}

/// Emits one `host.openports` record per host as its results arrive.
async fn forward_results<P>(scan_id: scanmesh_core::types::ScanId, rx: &mut mpsc::Receiver<HostResult>, producer: P)
where
    P: BusProducer<HostOpenPorts>,
{
    while let Some(HostResult { host, open_ports }) = rx.recv().await {
        if open_ports.is_empty() {
            continue;
        }
        let record = HostOpenPorts {
            scan_id,
            host,
            ports: open_ports
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(","),
            timestamp: now_unix(),
        };
        if let Err(e) = producer.publish(record).await {
            warn!(error = %e, %host, "failed to publish host.openports");
        }
    }
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

// `scanmesh-core` ships an mpsc-based in-process bus topic, but the stage's
// internal work queue is better served by a true bounded MPMC channel
// (multiple workers draining one queue); `async-channel` is not in the
// dependency graph, so we build the minimal equivalent directly on
// `tokio::sync::mpsc` wrapped behind a cloneable receiver.
mod mpmc {
    use std::sync::Arc;
    use tokio::sync::Mutex;

    pub struct Receiver<T> {
        inner: Arc<Mutex<tokio::sync::mpsc::Receiver<T>>>,
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
        (Sender(tx), Receiver { inner: Arc::new(Mutex::new(rx)) })
    }
}

fn producer_clone_handle<P: BusProducer<HostOpenPorts> + Clone>(producer: &P) -> P {
    producer.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanmesh_core::InMemoryTopic;

    struct EchoEngine;

    impl ScanEngine for EchoEngine {
        async fn scan_subnet(
            &self,
            _subnet: Ipv4Network,
            ports: Vec<u16>,
            on_result: mpsc::Sender<HostResult>,
        ) -> Result<()> {
            let _ = on_result
                .send(HostResult {
                    host: Ipv4Addr::new(10, 0, 0, 1),
                    open_ports: ports,
                })
                .await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn processes_one_request_and_emits_host_openports() {
        let mut request_topic: InMemoryTopic<ScanRequest> = InMemoryTopic::new(4);
        let request_producer = request_topic.producer();
        let request_consumer = request_topic.consumer();

        let mut result_topic: InMemoryTopic<HostOpenPorts> = InMemoryTopic::new(4);
        let result_producer = result_topic.producer();
        let mut result_consumer = result_topic.consumer();

        let scan_id = uuid::Uuid::new_v4();
        request_producer
            .publish(ScanRequest {
                scan_id,
                ip_range: "10.0.0.0/30".to_string(),
                ports: "80,443".to_string(),
            })
            .await
            .unwrap();
        drop(request_producer);

        let cancel = CancellationToken::new();
        let engine = Arc::new(EchoEngine);
        let cancel_for_run = cancel.clone();
        let handle = tokio::spawn(async move {
            run(engine, request_consumer, result_producer, 2, 8, cancel_for_run)
                .await
                .unwrap();
        });

        let record = tokio::time::timeout(Duration::from_secs(2), result_consumer.poll())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(record.scan_id, scan_id);
        assert_eq!(record.ports, "80,443");

        cancel.cancel();
        let _ = handle.await;
    }
}
