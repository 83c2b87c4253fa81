//! Banner Grabber stage loop.
//!
//! Consumes `host.openports`, splits each record's port list into individual
//! `(host, port)` jobs (§4.3), and runs them through a bounded worker pool
//! backed by [`dispatcher::dispatch`]. One `observation.raw` record is
//! published per job, even when the probe fails — the failure is recorded in
//! `meta.error` rather than dropping the job silently.

use std::sync::Arc;
use std::time::Duration;

use scanmesh_core::{BusConsumer, BusProducer, HostOpenPorts, Observation};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::Result;

#[derive(Debug, Clone, Copy)]
struct Job {
    scan_id: scanmesh_core::types::ScanId,
    host: std::net::Ipv4Addr,
    port: u16,
    timestamp: i64,
}

pub async fn run<C, P>(
    mut consumer: C,
    producer: P,
    worker_count: usize,
    queue_capacity: usize,
    cancel: CancellationToken,
) -> Result<()>
where
    C: BusConsumer<HostOpenPorts> + Send + 'static,
    P: BusProducer<Observation> + Clone + Send + Sync + 'static,
{
    let (job_tx, job_rx) = mpmc::channel(queue_capacity);
    let job_rx = Arc::new(job_rx);

    let mut workers = Vec::with_capacity(worker_count);
    for id in 0..worker_count {
        let producer = producer.clone();
        let job_rx = job_rx.clone();
        let cancel = cancel.clone();
        workers.push(tokio::spawn(async move {
            worker_loop(id, job_rx, producer, cancel).await;
        }));
    }

    info!(worker_count, queue_capacity, "banner grabber stage started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("banner grabber stage cancelled, draining queue");
                break;
            }
            polled = consumer.poll() => {
                match polled {
                    Ok(Some(record)) => {
                        for port in record.port_list() {
                            let job = Job {
                                scan_id: record.scan_id,
                                host: record.host,
                                port,
                                timestamp: record.timestamp,
                            };
                            if job_tx.send(job).await.is_err() {
                                break;
                            }
                        }
                    }
                    Ok(None) => {
                        info!("host.openports topic exhausted");
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

async fn worker_loop<P>(id: usize, job_rx: Arc<mpmc::Receiver<Job>>, producer: P, cancel: CancellationToken)
where
    P: BusProducer<Observation> + Clone + Send + Sync + 'static,
{
    loop {
        let job = tokio::select! {
            _ = cancel.cancelled() => break,
            job = job_rx.recv() => match job {
                Ok(job) => job,
                Err(_) => break,
            },
        };

        let observation = crate::dispatcher::dispatch(job.scan_id, job.host, job.port, job.timestamp).await;
        if let Err(e) = producer.publish(observation).await {
            error!(worker = id, host = %job.host, port = job.port, error = %e, "failed to publish observation.raw");
        }
    }
}

// Same internal bounded MPMC queue shape as the Port Scanner stage: several
// workers drain one queue, which `InMemoryTopic` (single-consumer) doesn't
// give us.
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
