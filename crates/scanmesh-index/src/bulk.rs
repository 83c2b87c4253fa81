//! Bounded bulk writer: a fixed worker pool drains one queue, batching
//! records before handing them to an [`IndexClient`]. Grounded on
//! `worker/elasticsearch-worker/main.go`'s `jobQueue := make(chan
//! ServiceScanResult, 2000)` fronting 8 goroutines, generalized here to
//! batch rather than submit one record per call (matching
//! `esutil.BulkIndexer`'s count/interval-triggered flush).

use std::sync::Arc;
use std::time::Duration;

use scanmesh_core::Observation;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::client::IndexClient;
use crate::error::Result;

const BATCH_SIZE: usize = 50;
const BATCH_LINGER: Duration = Duration::from_millis(200);

pub struct BulkWriter<Cli> {
    client: Arc<Cli>,
    alias: String,
}

impl<Cli: IndexClient + 'static> BulkWriter<Cli> {
    pub fn new(client: Arc<Cli>, alias: impl Into<String>) -> Self {
        BulkWriter { client, alias: alias.into() }
    }

    /// Spawns `worker_count` tasks draining `job_rx`, each accumulating up
    /// to `BATCH_SIZE` records (or whatever arrives within `BATCH_LINGER`)
    /// before flushing a bulk request. Runs until the queue is closed or
    /// `cancel` fires and the in-flight batch has been flushed.
    pub async fn run(self: Arc<Self>, job_rx: Arc<mpmc::Receiver<Observation>>, worker_count: usize, cancel: CancellationToken) {
        let mut workers = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            let writer = self.clone();
            let job_rx = job_rx.clone();
            let cancel = cancel.clone();
            workers.push(tokio::spawn(async move {
                writer.worker_loop(id, job_rx, cancel).await;
            }));
        }
        for worker in workers {
            let _ = worker.await;
        }
    }

    async fn worker_loop(&self, id: usize, job_rx: Arc<mpmc::Receiver<Observation>>, cancel: CancellationToken) {
        let mut batch = Vec::with_capacity(BATCH_SIZE);
        loop {
            let deadline = tokio::time::sleep(BATCH_LINGER);
            tokio::pin!(deadline);

            tokio::select! {
                _ = cancel.cancelled() => {
                    self.flush(id, &mut batch).await;
                    break;
                }
                job = job_rx.recv() => match job {
                    Ok(obs) => {
                        batch.push(obs);
                        if batch.len() >= BATCH_SIZE {
                            self.flush(id, &mut batch).await;
                        }
                    }
                    Err(_) => {
                        self.flush(id, &mut batch).await;
                        break;
                    }
                },
                _ = &mut deadline => {
                    self.flush(id, &mut batch).await;
                }
            }
        }
        info!(worker = id, "bulk writer worker drained");
    }

    async fn flush(&self, id: usize, batch: &mut Vec<Observation>) {
        if batch.is_empty() {
            return;
        }
        let docs = std::mem::take(batch);
        match self.client.bulk_index(&self.alias, &docs).await {
            Ok(outcome) => {
                if !outcome.item_errors.is_empty() {
                    warn!(worker = id, count = outcome.item_errors.len(), "bulk index reported per-item errors");
                }
            }
            Err(e) => error!(worker = id, error = %e, batch_size = docs.len(), "bulk index request failed"),
        }
    }
}

pub type Submit = mpmc::Sender<Observation>;

pub fn queue(capacity: usize) -> (mpmc::Sender<Observation>, mpmc::Receiver<Observation>) {
    mpmc::channel(capacity)
}

pub mod mpmc {
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

    #[derive(Clone)]
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

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as SyncMutex;
    use scanmesh_core::Protocol;
    use std::net::Ipv4Addr;

    struct RecordingClient {
        batches: SyncMutex<Vec<usize>>,
    }

    impl IndexClient for RecordingClient {
        async fn bulk_index(&self, _alias: &str, docs: &[Observation]) -> Result<crate::client::BulkOutcome> {
            self.batches.lock().push(docs.len());
            Ok(crate::client::BulkOutcome { indexed: docs.len(), item_errors: Vec::new() })
        }
    }

    #[tokio::test]
    async fn flushes_on_linger_when_batch_below_threshold() {
        let client = Arc::new(RecordingClient { batches: SyncMutex::new(Vec::new()) });
        let writer = Arc::new(BulkWriter::new(client.clone(), "scans-000001"));
        let (tx, rx) = queue(8);
        let rx = Arc::new(rx);

        tx.send(Observation::new(uuid::Uuid::new_v4(), Ipv4Addr::new(1, 2, 3, 4), 80, Protocol::Http, 0))
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let cancel_for_run = cancel.clone();
        let handle = tokio::spawn(async move {
            writer.run(rx, 1, cancel_for_run).await;
        });

        tokio::time::sleep(Duration::from_millis(300)).await;
        cancel.cancel();
        let _ = handle.await;

        assert_eq!(client.batches.lock().iter().sum::<usize>(), 1);
    }
}
