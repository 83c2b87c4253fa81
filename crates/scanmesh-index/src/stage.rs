//! Indexer stage loop.
//!
//! Consumes `observation.enriched` and forwards each record into the
//! [`BulkWriter`]'s queue. The consumer "commits" (advances past a polled
//! record) as soon as the record is handed to the bulk writer's queue, not
//! once the index acknowledges it — durability is the bulk writer's job,
//! matching §9's at-least-once design note.

use std::sync::Arc;
use std::time::Duration;

use scanmesh_core::{BusConsumer, Observation};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bulk::{self, BulkWriter};
use crate::client::IndexClient;
use crate::error::Result;

pub async fn run<C, Cli>(
    mut consumer: C,
    writer: Arc<BulkWriter<Cli>>,
    worker_count: usize,
    queue_capacity: usize,
    cancel: CancellationToken,
) -> Result<()>
where
    C: BusConsumer<Observation> + Send + 'static,
    Cli: IndexClient + 'static,
{
    let (job_tx, job_rx) = bulk::queue(queue_capacity);
    let job_rx = Arc::new(job_rx);

    let writer_cancel = cancel.clone();
    let writer_handle = tokio::spawn({
        let writer = writer.clone();
        async move { writer.run(job_rx, worker_count, writer_cancel).await }
    });

    info!(worker_count, queue_capacity, "indexer stage started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("indexer stage cancelled, draining bulk writer");
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
                        info!("observation.enriched topic exhausted");
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
    let _ = writer_handle.await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::BulkOutcome;
    use parking_lot::Mutex as SyncMutex;
    use scanmesh_core::{InMemoryTopic, Protocol};
    use std::net::Ipv4Addr;

    struct RecordingClient {
        seen: SyncMutex<usize>,
    }

    impl IndexClient for RecordingClient {
        async fn bulk_index(&self, _alias: &str, docs: &[Observation]) -> Result<BulkOutcome> {
            *self.seen.lock() += docs.len();
            Ok(BulkOutcome { indexed: docs.len(), item_errors: Vec::new() })
        }
    }

    #[tokio::test]
    async fn forwards_enriched_observations_to_bulk_writer() {
        let mut topic: InMemoryTopic<Observation> = InMemoryTopic::new(4);
        let producer = topic.producer();
        let consumer = topic.consumer();

        producer
            .publish(Observation::new(uuid::Uuid::new_v4(), Ipv4Addr::new(1, 2, 3, 4), 80, Protocol::Http, 0))
            .await
            .unwrap();
        drop(producer);

        let client = Arc::new(RecordingClient { seen: SyncMutex::new(0) });
        let writer = Arc::new(BulkWriter::new(client.clone(), "scans-000001"));

        let cancel = CancellationToken::new();
        let cancel_for_run = cancel.clone();
        let handle = tokio::spawn(async move {
            run(consumer, writer, 1, 8, cancel_for_run).await.unwrap();
        });

        tokio::time::sleep(Duration::from_millis(400)).await;
        cancel.cancel();
        let _ = handle.await;

        assert_eq!(*client.seen.lock(), 1);
    }
}
