//! Bus abstraction.
//!
//! The message bus itself is out of scope (the production deployment plugs
//! in a real Kafka-compatible client): this module only fixes the contract
//! point each stage programs against, plus a bounded, at-least-once,
//! in-process implementation suitable for running the whole pipeline in one
//! process or under test. Modeled after the decoupled publish/subscribe
//! shape of an in-process event bus, generalized to typed topics with
//! bounded-channel backpressure instead of broadcast fan-out.

use tokio::sync::mpsc;

use crate::error::{Error, Result};

/// Owned by exactly one stage process per topic (§3 "ownership" rule).
/// Thread-safe and cloneable so every worker in a stage's pool can publish
/// independently.
pub trait BusProducer<T: Send + 'static>: Send + Sync {
    fn publish(&self, record: T) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// The consumer side of a topic. A stage's single consumer loop polls this
/// and pushes decoded records onto its bounded in-memory worker queue.
pub trait BusConsumer<T: Send + 'static>: Send {
    /// Returns `Ok(None)` when the producer side has been dropped and the
    /// topic is exhausted (used by tests and graceful shutdown draining).
    fn poll(&mut self) -> impl std::future::Future<Output = Result<Option<T>>> + Send;
}

/// A single bounded, in-process topic. Backed by a `tokio::sync::mpsc`
/// channel: `capacity` bounds the backlog exactly as the bus commit cadence
/// bounds backlog in a real deployment (§4.2's "natural backpressure").
pub struct InMemoryTopic<T> {
    tx: mpsc::Sender<T>,
    rx: Option<mpsc::Receiver<T>>,
}

impl<T: Send + 'static> InMemoryTopic<T> {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        InMemoryTopic { tx, rx: Some(rx) }
    }

    /// Clonable producer handle; call as many times as there are publishing
    /// workers.
    pub fn producer(&self) -> InMemoryProducer<T> {
        InMemoryProducer { tx: self.tx.clone() }
    }

    /// Takes the single consumer side. Panics if called twice — a topic has
    /// exactly one consumer loop per §3.
    pub fn consumer(&mut self) -> InMemoryConsumer<T> {
        let rx = self
            .rx
            .take()
            .expect("InMemoryTopic::consumer() called more than once");
        InMemoryConsumer { rx }
    }
}

#[derive(Clone)]
pub struct InMemoryProducer<T> {
    tx: mpsc::Sender<T>,
}

impl<T: Send + 'static> BusProducer<T> for InMemoryProducer<T> {
    async fn publish(&self, record: T) -> Result<()> {
        self.tx
            .send(record)
            .await
            .map_err(|_| Error::Bus("topic consumer dropped".to_string()))
    }
}

pub struct InMemoryConsumer<T> {
    rx: mpsc::Receiver<T>,
}

impl<T: Send + 'static> BusConsumer<T> for InMemoryConsumer<T> {
    async fn poll(&mut self) -> Result<Option<T>> {
        Ok(self.rx.recv().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_then_poll_round_trips() {
        let mut topic: InMemoryTopic<u32> = InMemoryTopic::new(4);
        let producer = topic.producer();
        let mut consumer = topic.consumer();

        producer.publish(42).await.unwrap();
        assert_eq!(consumer.poll().await.unwrap(), Some(42));
    }

    #[tokio::test]
    async fn poll_returns_none_after_producers_dropped() {
        let mut topic: InMemoryTopic<u32> = InMemoryTopic::new(4);
        let mut consumer = topic.consumer();
        drop(topic);

        assert_eq!(consumer.poll().await.unwrap(), None);
    }

    #[tokio::test]
    async fn bounded_capacity_backpressures_publishers() {
        let mut topic: InMemoryTopic<u32> = InMemoryTopic::new(1);
        let producer = topic.producer();
        let mut consumer = topic.consumer();

        producer.publish(1).await.unwrap();
        // Second publish would block on a full channel of capacity 1;
        // draining first keeps this test deterministic and fast.
        assert_eq!(consumer.poll().await.unwrap(), Some(1));
        producer.publish(2).await.unwrap();
        assert_eq!(consumer.poll().await.unwrap(), Some(2));
    }

    #[test]
    #[should_panic(expected = "called more than once")]
    fn consumer_can_only_be_taken_once() {
        let mut topic: InMemoryTopic<u32> = InMemoryTopic::new(4);
        let _c1 = topic.consumer();
        let _c2 = topic.consumer();
    }
}
