//! Message bus trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::ChannelError;
use crate::topic::Topic;

/// Default per-topic queue capacity; publishers block when a consumer
/// falls this far behind.
const TOPIC_CAPACITY: usize = 256;

/// A keyed message as carried on a topic.
///
/// The key is the wire form of the correlation key; per-key ordering is
/// preserved within a topic.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub key: String,
    pub payload: Vec<u8>,
}

impl Envelope {
    /// Creates an envelope from a key and an encoded payload.
    pub fn new(key: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            payload,
        }
    }
}

/// Abstraction over the message broker carrying the three command streams.
///
/// Implementations guarantee at-least-once delivery, per-key ordering
/// within a topic, and at most one consumer group per topic. No ordering
/// holds across topics.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publishes one message to a topic, waiting for queue capacity.
    async fn publish(&self, topic: Topic, envelope: Envelope) -> Result<(), ChannelError>;

    /// Takes the single consumer end of a topic.
    ///
    /// Fails if the topic already has a consumer.
    fn subscribe(&self, topic: Topic) -> Result<mpsc::Receiver<Envelope>, ChannelError>;
}

struct TopicSlot {
    tx: mpsc::Sender<Envelope>,
    rx: Mutex<Option<mpsc::Receiver<Envelope>>>,
}

/// In-memory bus backed by one bounded mpsc queue per topic.
///
/// A single FIFO queue per topic trivially preserves per-key ordering and
/// provides backpressure through the bounded capacity. Used for tests and
/// single-process deployments.
#[derive(Clone)]
pub struct InMemoryBus {
    slots: Arc<HashMap<Topic, TopicSlot>>,
}

impl InMemoryBus {
    /// Creates a bus with the default per-topic capacity.
    pub fn new() -> Self {
        Self::with_capacity(TOPIC_CAPACITY)
    }

    /// Creates a bus with an explicit per-topic capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let slots = Topic::ALL
            .iter()
            .map(|&topic| {
                let (tx, rx) = mpsc::channel(capacity);
                (
                    topic,
                    TopicSlot {
                        tx,
                        rx: Mutex::new(Some(rx)),
                    },
                )
            })
            .collect();
        Self {
            slots: Arc::new(slots),
        }
    }

    fn slot(&self, topic: Topic) -> &TopicSlot {
        // Every Topic variant is seeded in the constructor.
        &self.slots[&topic]
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, topic: Topic, envelope: Envelope) -> Result<(), ChannelError> {
        self.slot(topic)
            .tx
            .send(envelope)
            .await
            .map_err(|_| ChannelError::TopicClosed(topic))
    }

    fn subscribe(&self, topic: Topic) -> Result<mpsc::Receiver<Envelope>, ChannelError> {
        let mut rx = self.slot(topic).rx.lock().unwrap();
        rx.take().ok_or(ChannelError::AlreadySubscribed(topic))
    }
}
