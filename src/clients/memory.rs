//! In-process stand-ins for RabbitMQ and Redis, used for local runs and tests.
//!
//! The broker follows AMQP topic routing and dead-letters rejected messages
//! according to the queue arguments in the declared [`BrokerTopology`].

use std::{
    collections::{HashMap, VecDeque},
    time::Duration,
};

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{
    clients::{broker::MessageBroker, redis::IdempotencyStore},
    models::{message::BrokerMessage, status::IdempotencyStatus, topology::BrokerTopology},
    routing::topic_matches,
};

#[derive(Debug, Clone)]
struct StoredMessage {
    exchange: String,
    routing_key: String,
    body: Vec<u8>,
    redelivered: bool,
}

#[derive(Debug, Default)]
struct BrokerState {
    queues: HashMap<String, VecDeque<StoredMessage>>,
    unacked: HashMap<u64, (String, StoredMessage)>,
    next_delivery_tag: u64,
    published: usize,
}

impl BrokerState {
    fn route(&mut self, topology: &BrokerTopology, message: StoredMessage) -> usize {
        let mut routed = 0;

        for queue in topology.bindings_for(&message.exchange) {
            if topic_matches(&queue.routing_key, &message.routing_key) {
                self.queues
                    .entry(queue.name.clone())
                    .or_default()
                    .push_back(message.clone());
                routed += 1;
            }
        }

        if routed == 0 {
            debug!(
                exchange = %message.exchange,
                routing_key = %message.routing_key,
                "Message unroutable, dropped"
            );
        }

        routed
    }
}

pub struct InMemoryBroker {
    topology: BrokerTopology,
    state: Mutex<BrokerState>,
}

impl InMemoryBroker {
    pub fn new(topology: BrokerTopology) -> Self {
        let queues = topology
            .queues
            .iter()
            .map(|queue| (queue.name.clone(), VecDeque::new()))
            .collect();

        Self {
            topology,
            state: Mutex::new(BrokerState {
                queues,
                ..Default::default()
            }),
        }
    }

    pub async fn message_count(&self, queue: &str) -> usize {
        let state = self.state.lock().await;
        state.queues.get(queue).map(VecDeque::len).unwrap_or(0)
    }

    pub async fn unacked_count(&self) -> usize {
        self.state.lock().await.unacked.len()
    }

    /// Total successful `publish` calls, routed or not.
    pub async fn published_count(&self) -> usize {
        self.state.lock().await.published
    }

    /// Ready messages on a queue as `(routing_key, body)`, front first.
    pub async fn peek(&self, queue: &str) -> Vec<(String, Vec<u8>)> {
        let state = self.state.lock().await;
        state
            .queues
            .get(queue)
            .map(|messages| {
                messages
                    .iter()
                    .map(|message| (message.routing_key.clone(), message.body.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
    ) -> Result<(), Error> {
        if self.topology.exchange(exchange).is_none() {
            return Err(anyhow!("Exchange {} not declared", exchange));
        }

        let mut state = self.state.lock().await;
        state.published += 1;
        state.route(
            &self.topology,
            StoredMessage {
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
                body: payload.to_vec(),
                redelivered: false,
            },
        );

        Ok(())
    }

    async fn get(&self, queue: &str, _timeout: Duration) -> Result<Option<BrokerMessage>, Error> {
        let mut state = self.state.lock().await;

        let message = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| anyhow!("Queue {} not declared", queue))?
            .pop_front();

        let Some(message) = message else {
            return Ok(None);
        };

        state.next_delivery_tag += 1;
        let delivery_tag = state.next_delivery_tag;

        let delivered = BrokerMessage {
            delivery_tag,
            exchange: message.exchange.clone(),
            routing_key: message.routing_key.clone(),
            body: message.body.clone(),
            redelivered: message.redelivered,
        };

        state
            .unacked
            .insert(delivery_tag, (queue.to_string(), message));

        Ok(Some(delivered))
    }

    async fn acknowledge(&self, message: &BrokerMessage) -> Result<(), Error> {
        let mut state = self.state.lock().await;

        state
            .unacked
            .remove(&message.delivery_tag)
            .ok_or_else(|| anyhow!("Unknown delivery tag {}", message.delivery_tag))?;

        Ok(())
    }

    async fn reject(&self, message: &BrokerMessage, requeue: bool) -> Result<(), Error> {
        let mut state = self.state.lock().await;

        let (queue_name, mut stored) = state
            .unacked
            .remove(&message.delivery_tag)
            .ok_or_else(|| anyhow!("Unknown delivery tag {}", message.delivery_tag))?;

        if requeue {
            stored.redelivered = true;
            state
                .queues
                .entry(queue_name)
                .or_default()
                .push_front(stored);
            return Ok(());
        }

        let target = self
            .topology
            .queue(&queue_name)
            .and_then(|queue| queue.dead_letter_target(&stored.routing_key));

        if let Some((exchange, routing_key)) = target {
            debug!(
                queue = %queue_name,
                exchange = %exchange,
                routing_key = %routing_key,
                "Dead-lettering rejected message"
            );

            state.route(
                &self.topology,
                StoredMessage {
                    exchange,
                    routing_key,
                    body: stored.body,
                    redelivered: false,
                },
            );
        }

        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryIdempotencyStore {
    entries: Mutex<HashMap<String, IdempotencyStatus>>,
}

impl InMemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn set(&self, idempotency_key: &str, status: IdempotencyStatus) {
        self.entries
            .lock()
            .await
            .insert(idempotency_key.to_string(), status);
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn check_idempotency(&self, idempotency_key: &str) -> Result<IdempotencyStatus, Error> {
        Ok(self
            .entries
            .lock()
            .await
            .get(idempotency_key)
            .copied()
            .unwrap_or(IdempotencyStatus::NotFound))
    }

    async fn mark_as_processing(&self, idempotency_key: &str) -> Result<(), Error> {
        self.set(idempotency_key, IdempotencyStatus::Processing).await;
        Ok(())
    }

    async fn mark_as_sent(&self, idempotency_key: &str) -> Result<(), Error> {
        self.set(idempotency_key, IdempotencyStatus::Sent).await;
        Ok(())
    }

    async fn mark_as_failed(&self, idempotency_key: &str) -> Result<(), Error> {
        self.set(idempotency_key, IdempotencyStatus::Failed).await;
        Ok(())
    }
}
