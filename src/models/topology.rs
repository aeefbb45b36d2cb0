use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const NOTIFICATION_EXCHANGE: &str = "notifications";
pub const DEAD_LETTER_EXCHANGE: &str = "dead_letter";
pub const IMMEDIATE_QUEUE: &str = "immediate_notifications";
pub const FAILED_QUEUE: &str = "failed_notifications";

pub const DEAD_LETTER_EXCHANGE_ARG: &str = "x-dead-letter-exchange";
pub const DEAD_LETTER_ROUTING_KEY_ARG: &str = "x-dead-letter-routing-key";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeKind {
    Direct,
    Fanout,
    Topic,
    Headers,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub name: String,
    pub kind: ExchangeKind,
    pub durable: bool,
}

impl Exchange {
    pub fn topic(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ExchangeKind::Topic,
            durable: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Queue {
    pub name: String,
    pub exchange: String,
    pub routing_key: String,
    pub durable: bool,
    pub arguments: BTreeMap<String, String>,
}

impl Queue {
    pub fn bound(name: &str, exchange: &Exchange, routing_key: &str) -> Self {
        Self {
            name: name.to_string(),
            exchange: exchange.name.clone(),
            routing_key: routing_key.to_string(),
            durable: true,
            arguments: BTreeMap::new(),
        }
    }

    pub fn with_dead_letter(mut self, exchange: &Exchange, routing_key: &str) -> Self {
        self.arguments
            .insert(DEAD_LETTER_EXCHANGE_ARG.to_string(), exchange.name.clone());
        self.arguments.insert(
            DEAD_LETTER_ROUTING_KEY_ARG.to_string(),
            routing_key.to_string(),
        );
        self
    }

    /// Exchange and routing key a rejected message is republished under, if
    /// the queue declares a dead-letter exchange. Without an explicit key the
    /// message keeps its original routing key.
    pub fn dead_letter_target(&self, original_routing_key: &str) -> Option<(String, String)> {
        let exchange = self.arguments.get(DEAD_LETTER_EXCHANGE_ARG)?;
        let routing_key = self
            .arguments
            .get(DEAD_LETTER_ROUTING_KEY_ARG)
            .cloned()
            .unwrap_or_else(|| original_routing_key.to_string());

        Some((exchange.clone(), routing_key))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerTopology {
    pub exchanges: Vec<Exchange>,
    pub queues: Vec<Queue>,
}

impl BrokerTopology {
    pub fn exchange(&self, name: &str) -> Option<&Exchange> {
        self.exchanges.iter().find(|exchange| exchange.name == name)
    }

    pub fn queue(&self, name: &str) -> Option<&Queue> {
        self.queues.iter().find(|queue| queue.name == name)
    }

    pub fn bindings_for<'a>(&'a self, exchange: &'a str) -> impl Iterator<Item = &'a Queue> + 'a {
        self.queues
            .iter()
            .filter(move |queue| queue.exchange == exchange)
    }
}

/// The fixed exchange and queue layout the service declares at startup.
pub fn create_notification_topology() -> BrokerTopology {
    let notification_exchange = Exchange::topic(NOTIFICATION_EXCHANGE);
    let dead_letter_exchange = Exchange::topic(DEAD_LETTER_EXCHANGE);

    let queues = vec![
        Queue::bound(
            IMMEDIATE_QUEUE,
            &notification_exchange,
            "notification.immediate.#",
        )
        .with_dead_letter(&dead_letter_exchange, "failed.immediate"),
        Queue::bound(FAILED_QUEUE, &dead_letter_exchange, "failed.#"),
    ];

    BrokerTopology {
        exchanges: vec![notification_exchange, dead_letter_exchange],
        queues,
    }
}
