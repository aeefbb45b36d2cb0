use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties,
    options::{
        BasicAckOptions, BasicGetOptions, BasicPublishOptions, BasicRejectOptions,
        ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
    },
    types::{AMQPValue, FieldTable, LongString},
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    clients::broker::MessageBroker,
    config::Config,
    models::{
        message::BrokerMessage,
        topology::{BrokerTopology, ExchangeKind, Queue},
    },
};

pub struct RabbitMqClient {
    connection: Connection,
    channel: Channel,
}

impl RabbitMqClient {
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        info!("Connecting to RabbitMQ");

        let connection = Connection::connect(&config.rabbitmq_url, ConnectionProperties::default())
            .await
            .map_err(|e| anyhow!("Failed to connect to RabbitMQ: {}", e))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| anyhow!("RabbitMQ channel creation failed: {}", e))?;

        info!("RabbitMQ channel created");

        Ok(Self {
            connection,
            channel,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }

    /// Declares every exchange, then every queue with its binding. Safe to
    /// run on each start since declarations are idempotent in AMQP.
    pub async fn declare_topology(&self, topology: &BrokerTopology) -> Result<(), Error> {
        for exchange in &topology.exchanges {
            self.channel
                .exchange_declare(
                    &exchange.name,
                    exchange_kind(exchange.kind),
                    ExchangeDeclareOptions {
                        durable: exchange.durable,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await
                .map_err(|e| anyhow!("Failed to declare exchange {}: {}", exchange.name, e))?;

            debug!(exchange = %exchange.name, "Exchange declared");
        }

        for queue in &topology.queues {
            self.channel
                .queue_declare(
                    &queue.name,
                    QueueDeclareOptions {
                        durable: queue.durable,
                        ..Default::default()
                    },
                    queue_arguments(queue),
                )
                .await
                .map_err(|e| anyhow!("Failed to declare queue {}: {}", queue.name, e))?;

            self.channel
                .queue_bind(
                    &queue.name,
                    &queue.exchange,
                    &queue.routing_key,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await
                .map_err(|e| anyhow!("Failed to bind queue {}: {}", queue.name, e))?;

            debug!(
                queue = %queue.name,
                exchange = %queue.exchange,
                routing_key = %queue.routing_key,
                "Queue declared and bound"
            );
        }

        info!(
            exchanges = topology.exchanges.len(),
            queues = topology.queues.len(),
            "Broker topology declared"
        );

        Ok(())
    }

    pub async fn message_count(&self, queue: &str) -> Result<u32, Error> {
        let declared = self
            .channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    passive: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to inspect queue {}: {}", queue, e))?;

        Ok(declared.message_count())
    }
}

#[async_trait]
impl MessageBroker for RabbitMqClient {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
    ) -> Result<(), Error> {
        let properties = BasicProperties::default()
            .with_delivery_mode(2)
            .with_content_type("application/json".into())
            .with_message_id(Uuid::new_v4().to_string().into());

        self.channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                payload,
                properties,
            )
            .await
            .map_err(|e| anyhow!("Failed to publish message to {}: {}", exchange, e))?;

        Ok(())
    }

    /// `basic.get` answers `get-empty` at once, so the wait is already bounded
    /// by the round trip. Cancelling it mid-flight could strand a delivered
    /// message unacked on the channel, so the timeout is not applied here.
    async fn get(&self, queue: &str, _timeout: Duration) -> Result<Option<BrokerMessage>, Error> {
        let message = self
            .channel
            .basic_get(queue, BasicGetOptions { no_ack: false })
            .await
            .map_err(|e| anyhow!("Failed to fetch from {}: {}", queue, e))?;

        Ok(message.map(|message| {
            let delivery = message.delivery;
            BrokerMessage {
                delivery_tag: delivery.delivery_tag,
                exchange: delivery.exchange.as_str().to_string(),
                routing_key: delivery.routing_key.as_str().to_string(),
                body: delivery.data,
                redelivered: delivery.redelivered,
            }
        }))
    }

    async fn acknowledge(&self, message: &BrokerMessage) -> Result<(), Error> {
        self.channel
            .basic_ack(message.delivery_tag, BasicAckOptions::default())
            .await
            .map_err(|e| anyhow!("Failed to acknowledge message: {}", e))?;

        Ok(())
    }

    async fn reject(&self, message: &BrokerMessage, requeue: bool) -> Result<(), Error> {
        self.channel
            .basic_reject(message.delivery_tag, BasicRejectOptions { requeue })
            .await
            .map_err(|e| anyhow!("Failed to reject message: {}", e))?;

        Ok(())
    }
}

fn exchange_kind(kind: ExchangeKind) -> lapin::ExchangeKind {
    match kind {
        ExchangeKind::Direct => lapin::ExchangeKind::Direct,
        ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
        ExchangeKind::Topic => lapin::ExchangeKind::Topic,
        ExchangeKind::Headers => lapin::ExchangeKind::Headers,
    }
}

fn queue_arguments(queue: &Queue) -> FieldTable {
    let mut arguments = FieldTable::default();

    for (key, value) in &queue.arguments {
        arguments.insert(
            key.as_str().into(),
            AMQPValue::LongString(LongString::from(value.as_str())),
        );
    }

    arguments
}
