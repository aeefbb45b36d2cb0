use std::{
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use anyhow::{Error, Result};
use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::{
    clients::broker::MessageBroker,
    models::{
        delivery::DeliveryOutcome,
        message::{BrokerMessage, PollOutcome},
    },
};

/// Per-queue handler. An `Err` is treated the same as
/// [`DeliveryOutcome::Failed`].
#[async_trait]
pub trait MessageProcessor: Send + Sync {
    async fn process(&self, message: &str) -> Result<DeliveryOutcome, Error>;
}

#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub fetch_timeout: Duration,
    pub idle_sleep: Duration,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(1),
            idle_sleep: Duration::from_millis(100),
        }
    }
}

/// Clearing this stops the loop after the message in hand is settled.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    running: Arc<AtomicBool>,
}

impl ShutdownHandle {
    fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("Consumer shutdown requested");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

struct QueueConsumer {
    queue: String,
    processor: Arc<dyn MessageProcessor>,
}

pub struct ConsumerLoop {
    broker: Arc<dyn MessageBroker>,
    consumers: Vec<QueueConsumer>,
    settings: ConsumerSettings,
    shutdown: ShutdownHandle,
}

impl ConsumerLoop {
    pub fn new(broker: Arc<dyn MessageBroker>, settings: ConsumerSettings) -> Self {
        Self {
            broker,
            consumers: Vec::new(),
            settings,
            shutdown: ShutdownHandle::new(),
        }
    }

    pub fn with_queue(mut self, queue: &str, processor: Arc<dyn MessageProcessor>) -> Self {
        self.consumers.push(QueueConsumer {
            queue: queue.to_string(),
            processor,
        });
        self
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub async fn run(&self) {
        let queues: Vec<&str> = self.consumers.iter().map(|c| c.queue.as_str()).collect();
        info!(?queues, "Started notification consumer");

        while self.shutdown.is_running() {
            let took_message = self
                .poll_once()
                .await
                .iter()
                .any(PollOutcome::took_message);

            if took_message {
                tokio::task::yield_now().await;
            } else {
                sleep(self.settings.idle_sleep).await;
            }
        }

        info!("Notification consumer stopped");
    }

    /// One fetch-process-settle pass over every registered queue.
    pub async fn poll_once(&self) -> Vec<PollOutcome> {
        let mut outcomes = Vec::with_capacity(self.consumers.len());

        for consumer in &self.consumers {
            if !self.shutdown.is_running() {
                break;
            }
            outcomes.push(self.run_queue(consumer).await);
        }

        outcomes
    }

    async fn run_queue(&self, consumer: &QueueConsumer) -> PollOutcome {
        let message = match self
            .broker
            .get(&consumer.queue, self.settings.fetch_timeout)
            .await
        {
            Ok(Some(message)) => message,
            Ok(None) => {
                debug!(queue = %consumer.queue, "Queue empty");
                return PollOutcome::Empty;
            }
            Err(e) => {
                error!(queue = %consumer.queue, error = %e, "Failed to fetch message");
                return PollOutcome::FetchFailed;
            }
        };

        let outcome = dispatch(consumer, &message).await;

        debug!(
            queue = %consumer.queue,
            routing_key = %message.routing_key,
            delivery_tag = message.delivery_tag,
            redelivered = message.redelivered,
            outcome = %outcome,
            "Message processed"
        );

        if outcome.should_ack() {
            match self.broker.acknowledge(&message).await {
                Ok(()) => PollOutcome::Acked,
                Err(e) => {
                    error!(queue = %consumer.queue, error = %e, "Failed to acknowledge message");
                    PollOutcome::SettleFailed
                }
            }
        } else {
            warn!(
                queue = %consumer.queue,
                routing_key = %message.routing_key,
                outcome = %outcome,
                "Rejecting message without requeue"
            );

            match self.broker.reject(&message, false).await {
                Ok(()) => PollOutcome::Rejected,
                Err(e) => {
                    error!(queue = %consumer.queue, error = %e, "Failed to reject message");
                    PollOutcome::SettleFailed
                }
            }
        }
    }
}

async fn dispatch(consumer: &QueueConsumer, message: &BrokerMessage) -> DeliveryOutcome {
    let body = match message.body_str() {
        Ok(body) => body,
        Err(e) => return DeliveryOutcome::failed(e.to_string()),
    };

    match AssertUnwindSafe(consumer.processor.process(body))
        .catch_unwind()
        .await
    {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            error!(queue = %consumer.queue, error = %e, "Error processing notification");
            DeliveryOutcome::failed(e.to_string())
        }
        Err(_) => {
            error!(queue = %consumer.queue, "Notification processor panicked");
            DeliveryOutcome::failed("processor panicked")
        }
    }
}
