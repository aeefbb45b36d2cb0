use std::time::Duration;

use anyhow::{Error, Result};
use async_trait::async_trait;

use crate::models::message::BrokerMessage;

/// The slice of broker behaviour the publisher and consumer loop rely on.
///
/// Dead-lettering is the broker's job: a message rejected without requeue
/// from a queue declared with `x-dead-letter-exchange` must reappear on that
/// exchange, not be re-delivered to the original queue.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    async fn publish(&self, exchange: &str, routing_key: &str, payload: &[u8])
    -> Result<(), Error>;

    /// Fetches at most one message, waiting no longer than `timeout`.
    /// `Ok(None)` means the queue was empty.
    async fn get(&self, queue: &str, timeout: Duration) -> Result<Option<BrokerMessage>, Error>;

    async fn acknowledge(&self, message: &BrokerMessage) -> Result<(), Error>;

    async fn reject(&self, message: &BrokerMessage, requeue: bool) -> Result<(), Error>;
}
