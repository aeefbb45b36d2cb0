use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::MultiplexedConnection};
use tracing::{info, warn};

use crate::{
    config::Config,
    models::{retry::RetryConfig, status::IdempotencyStatus},
    utils::retry_with_backoff,
};

/// Remembers how far each notification got, so a redelivered message whose
/// email already went out is not sent twice.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    async fn check_idempotency(&self, idempotency_key: &str) -> Result<IdempotencyStatus, Error>;

    async fn mark_as_processing(&self, idempotency_key: &str) -> Result<(), Error>;

    async fn mark_as_sent(&self, idempotency_key: &str) -> Result<(), Error>;

    async fn mark_as_failed(&self, idempotency_key: &str) -> Result<(), Error>;
}

pub struct RedisClient {
    connection: MultiplexedConnection,
    idempotency_ttl_seconds: u64,
    retry_config: RetryConfig,
}

impl RedisClient {
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        info!("Connecting to Redis");

        let client = Client::open(config.redis_url.as_str())
            .map_err(|e| anyhow!("Failed to create redis client: {}", e))?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| anyhow!("Failed to connect to redis: {}", e))?;

        info!("Redis connection established");

        Ok(Self {
            connection,
            idempotency_ttl_seconds: config.idempotency_ttl_seconds,
            retry_config: config.retry_config(),
        })
    }

    /// Shared handle for other Redis-backed components such as circuit breakers.
    pub fn connection(&self) -> MultiplexedConnection {
        self.connection.clone()
    }

    async fn set_status(&self, idempotency_key: &str, status: IdempotencyStatus) -> Result<(), Error> {
        let mut connection = self.connection.clone();

        connection
            .set_ex::<_, _, ()>(key(idempotency_key), status.as_str(), self.idempotency_ttl_seconds)
            .await
            .map_err(|e| anyhow!("Failed to mark {} as {}: {}", idempotency_key, status, e))?;

        Ok(())
    }
}

fn key(idempotency_key: &str) -> String {
    format!("idempotency:{}", idempotency_key)
}

#[async_trait]
impl IdempotencyStore for RedisClient {
    async fn check_idempotency(&self, idempotency_key: &str) -> Result<IdempotencyStatus, Error> {
        let mut connection = self.connection.clone();

        let value: Option<String> = connection
            .get(key(idempotency_key))
            .await
            .map_err(|e| anyhow!("Failed to get cached value: {}", e))?;

        match value.as_deref() {
            None => Ok(IdempotencyStatus::NotFound),
            Some(raw) => Ok(IdempotencyStatus::from_string(raw).unwrap_or_else(|| {
                warn!(
                    status = raw,
                    idempotency_key,
                    "Unknown idempotency status, treating as not found"
                );
                IdempotencyStatus::NotFound
            })),
        }
    }

    async fn mark_as_processing(&self, idempotency_key: &str) -> Result<(), Error> {
        self.set_status(idempotency_key, IdempotencyStatus::Processing)
            .await
    }

    /// Retried: losing this write would resend the email on redelivery.
    async fn mark_as_sent(&self, idempotency_key: &str) -> Result<(), Error> {
        let redis_key = key(idempotency_key);

        retry_with_backoff(&self.retry_config, || {
            let redis_key = redis_key.clone();
            let mut connection = self.connection.clone();
            let ttl = self.idempotency_ttl_seconds;

            async move {
                connection
                    .set_ex::<_, _, ()>(&redis_key, IdempotencyStatus::Sent.as_str(), ttl)
                    .await
                    .map_err(|e| e.to_string())
            }
        })
        .await
        .map_err(|e| anyhow!("mark_as_sent failed: {}", e))?;

        Ok(())
    }

    async fn mark_as_failed(&self, idempotency_key: &str) -> Result<(), Error> {
        self.set_status(idempotency_key, IdempotencyStatus::Failed)
            .await
    }
}
