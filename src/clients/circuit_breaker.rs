use anyhow::{Error, Result, anyhow};
use chrono::Utc;
use redis::{AsyncCommands, aio::MultiplexedConnection};
use tracing::{debug, info, warn};

use crate::models::circuit_breaker::{CircuitBreakerConfig, CircuitState};

/// Redis-backed breaker, so every worker replica sees the same state for a
/// downstream service.
#[derive(Clone)]
pub struct CircuitBreaker {
    service_name: String,
    connection: MultiplexedConnection,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(
        service_name: &str,
        connection: MultiplexedConnection,
        config: CircuitBreakerConfig,
    ) -> Self {
        info!(service = service_name, "Circuit breaker initialized");

        Self {
            service_name: service_name.to_string(),
            connection,
            config,
        }
    }

    pub async fn call<F, Fut, T>(&self, operation: F) -> Result<T, Error>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, Error>>,
    {
        match self.state().await? {
            CircuitState::Open => {
                if !self.should_attempt_reset().await? {
                    warn!(service = %self.service_name, "Circuit breaker is open, rejecting request");
                    return Err(anyhow!("Circuit breaker is open for {}", self.service_name));
                }

                info!(service = %self.service_name, "Circuit breaker attempting reset");
                self.set_state(CircuitState::HalfOpen).await?;
            }
            CircuitState::HalfOpen => {
                debug!(service = %self.service_name, "Circuit breaker in half-open state");
            }
            CircuitState::Closed => {}
        }

        match operation().await {
            Ok(result) => {
                self.record_success().await?;
                Ok(result)
            }
            Err(e) => {
                self.record_failure().await?;
                Err(e)
            }
        }
    }

    pub async fn state(&self) -> Result<CircuitState, Error> {
        let mut connection = self.connection.clone();
        let value: Option<String> = connection.get(self.key("state")).await?;

        Ok(value
            .map(|s| CircuitState::from_string(&s))
            .unwrap_or(CircuitState::Closed))
    }

    async fn record_success(&self) -> Result<(), Error> {
        let mut connection = self.connection.clone();

        match self.state().await? {
            CircuitState::HalfOpen => {
                let successes: u32 = connection.incr(self.key("successes"), 1).await?;
                debug!(
                    service = %self.service_name,
                    successes,
                    threshold = self.config.success_threshold,
                    "Circuit breaker success recorded"
                );

                if successes >= self.config.success_threshold {
                    self.set_state(CircuitState::Closed).await?;
                    connection
                        .del::<_, ()>(vec![
                            self.key("failures"),
                            self.key("successes"),
                            self.key("opened_at"),
                        ])
                        .await?;
                    info!(service = %self.service_name, "Circuit breaker closed after successful recovery");
                }
            }
            CircuitState::Closed => {
                connection.del::<_, ()>(self.key("failures")).await?;
            }
            CircuitState::Open => {}
        }

        Ok(())
    }

    async fn record_failure(&self) -> Result<(), Error> {
        if self.state().await? == CircuitState::HalfOpen {
            self.open().await?;
            warn!(service = %self.service_name, "Circuit breaker reopened after failed recovery attempt");
            return Ok(());
        }

        let mut connection = self.connection.clone();
        let failures_key = self.key("failures");
        let failures: u32 = connection.incr(&failures_key, 1).await?;
        connection
            .expire::<_, ()>(&failures_key, self.config.timeout_seconds as i64)
            .await?;

        debug!(
            service = %self.service_name,
            failures,
            threshold = self.config.failure_threshold,
            "Circuit breaker failure recorded"
        );

        if failures >= self.config.failure_threshold {
            self.open().await?;
            warn!(
                service = %self.service_name,
                failures,
                "Circuit breaker opened due to consecutive failures"
            );
        }

        Ok(())
    }

    async fn open(&self) -> Result<(), Error> {
        let mut connection = self.connection.clone();
        self.set_state(CircuitState::Open).await?;
        connection
            .set::<_, _, ()>(self.key("opened_at"), Utc::now().timestamp())
            .await?;
        connection.del::<_, ()>(self.key("successes")).await?;
        Ok(())
    }

    async fn set_state(&self, state: CircuitState) -> Result<(), Error> {
        let mut connection = self.connection.clone();
        connection
            .set::<_, _, ()>(self.key("state"), state.as_str())
            .await?;
        Ok(())
    }

    async fn should_attempt_reset(&self) -> Result<bool, Error> {
        let mut connection = self.connection.clone();
        let opened_at: Option<i64> = connection.get(self.key("opened_at")).await?;

        Ok(opened_at.is_some_and(|opened_at| {
            Utc::now().timestamp() - opened_at >= self.config.timeout_seconds as i64
        }))
    }

    fn key(&self, suffix: &str) -> String {
        circuit_key(&self.service_name, suffix)
    }
}

pub fn circuit_key(service_name: &str, suffix: &str) -> String {
    format!("circuit:{}:{}", service_name, suffix)
}
