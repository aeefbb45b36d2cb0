use std::{collections::HashMap, time::Instant};

use anyhow::{Error, Result, anyhow};
use chrono::Utc;
use redis::AsyncCommands;
use tracing::{debug, warn};

use crate::{
    clients::{circuit_breaker::circuit_key, database::DatabaseClient, rbmq::RabbitMqClient},
    config::Config,
    models::{
        circuit_breaker::CircuitState,
        health::{HealthCheckResponse, HealthStatus, ServiceHealth},
    },
};

pub const EMAIL_PROVIDER_SERVICE: &str = "email_provider";
pub const TEMPLATE_SERVICE: &str = "template_service";

const CRITICAL_CHECKS: [&str; 3] = ["database", "cache_service", "message_broker"];

pub struct HealthChecker {
    config: Config,
}

impl HealthChecker {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn check_all(&self) -> HealthCheckResponse {
        let (database, cache, broker, email, template) = tokio::join!(
            self.check_database(),
            self.check_redis(),
            self.check_rabbitmq(),
            self.check_circuit_breaker(EMAIL_PROVIDER_SERVICE),
            self.check_circuit_breaker(TEMPLATE_SERVICE),
        );

        let checks = HashMap::from([
            ("database".to_string(), database),
            ("cache_service".to_string(), cache),
            ("message_broker".to_string(), broker),
            (EMAIL_PROVIDER_SERVICE.to_string(), email),
            (TEMPLATE_SERVICE.to_string(), template),
        ]);

        HealthCheckResponse {
            status: overall_status(&checks),
            timestamp: Utc::now(),
            checks,
        }
    }

    async fn check_database(&self) -> ServiceHealth {
        let start = Instant::now();

        let result = async {
            let client = DatabaseClient::connect(&self.config.database_url).await?;
            client.health_check().await
        }
        .await;

        timed("Database", start, result)
    }

    async fn check_redis(&self) -> ServiceHealth {
        let start = Instant::now();

        let result = async {
            let client = redis::Client::open(self.config.redis_url.as_str())?;
            let mut connection = client.get_multiplexed_async_connection().await?;
            connection.ping::<String>().await?;
            Ok::<_, Error>(())
        }
        .await;

        timed("Redis", start, result)
    }

    async fn check_rabbitmq(&self) -> ServiceHealth {
        let start = Instant::now();

        let result = async {
            let client = RabbitMqClient::connect(&self.config).await?;
            if !client.is_connected() {
                return Err(anyhow!("RabbitMQ connection not open"));
            }
            Ok(())
        }
        .await;

        timed("RabbitMQ", start, result)
    }

    async fn check_circuit_breaker(&self, service_name: &str) -> ServiceHealth {
        match self.circuit_breaker_state(service_name).await {
            Ok(state) => {
                let state_str = state.as_str().to_string();
                debug!(
                    service = service_name,
                    circuit_state = %state_str,
                    "Circuit breaker state checked"
                );

                match state {
                    CircuitState::Closed => ServiceHealth::healthy(0).with_circuit_breaker(state_str),
                    CircuitState::HalfOpen => ServiceHealth::degraded(
                        state_str,
                        Some("Circuit breaker in recovery mode".to_string()),
                    ),
                    CircuitState::Open => ServiceHealth::degraded(state_str, None),
                }
            }
            Err(e) => {
                warn!(
                    service = service_name,
                    error = %e,
                    "Failed to check circuit breaker state"
                );
                ServiceHealth::unhealthy(format!("Cannot check circuit breaker: {}", e))
            }
        }
    }

    async fn circuit_breaker_state(&self, service_name: &str) -> Result<CircuitState> {
        let client = redis::Client::open(self.config.redis_url.as_str())?;
        let mut connection = client.get_multiplexed_async_connection().await?;

        let value: Option<String> = connection.get(circuit_key(service_name, "state")).await?;

        Ok(value
            .map(|s| CircuitState::from_string(&s))
            .unwrap_or(CircuitState::Closed))
    }
}

fn timed(name: &str, start: Instant, result: Result<(), Error>) -> ServiceHealth {
    match result {
        Ok(()) => {
            let elapsed = start.elapsed().as_millis() as u64;
            debug!(check = name, response_time_ms = elapsed, "Health check passed");
            ServiceHealth::healthy(elapsed)
        }
        Err(e) => {
            warn!(check = name, error = %e, "Health check failed");
            ServiceHealth::unhealthy(format!("{} check failed: {}", name, e))
        }
    }
}

/// Unhealthy if a critical dependency is down, degraded if any breaker is
/// open or recovering.
pub fn overall_status(checks: &HashMap<String, ServiceHealth>) -> HealthStatus {
    let critical_unhealthy = checks
        .iter()
        .filter(|(name, _)| CRITICAL_CHECKS.contains(&name.as_str()))
        .any(|(_, health)| health.status == HealthStatus::Unhealthy);

    if critical_unhealthy {
        return HealthStatus::Unhealthy;
    }

    let has_problem = checks
        .values()
        .any(|health| health.status != HealthStatus::Healthy);

    if has_problem {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}
