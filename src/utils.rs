use std::collections::HashMap;

use anyhow::{Error, Result};
use serde_json::Value as JsonValue;
use tokio::time::{Duration, sleep};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::models::{notification::NotificationEvent, retry::RetryConfig};

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_current_span(false)
        .init();
}

pub async fn retry_with_backoff<F, Fut, T, E>(config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    retry_with_backoff_when(config, operation, |_| true).await
}

/// Like [`retry_with_backoff`], but gives up at once on errors `is_transient`
/// rejects.
pub async fn retry_with_backoff_when<F, Fut, T, E, P>(
    config: &RetryConfig,
    operation: F,
    is_transient: P,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;
    let mut delay_ms = config.initial_delay_ms;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    info!(
                        attempt,
                        max_attempts = config.max_attempts,
                        "Retry succeeded"
                    );
                }
                return Ok(result);
            }
            Err(e) => {
                if !is_transient(&e) {
                    debug!(attempt, error = %e, "Permanent failure, not retrying");
                    return Err(e);
                }

                if attempt >= config.max_attempts {
                    warn!(
                        max_attempts = config.max_attempts,
                        error = %e,
                        "Retry failed after exhausting all attempts"
                    );
                    return Err(e);
                }

                debug!(
                    attempt,
                    max_attempts = config.max_attempts,
                    delay_ms,
                    error = %e,
                    "Retry attempt failed, backing off"
                );

                let jitter = rand::random_range(-0.1..=0.1);
                let jittered_delay = (delay_ms as f64 * (1.0 + jitter)) as u64;

                sleep(Duration::from_millis(jittered_delay)).await;

                delay_ms = std::cmp::min(
                    delay_ms.saturating_mul(config.backoff_multiplier),
                    config.max_delay_ms,
                );
            }
        }
    }
}

/// Template variables for an event: every top-level payload field plus
/// `user_id`, `notification_type` and `created_at`.
pub fn template_variables(event: &NotificationEvent) -> Result<HashMap<String, JsonValue>, Error> {
    let mut variables = match event.payload.to_value()? {
        JsonValue::Object(fields) => fields.into_iter().collect(),
        _ => HashMap::new(),
    };

    variables.insert("user_id".to_string(), JsonValue::from(event.user_id.clone()));
    variables.insert(
        "notification_type".to_string(),
        JsonValue::from(event.notification_type().as_str()),
    );
    variables.insert(
        "created_at".to_string(),
        JsonValue::from(event.created_at.to_rfc3339()),
    );

    Ok(variables)
}
