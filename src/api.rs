use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::{
    clients::{broker::MessageBroker, health::HealthChecker},
    error::NotificationError,
    models::{
        health::HealthStatus,
        message::ReplayReport,
        notification::{NotificationEventDto, NotificationResult},
    },
    publisher::NotificationPublisher,
    replay::replay_dead_letters,
};

const DEFAULT_REPLAY_LIMIT: usize = 100;

pub struct AppState {
    pub health_checker: HealthChecker,
    pub publisher: NotificationPublisher,
    pub broker: Arc<dyn MessageBroker>,
    pub fetch_timeout: Duration,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/notifications", post(queue_notification))
        .route("/api/v1/dead-letters/replay", post(replay))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_api_server(state: Arc<AppState>, port: u16) -> Result<(), std::io::Error> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!(address = %addr, "API server started");

    axum::serve(listener, router(state)).await
}

async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_checker.check_all().await;

    let status_code = match health.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn queue_notification(
    State(state): State<Arc<AppState>>,
    Json(body): Json<JsonValue>,
) -> impl IntoResponse {
    let published = match serde_json::from_value::<NotificationEventDto>(body) {
        Ok(event) => state.publisher.publish(event).await,
        Err(e) => Err(NotificationError::Malformed(e.to_string())),
    };

    match published {
        Ok(routing_key) => (
            StatusCode::ACCEPTED,
            Json(NotificationResult::queued(&routing_key)),
        ),
        Err(e) => (
            status_for(&e),
            Json(NotificationResult::failed(e.to_string())),
        ),
    }
}

fn status_for(error: &NotificationError) -> StatusCode {
    if error.is_rejected_input() {
        return StatusCode::UNPROCESSABLE_ENTITY;
    }

    match error {
        NotificationError::Transport(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Debug, Deserialize)]
struct ReplayParams {
    limit: Option<usize>,
}

async fn replay(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ReplayParams>,
) -> Result<Json<ReplayReport>, (StatusCode, String)> {
    let limit = params.limit.unwrap_or(DEFAULT_REPLAY_LIMIT);

    let report = replay_dead_letters(&state.broker, limit, state.fetch_timeout)
        .await
        .map_err(|e| {
            error!(error = %e, "Dead-letter replay failed");
            (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        })?;

    Ok(Json(report))
}
