use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use kifu_shared::{HealthCheck, HealthResponse, HealthStatus};

use crate::AppState;

/// Broker and Redis status. A lost broker connection degrades the service:
/// the queue keeps serving its last known contents until the subscriber
/// reconnects.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Response {
    let broker = if state.broker_connected.load(Ordering::Relaxed) {
        HealthCheck::new("broker", HealthStatus::Healthy)
    } else {
        HealthCheck::new("broker", HealthStatus::Degraded).with_message("reconnecting")
    };

    let redis = match &state.redis {
        None => HealthCheck::new("redis", HealthStatus::Degraded).with_message("not configured"),
        Some(redis) => match redis.ping().await {
            Ok(()) => HealthCheck::new("redis", HealthStatus::Healthy),
            Err(e) => HealthCheck::new("redis", HealthStatus::Unhealthy).with_message(e.to_string()),
        },
    };

    let response = HealthResponse::healthy("kifu-reports", env!("CARGO_PKG_VERSION"))
        .with_checks(vec![broker, redis]);

    let status = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status, Json(response)).into_response()
}

/// Returns Prometheus metrics.
pub async fn metrics(State(state): State<Arc<AppState>>) -> String {
    state.metrics_handle.render()
}
