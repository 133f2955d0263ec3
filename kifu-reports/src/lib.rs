use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use kifu_shared::clients::redis::RedisClient;

pub mod clock;
pub mod compare;
pub mod config;
pub mod events;
pub mod models;
pub mod notify;
pub mod preferences;
pub mod queue;
pub mod registry;
pub mod routes;
pub mod service;
pub mod store;

use config::AppConfig;
use queue::ReportQueue;
use store::RedisPreferenceStore;

pub struct AppState {
    pub config: AppConfig,
    pub queue: Arc<ReportQueue>,
    pub redis: Option<RedisClient>,
    pub preferences: Option<RedisPreferenceStore>,
    pub broker_connected: AtomicBool,
    pub metrics_handle: PrometheusHandle,
}

pub fn router(state: Arc<AppState>) -> Router {
    let reports = Router::new()
        .route("/", get(routes::reports::list_eligible))
        .route("/all", get(routes::reports::list_all))
        .route("/count", get(routes::reports::count))
        .route("/:id", get(routes::reports::get_report))
        .route("/:id/related", get(routes::reports::related))
        .route("/:id/claim", post(routes::reports::claim))
        .route("/:id/unclaim", post(routes::reports::unclaim))
        .route("/:id/steal", post(routes::reports::steal))
        .route("/:id/resolve", post(routes::reports::resolve))
        .route("/:id/reopen", post(routes::reports::reopen))
        .route("/:id/ignore", post(routes::reports::ignore));

    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::health::metrics))
        .route("/events", get(routes::sse::report_events))
        .nest("/reports", reports)
        .layer(axum::middleware::from_fn(kifu_shared::middleware::metrics_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
