use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use kifu_shared::clients::http::ApiClient;
use kifu_shared::clients::redis::RedisClient;
use kifu_shared::types::auth::Viewer;

use kifu_reports::config::AppConfig;
use kifu_reports::events::{self, ReportEvents};
use kifu_reports::preferences::{IgnoredReports, ReportPreferences};
use kifu_reports::queue::ReportQueue;
use kifu_reports::registry::ReportRegistry;
use kifu_reports::service::HttpReportService;
use kifu_reports::store::RedisPreferenceStore;
use kifu_reports::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    kifu_shared::middleware::init_tracing("kifu-reports");

    let config = AppConfig::load()?;
    let port = config.port;

    let metrics_handle = kifu_shared::middleware::init_metrics()?;

    // Redis is optional: without it preferences are defaults and ignores
    // last until restart.
    let redis = match RedisClient::connect(&config.redis_url).await {
        Ok(redis) => Some(redis),
        Err(e) => {
            tracing::warn!(error = %e, url = %config.redis_url, "Redis unavailable, preferences will not persist");
            None
        }
    };
    let preferences = redis
        .clone()
        .map(|redis| RedisPreferenceStore::new(redis, config.moderator_id));

    let (prefs, ignored) = match &preferences {
        Some(store) => (store.load_preferences().await?, store.load_ignored().await?),
        None => (ReportPreferences::default(), IgnoredReports::default()),
    };

    let api = ApiClient::new(
        config.api_base_url.clone(),
        config.api_token.clone(),
        Duration::from_secs(config.api_timeout_secs),
    )?;

    let mut registry = ReportRegistry::new(
        Viewer::new(config.moderator_id, config.moderator_role),
        ReportEvents::new(config.event_capacity),
    )
    .with_preferences(prefs)
    .with_ignored(ignored);
    if let Some(store) = &preferences {
        registry = registry.with_ignored_store(Arc::new(store.clone()));
    }

    let queue = Arc::new(ReportQueue::new(registry, Arc::new(HttpReportService::new(api))));

    let state = Arc::new(AppState {
        config,
        queue,
        redis,
        preferences,
        broker_connected: AtomicBool::new(false),
        metrics_handle,
    });

    tokio::spawn(events::subscriber::run(state.clone()));

    let app = kifu_reports::router(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "kifu-reports starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
