use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use futures_lite::stream::Stream;
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;

use crate::AppState;

/// `GET /events`: the queue's three event streams merged into one SSE feed.
///
/// Event names are `incident-report` (the report JSON), `active-count`
/// (`{"count": n}`) and `update` (empty object).
pub async fn report_events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let events = state.queue.events();
    let mut reports = events.subscribe_incident_reports();
    let mut counts = events.subscribe_active_count();
    let mut updates = events.subscribe_updates();

    tracing::info!("SSE client connected");

    let stream = async_stream::stream! {
        loop {
            let frame = tokio::select! {
                r = reports.recv() => r.map(|report| {
                    SseEvent::default()
                        .event("incident-report")
                        .id(report.id.to_string())
                        .json_data(&report)
                }),
                c = counts.recv() => c.map(|count| {
                    SseEvent::default().event("active-count").json_data(json!({ "count": count }))
                }),
                u = updates.recv() => u.map(|()| {
                    SseEvent::default().event("update").json_data(json!({}))
                }),
            };

            match frame {
                Ok(Ok(event)) => yield Ok(event),
                Ok(Err(e)) => tracing::warn!(error = %e, "SSE: failed to serialize event"),
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "SSE client lagged");
                    yield Ok(SseEvent::default()
                        .event("_warning")
                        .data(format!("{{\"message\":\"lagged, skipped {n} events\"}}")));
                }
                Err(RecvError::Closed) => {
                    tracing::info!("SSE: report events closed, ending stream");
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}
