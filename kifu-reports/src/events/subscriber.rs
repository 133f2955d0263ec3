use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures_lite::StreamExt;
use lapin::options::BasicAckOptions;
use serde::{Deserialize, Serialize};

use kifu_shared::clients::rabbitmq::RabbitMQClient;
use kifu_shared::types::event::{routing_keys, Event};

use crate::models::Report;
use crate::preferences::ReportPreferences;
use crate::queue::ReportQueue;
use crate::AppState;

/// Payload of `kifu.moderation.preferences.updated`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreferencesUpdated {
    pub user_id: i64,
    pub preferences: ReportPreferences,
}

/// What a single delivery did to the queue.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    Report(i64),
    Preferences(ReportPreferences),
    Skipped,
}

/// Decode one delivery and apply it. Preference updates for other
/// moderators are skipped.
pub fn apply_delivery(
    queue: &ReportQueue,
    viewer_id: i64,
    routing_key: &str,
    data: &[u8],
) -> Result<Applied, serde_json::Error> {
    if routing_key == routing_keys::MODERATION_INCIDENT_UPDATED {
        let event: Event<Report> = serde_json::from_slice(data)?;
        let report_id = event.data.id;
        queue.upsert(event.data);
        Ok(Applied::Report(report_id))
    } else if routing_key == routing_keys::MODERATION_PREFERENCES_UPDATED {
        let event: Event<PreferencesUpdated> = serde_json::from_slice(data)?;
        if event.data.user_id != viewer_id {
            return Ok(Applied::Skipped);
        }
        tracing::info!("report preferences updated");
        queue.set_preferences(event.data.preferences.clone());
        Ok(Applied::Preferences(event.data.preferences))
    } else {
        Ok(Applied::Skipped)
    }
}

/// Keep a subscription to the moderation exchange alive for the life of the
/// process. Every successful (re)connect resets the queue.
pub async fn run(state: Arc<AppState>) {
    let delay = Duration::from_secs(state.config.reconnect_delay_secs);

    loop {
        match listen(&state).await {
            Ok(()) => tracing::warn!("report event stream ended"),
            Err(e) => tracing::error!(error = %e, "report event subscriber failed"),
        }
        state.broker_connected.store(false, Ordering::Relaxed);

        tracing::info!(delay_secs = delay.as_secs(), "reconnecting to report events");
        tokio::time::sleep(delay).await;
    }
}

async fn listen(state: &AppState) -> anyhow::Result<()> {
    let rabbitmq = RabbitMQClient::connect(&state.config.rabbitmq_url).await?;
    let queue_name = format!("kifu-reports.{}", state.config.moderator_id);
    let mut consumer = rabbitmq
        .subscribe(
            &queue_name,
            &[
                routing_keys::MODERATION_INCIDENT_UPDATED,
                routing_keys::MODERATION_PREFERENCES_UPDATED,
            ],
        )
        .await?;

    state.queue.on_connect();
    state.broker_connected.store(true, Ordering::Relaxed);
    tracing::info!("listening for incident report events");

    while let Some(delivery) = consumer.next().await {
        let delivery = delivery?;
        let routing_key = delivery.routing_key.to_string();

        match apply_delivery(&state.queue, state.config.moderator_id, &routing_key, &delivery.data) {
            Ok(Applied::Preferences(preferences)) => {
                if let Some(store) = &state.preferences {
                    let store = store.clone();
                    tokio::spawn(async move {
                        if let Err(e) = store.save_preferences(&preferences).await {
                            tracing::error!(error = %e, "failed to store report preferences");
                        }
                    });
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, routing_key = %routing_key, "failed to deserialize report event");
            }
        }

        let _ = delivery.ack(BasicAckOptions::default()).await;
    }

    Ok(())
}
