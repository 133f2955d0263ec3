use serde::de::DeserializeOwned;

use kifu_shared::clients::redis::RedisClient;

use crate::preferences::{IgnoredReports, IgnoredReportsStore, ReportPreferences, IGNORE_TTL_MS};

/// Ignore entries never outlive a week, so neither does the stored map.
const IGNORED_TTL_SECS: u64 = (IGNORE_TTL_MS / 1000) as u64;
const PREFERENCES_TTL_SECS: u64 = 30 * 24 * 60 * 60;

fn preferences_key(user_id: i64) -> String {
    format!("kifu:moderator:{user_id}:report-preferences")
}

fn ignored_key(user_id: i64) -> String {
    format!("kifu:moderator:{user_id}:ignored-reports")
}

/// A stored value that fails to parse is treated as absent.
fn decode_or_default<T: DeserializeOwned + Default>(key: &str, raw: Option<String>) -> T {
    match raw {
        None => T::default(),
        Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!(key, error = %e, "discarding malformed stored value");
            T::default()
        }),
    }
}

/// Moderator preferences and ignored reports kept in Redis.
#[derive(Clone)]
pub struct RedisPreferenceStore {
    redis: RedisClient,
    user_id: i64,
}

impl RedisPreferenceStore {
    pub fn new(redis: RedisClient, user_id: i64) -> Self {
        Self { redis, user_id }
    }

    pub async fn load_preferences(&self) -> anyhow::Result<ReportPreferences> {
        let key = preferences_key(self.user_id);
        let raw = self.redis.get(&key).await?;
        Ok(decode_or_default(&key, raw))
    }

    pub async fn save_preferences(&self, preferences: &ReportPreferences) -> anyhow::Result<()> {
        let value = serde_json::to_string(preferences)?;
        self.redis
            .set(&preferences_key(self.user_id), &value, PREFERENCES_TTL_SECS)
            .await?;
        Ok(())
    }

    pub async fn load_ignored(&self) -> anyhow::Result<IgnoredReports> {
        let key = ignored_key(self.user_id);
        let raw = self.redis.get(&key).await?;
        let ignored: IgnoredReports = decode_or_default(&key, raw);
        tracing::debug!(count = ignored.len(), "loaded ignored reports");
        Ok(ignored)
    }
}

impl IgnoredReportsStore for RedisPreferenceStore {
    /// Write-behind: the registry never waits on Redis.
    fn persist(&self, ignored: &IgnoredReports) {
        let value = match serde_json::to_string(ignored) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode ignored reports");
                return;
            }
        };

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no runtime available, ignored reports not persisted");
            return;
        };

        let redis = self.redis.clone();
        let key = ignored_key(self.user_id);
        handle.spawn(async move {
            if let Err(e) = redis.set(&key, &value, IGNORED_TTL_SECS).await {
                tracing::error!(error = %e, key = %key, "failed to persist ignored reports");
            }
        });
    }
}
