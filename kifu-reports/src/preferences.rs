use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How long `ignore` hides a report.
pub const IGNORE_TTL_MS: i64 = 7 * 24 * 60 * 60 * 1000;

/// Per report type display settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportTypeSetting {
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default = "default_priority")]
    pub priority: i64,
}

fn default_visible() -> bool { true }
fn default_priority() -> i64 { 1 }

impl Default for ReportTypeSetting {
    fn default() -> Self {
        Self { visible: default_visible(), priority: default_priority() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortOrder {
    #[default]
    OldestFirst,
    NewestFirst,
}

/// The moderator's queue preferences. Read-only from the registry's point of
/// view; changes arrive as a whole new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportPreferences {
    #[serde(default, rename = "moderator.report-settings")]
    pub report_settings: HashMap<String, ReportTypeSetting>,
    #[serde(default, rename = "moderator.report-sort-order")]
    pub sort_order: SortOrder,
    #[serde(default = "default_notify", rename = "notify-on-incident-report")]
    pub notify_on_incident_report: bool,
    /// Reports a moderator aims to handle per day; 0 disables the quota.
    #[serde(default, rename = "moderator.report-quota")]
    pub report_quota: u32,
}

fn default_notify() -> bool { true }

impl Default for ReportPreferences {
    fn default() -> Self {
        Self {
            report_settings: HashMap::new(),
            sort_order: SortOrder::default(),
            notify_on_incident_report: default_notify(),
            report_quota: 0,
        }
    }
}

impl ReportPreferences {
    pub fn setting(&self, report_type: &str) -> ReportTypeSetting {
        self.report_settings.get(report_type).copied().unwrap_or_default()
    }

    pub fn priority(&self, report_type: &str) -> i64 {
        self.setting(report_type).priority
    }

    pub fn is_visible(&self, report_type: &str) -> bool {
        self.setting(report_type).visible
    }

    pub fn with_setting(mut self, report_type: impl Into<String>, visible: bool, priority: i64) -> Self {
        self.report_settings
            .insert(report_type.into(), ReportTypeSetting { visible, priority });
        self
    }

    pub fn with_sort_order(mut self, sort_order: SortOrder) -> Self {
        self.sort_order = sort_order;
        self
    }
}

/// Report id -> "ignored until" in epoch milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IgnoredReports(HashMap<i64, i64>);

impl IgnoredReports {
    pub fn is_ignored(&self, report_id: i64, now: DateTime<Utc>) -> bool {
        self.0
            .get(&report_id)
            .is_some_and(|until| *until > now.timestamp_millis())
    }

    /// Hide `report_id` for [`IGNORE_TTL_MS`] and drop entries that already expired.
    pub fn ignore(&mut self, report_id: i64, now: DateTime<Utc>) {
        let now_ms = now.timestamp_millis();
        self.0.insert(report_id, now_ms + IGNORE_TTL_MS);
        self.0.retain(|_, until| *until >= now_ms);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Where ignored-report maps are persisted between runs.
pub trait IgnoredReportsStore: Send + Sync {
    fn persist(&self, ignored: &IgnoredReports);
}

/// Keeps nothing; for tests and for running without Redis.
#[derive(Debug, Default, Clone, Copy)]
pub struct EphemeralStore;

impl IgnoredReportsStore for EphemeralStore {
    fn persist(&self, _ignored: &IgnoredReports) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn unknown_types_are_visible_with_priority_one() {
        let prefs = ReportPreferences::default();
        assert!(prefs.is_visible("anything"));
        assert_eq!(prefs.priority("anything"), 1);
    }

    #[test]
    fn preferences_use_preference_key_names() {
        let prefs: ReportPreferences = serde_json::from_value(json!({
            "moderator.report-settings": { "spam": { "visible": false } },
            "moderator.report-sort-order": "newest-first",
        }))
        .unwrap();
        assert!(!prefs.is_visible("spam"));
        assert_eq!(prefs.priority("spam"), 1);
        assert_eq!(prefs.sort_order, SortOrder::NewestFirst);
        assert!(prefs.notify_on_incident_report);
    }

    #[test]
    fn ignore_expires_after_seven_days() {
        let mut ignored = IgnoredReports::default();
        ignored.ignore(10, t0());
        assert!(ignored.is_ignored(10, t0() + Duration::days(6)));
        assert!(!ignored.is_ignored(10, t0() + Duration::days(7)));
    }

    #[test]
    fn ignore_prunes_expired_entries() {
        let mut ignored = IgnoredReports::default();
        ignored.ignore(1, t0());
        ignored.ignore(2, t0() + Duration::days(8));
        assert_eq!(ignored.len(), 1);
        assert!(ignored.is_ignored(2, t0() + Duration::days(8)));
    }

    #[test]
    fn ignored_map_round_trips_as_epoch_millis() {
        let mut ignored = IgnoredReports::default();
        ignored.ignore(5, t0());
        let wire = serde_json::to_value(&ignored).unwrap();
        assert_eq!(wire["5"], t0().timestamp_millis() + IGNORE_TTL_MS);
    }
}
