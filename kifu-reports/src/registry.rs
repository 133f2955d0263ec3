//! In-memory set of active incident reports and the sorted queue derived from it.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use kifu_shared::types::auth::Viewer;

use crate::clock::{Clock, SystemClock};
use crate::compare::sort_reports;
use crate::events::ReportEvents;
use crate::models::{Report, ReportAction};
use crate::notify::{IncidentNotification, LogNotifier, Notifier};
use crate::preferences::{EphemeralStore, IgnoredReports, IgnoredReportsStore, ReportPreferences};

/// New-report notifications are held back this long after every (re)connect,
/// while the backend replays its backlog.
pub const NOTIFICATION_SQUELCH_SECS: i64 = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRelation {
    pub relationship: String,
    pub report: Report,
}

/// An action sent to the backend whose answer has not come back yet.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAction {
    pub action: ReportAction,
    pub started_at: DateTime<Utc>,
    prior: Option<Report>,
    superseded: bool,
}

impl PendingAction {
    /// True once a newer copy of the report arrived while the action was in flight.
    pub fn is_superseded(&self) -> bool {
        self.superseded
    }
}

pub struct ReportRegistry {
    active: HashMap<i64, Report>,
    sorted: Vec<Report>,
    active_count: usize,
    reported_games: Vec<i64>,
    pending: HashMap<i64, PendingAction>,
    preferences: ReportPreferences,
    ignored: IgnoredReports,
    viewer: Viewer,
    connected_at: Option<DateTime<Utc>>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    ignored_store: Arc<dyn IgnoredReportsStore>,
    events: ReportEvents,
}

impl ReportRegistry {
    pub fn new(viewer: Viewer, events: ReportEvents) -> Self {
        Self {
            active: HashMap::new(),
            sorted: Vec::new(),
            active_count: 0,
            reported_games: Vec::new(),
            pending: HashMap::new(),
            preferences: ReportPreferences::default(),
            ignored: IgnoredReports::default(),
            viewer,
            connected_at: None,
            clock: Arc::new(SystemClock),
            notifier: Arc::new(LogNotifier),
            ignored_store: Arc::new(EphemeralStore),
            events,
        }
    }

    pub fn with_preferences(mut self, preferences: ReportPreferences) -> Self {
        self.preferences = preferences;
        self
    }

    pub fn with_ignored(mut self, ignored: IgnoredReports) -> Self {
        self.ignored = ignored;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_ignored_store(mut self, store: Arc<dyn IgnoredReportsStore>) -> Self {
        self.ignored_store = store;
        self
    }

    // --- inbound ---

    /// Apply a full report value from the backend.
    pub fn upsert(&mut self, report: Report) {
        let now = self.clock.now();
        // A report evicted by our own in-flight resolve is still known.
        let is_new = !self.active.contains_key(&report.id) && !self.pending.contains_key(&report.id);

        if is_new
            && !report.is_resolved()
            && self.viewer.is_moderator()
            && self.preferences.notify_on_incident_report
            && !self.is_squelched(now)
        {
            self.notifier.notify(IncidentNotification::for_report(&report));
        }

        if let Some(pending) = self.pending.get_mut(&report.id) {
            pending.superseded = true;
        }

        if report.is_resolved() {
            self.active.remove(&report.id);
            if let Some(game) = report.reported_game {
                self.reported_games.retain(|g| *g != game);
            }
            tracing::debug!(report_id = report.id, "incident report resolved");
        } else {
            if let Some(game) = report.reported_game {
                if report.reporting_user_id() == Some(self.viewer.id) && !self.reported_games.contains(&game) {
                    self.reported_games.push(game);
                }
            }
            tracing::debug!(report_id = report.id, state = ?report.state, is_new, "incident report updated");
            self.active.insert(report.id, report.clone());
        }

        self.events.emit_incident_report(report);
        self.recompute();
    }

    /// Forget everything and restart the notification squelch window.
    pub fn on_connect(&mut self) {
        let now = self.clock.now();
        self.active.clear();
        for pending in self.pending.values_mut() {
            pending.superseded = true;
        }
        self.connected_at = Some(now);
        tracing::info!("report registry reset for new connection");
        self.recompute();
    }

    pub fn is_squelched(&self, now: DateTime<Utc>) -> bool {
        match self.connected_at {
            None => true,
            Some(at) => now < at + Duration::seconds(NOTIFICATION_SQUELCH_SECS),
        }
    }

    // --- derived view ---

    /// Rebuild the sorted view and announce the new active count.
    pub fn recompute(&mut self) {
        let reports = self.visible_view(self.clock.now());
        let normal_ct = reports.iter().filter(|r| self.is_offered(r)).count();

        self.sorted = reports;
        self.active_count = normal_ct;

        metrics::gauge!("incident_reports_active").set(normal_ct as f64);
        self.events.emit_active_count(normal_ct);
        self.events.emit_update();
    }

    fn visible_view(&self, now: DateTime<Utc>) -> Vec<Report> {
        let mut reports: Vec<Report> = self
            .active
            .values()
            .filter(|r| self.preferences.is_visible(&r.report_type) && !self.ignored.is_ignored(r.id, now))
            .cloned()
            .collect();
        sort_reports(&mut reports, &self.preferences, self.viewer.id);
        reports
    }

    /// Unclaimed or claimed by the viewer. Without moderator powers only the
    /// viewer's own reports are offered.
    fn is_offered(&self, report: &Report) -> bool {
        report.is_open_to(self.viewer.id)
            && (self.viewer.is_moderator() || report.reporting_user_id() == Some(self.viewer.id))
    }

    /// The queue the viewer may act on.
    ///
    /// Evaluated against the current time, so a report whose ignore expired
    /// since the last recompute is already back.
    pub fn available_reports(&self) -> Vec<Report> {
        let mut reports = self.visible_view(self.clock.now());
        reports.retain(|r| self.is_offered(r));
        reports
    }

    /// Like [`available_reports`](Self::available_reports), but once the daily
    /// quota is met only the viewer's own reports are offered.
    pub fn eligible_reports(&self) -> Vec<Report> {
        let available = self.available_reports();
        if self.quota_met() {
            available
                .into_iter()
                .filter(|r| r.reporting_user_id() == Some(self.viewer.id))
                .collect()
        } else {
            available
        }
    }

    pub fn reports_left_until_goal(&self) -> usize {
        let remaining = self
            .preferences
            .report_quota
            .saturating_sub(self.viewer.reports_handled_today) as usize;
        remaining.min(self.available_reports().len())
    }

    fn quota_met(&self) -> bool {
        let quota = self.preferences.report_quota;
        quota > 0 && self.viewer.reports_handled_today >= quota
    }

    /// Other visible reports about the same game, review, reporter or reported user.
    pub fn related_reports(&self, report_id: i64) -> Vec<ReportRelation> {
        let Some(report) = self.active.get(&report_id) else {
            return Vec::new();
        };

        self.sorted
            .iter()
            .filter(|other| other.id != report_id)
            .filter_map(|other| {
                let mut relationships = Vec::new();
                if report.reported_game.is_some() && other.reported_game == report.reported_game {
                    relationships.push("Same game");
                }
                if report.reported_review.is_some() && other.reported_review == report.reported_review {
                    relationships.push("Same review");
                }
                if report.reporting_user_id().is_some()
                    && other.reporting_user_id() == report.reporting_user_id()
                {
                    relationships.push("Same reporting user");
                }
                if report.reported_user_id().is_some()
                    && other.reported_user_id() == report.reported_user_id()
                {
                    relationships.push("Same reported user");
                }

                (!relationships.is_empty()).then(|| ReportRelation {
                    relationship: relationships.join(", "),
                    report: other.clone(),
                })
            })
            .collect()
    }

    // --- ignore ---

    pub fn is_ignored(&self, report_id: i64) -> bool {
        self.ignored.is_ignored(report_id, self.clock.now())
    }

    /// Hide a report from this moderator's queue for a week.
    pub fn ignore(&mut self, report_id: i64) {
        let now = self.clock.now();
        self.ignored.ignore(report_id, now);
        self.ignored_store.persist(&self.ignored);
        tracing::info!(report_id, "incident report ignored");
        self.recompute();
    }

    // --- optimistic actions ---

    /// Record an in-flight action. Resolving evicts the report immediately so
    /// it cannot be acted on twice; the evicted copy is kept for rollback.
    ///
    /// Returns the already pending action if one exists for this report.
    pub fn begin_action(&mut self, report_id: i64, action: ReportAction) -> Result<(), PendingAction> {
        if let Some(existing) = self.pending.get(&report_id) {
            return Err(existing.clone());
        }

        let prior = if action == ReportAction::Resolve {
            let removed = self.active.remove(&report_id);
            self.recompute();
            removed
        } else {
            self.active.get(&report_id).cloned()
        };

        self.pending.insert(
            report_id,
            PendingAction {
                action,
                started_at: self.clock.now(),
                prior,
                superseded: false,
            },
        );
        Ok(())
    }

    /// The backend answered; the caller applies the canonical value with `upsert`.
    pub fn confirm_action(&mut self, report_id: i64) -> Option<PendingAction> {
        self.pending.remove(&report_id)
    }

    /// The request failed. A failed resolve puts the report back unless a
    /// newer copy arrived in the meantime.
    pub fn abandon_action(&mut self, report_id: i64) -> Option<PendingAction> {
        let pending = self.pending.remove(&report_id)?;
        if pending.action == ReportAction::Resolve && !pending.superseded {
            if let Some(prior) = pending.prior.clone() {
                tracing::warn!(report_id, "resolve failed, restoring report");
                self.active.insert(report_id, prior);
                self.recompute();
            }
        }
        Some(pending)
    }

    pub fn pending(&self, report_id: i64) -> Option<&PendingAction> {
        self.pending.get(&report_id)
    }

    // --- accessors ---

    pub fn get(&self, report_id: i64) -> Option<&Report> {
        self.active.get(&report_id)
    }

    pub fn contains(&self, report_id: i64) -> bool {
        self.active.contains_key(&report_id)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Every visible, non-ignored report in queue order, whoever holds it.
    pub fn sorted(&self) -> &[Report] {
        &self.sorted
    }

    pub fn active_count(&self) -> usize {
        self.active_count
    }

    /// Games with an active report filed by the viewer.
    pub fn reported_games(&self) -> &[i64] {
        &self.reported_games
    }

    pub fn preferences(&self) -> &ReportPreferences {
        &self.preferences
    }

    pub fn set_preferences(&mut self, preferences: ReportPreferences) {
        self.preferences = preferences;
        self.recompute();
    }

    pub fn viewer(&self) -> &Viewer {
        &self.viewer
    }

    pub fn set_viewer(&mut self, viewer: Viewer) {
        self.viewer = viewer;
        self.recompute();
    }

    pub fn events(&self) -> &ReportEvents {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::{PlayerRef, ReportState};
    use chrono::TimeZone;
    use kifu_shared::types::auth::UserRole;
    use std::sync::Mutex;

    const ME: i64 = 99;

    #[derive(Default)]
    struct RecordingNotifier(Mutex<Vec<IncidentNotification>>);

    impl Notifier for RecordingNotifier {
        fn notify(&self, notification: IncidentNotification) {
            self.0.lock().unwrap().push(notification);
        }
    }

    #[derive(Default)]
    struct RecordingStore(Mutex<Vec<IgnoredReports>>);

    impl IgnoredReportsStore for RecordingStore {
        fn persist(&self, ignored: &IgnoredReports) {
            self.0.lock().unwrap().push(ignored.clone());
        }
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()))
    }

    fn registry(clock: Arc<ManualClock>) -> ReportRegistry {
        ReportRegistry::new(Viewer::moderator(ME), ReportEvents::new(64)).with_clock(clock)
    }

    fn open(id: i64) -> Report {
        Report::new(id, "escalation")
    }

    fn ids(reports: &[Report]) -> Vec<i64> {
        reports.iter().map(|r| r.id).collect()
    }

    #[test]
    fn resolved_report_is_evicted() {
        let mut reg = registry(clock());
        reg.upsert(open(5));
        assert_eq!(ids(&reg.available_reports()), vec![5]);

        let mut resolved = open(5);
        resolved.state = ReportState::Resolved;
        reg.upsert(resolved);
        assert!(reg.available_reports().is_empty());
        assert!(!reg.contains(5));
    }

    #[test]
    fn resolved_unknown_report_is_never_stored() {
        let mut reg = registry(clock());
        let mut resolved = open(8);
        resolved.state = ReportState::Resolved;
        reg.upsert(resolved);
        assert!(reg.is_empty());
    }

    #[test]
    fn updates_replace_whole_value() {
        let mut reg = registry(clock());
        let mut first = open(1);
        first.moderator_note = "note".into();
        reg.upsert(first);
        reg.upsert(open(1));
        assert_eq!(reg.get(1).unwrap().moderator_note, "");
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn active_count_covers_unclaimed_and_own_claims() {
        let mut reg = registry(clock());
        let mut mine = open(1);
        mine.moderator = Some(PlayerRef::new(ME, "me"));
        let mut theirs = open(2);
        theirs.moderator = Some(PlayerRef::new(7, "other"));
        reg.upsert(mine);
        reg.upsert(theirs);
        reg.upsert(open(3));

        assert_eq!(reg.active_count(), 2);
        assert_eq!(ids(reg.sorted()), vec![1, 3, 2]);
        assert_eq!(ids(&reg.available_reports()), vec![1, 3]);
    }

    #[test]
    fn hidden_types_drop_out_of_view() {
        let mut reg = registry(clock());
        reg.upsert(open(1));
        reg.upsert(Report::new(2, "spam"));
        reg.set_preferences(ReportPreferences::default().with_setting("spam", false, 1));
        assert_eq!(ids(reg.sorted()), vec![1]);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn ignore_hides_for_a_week_then_reappears() {
        let clock = clock();
        let store = Arc::new(RecordingStore::default());
        let mut reg = registry(clock.clone()).with_ignored_store(store.clone());
        reg.upsert(open(4));
        reg.upsert(open(5));

        reg.ignore(4);
        assert_eq!(ids(&reg.available_reports()), vec![5]);
        assert_eq!(store.0.lock().unwrap().len(), 1);

        clock.advance(Duration::days(6));
        assert!(reg.is_ignored(4));

        clock.advance(Duration::days(1));
        assert!(!reg.is_ignored(4));
        assert_eq!(ids(&reg.available_reports()), vec![5, 4]);
    }

    #[test]
    fn notifications_are_squelched_after_connect() {
        let clock = clock();
        let notifier = Arc::new(RecordingNotifier::default());
        let mut reg = registry(clock.clone()).with_notifier(notifier.clone());

        // never connected: squelched
        reg.upsert(open(1));
        reg.on_connect();
        clock.advance(Duration::seconds(1));
        reg.upsert(open(2));
        reg.upsert(open(3));
        clock.advance(Duration::seconds(3));
        reg.upsert(open(4));
        assert!(notifier.0.lock().unwrap().is_empty());

        clock.advance(Duration::seconds(2));
        reg.upsert(open(5));
        // known ids do not notify again
        reg.upsert(open(5));
        let sent = notifier.0.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].report_id, 5);
    }

    #[test]
    fn notifications_respect_preference_and_role() {
        let clock = clock();
        let notifier = Arc::new(RecordingNotifier::default());
        let mut prefs = ReportPreferences::default();
        prefs.notify_on_incident_report = false;
        let mut reg = registry(clock.clone())
            .with_notifier(notifier.clone())
            .with_preferences(prefs);
        reg.on_connect();
        clock.advance(Duration::seconds(10));
        reg.upsert(open(1));

        let mut user_reg = ReportRegistry::new(Viewer::new(5, Default::default()), ReportEvents::new(4))
            .with_clock(clock.clone())
            .with_notifier(notifier.clone());
        user_reg.on_connect();
        clock.advance(Duration::seconds(10));
        user_reg.upsert(open(2));

        assert!(notifier.0.lock().unwrap().is_empty());
    }

    #[test]
    fn reconnect_clears_contents() {
        let mut reg = registry(clock());
        reg.upsert(open(1));
        reg.upsert(open(2));
        reg.on_connect();
        assert!(reg.is_empty());
        assert_eq!(reg.active_count(), 0);
    }

    #[test]
    fn related_reports_describe_shared_subjects() {
        let mut reg = registry(clock());
        let mut a = open(1);
        a.reported_game = Some(77);
        a.reporting_user = Some(PlayerRef::new(3, "alice"));
        let mut b = open(2);
        b.reported_game = Some(77);
        b.reporting_user = Some(PlayerRef::new(3, "alice"));
        let mut c = open(3);
        c.reported_game = Some(78);
        reg.upsert(a);
        reg.upsert(b);
        reg.upsert(c);

        let related = reg.related_reports(1);
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].report.id, 2);
        assert_eq!(related[0].relationship, "Same game, Same reporting user");
        assert!(reg.related_reports(404).is_empty());
    }

    #[test]
    fn reported_games_track_viewers_own_reports() {
        let mut reg = registry(clock());
        let mut mine = open(1);
        mine.reported_game = Some(500);
        mine.reporting_user = Some(PlayerRef::new(ME, "me"));
        reg.upsert(mine.clone());
        reg.upsert(mine.clone());
        assert_eq!(reg.reported_games(), &[500]);

        mine.state = ReportState::Resolved;
        reg.upsert(mine);
        assert!(reg.reported_games().is_empty());
    }

    #[test]
    fn quota_limits_eligible_reports() {
        let mut reg = registry(clock());
        let mut own = open(1);
        own.reporting_user = Some(PlayerRef::new(ME, "me"));
        reg.upsert(own);
        reg.upsert(open(2));
        reg.upsert(open(3));

        let mut prefs = ReportPreferences::default();
        prefs.report_quota = 2;
        reg.set_preferences(prefs);
        assert_eq!(reg.eligible_reports().len(), 3);
        assert_eq!(reg.reports_left_until_goal(), 2);

        let mut viewer = Viewer::moderator(ME);
        viewer.reports_handled_today = 2;
        reg.set_viewer(viewer);
        assert_eq!(ids(&reg.eligible_reports()), vec![1]);
        assert_eq!(reg.reports_left_until_goal(), 0);
    }

    #[test]
    fn failed_resolve_restores_report() {
        let mut reg = registry(clock());
        reg.upsert(open(1));
        reg.begin_action(1, ReportAction::Resolve).unwrap();
        assert!(!reg.contains(1));
        assert!(reg.begin_action(1, ReportAction::Claim).is_err());

        reg.abandon_action(1);
        assert!(reg.contains(1));
        assert!(reg.pending(1).is_none());
    }

    #[test]
    fn failed_resolve_does_not_clobber_newer_event() {
        let mut reg = registry(clock());
        reg.upsert(open(1));
        reg.begin_action(1, ReportAction::Resolve).unwrap();

        let mut newer = open(1);
        newer.moderator_note = "from the server".into();
        reg.upsert(newer);
        assert!(reg.pending(1).unwrap().is_superseded());

        reg.abandon_action(1);
        assert_eq!(reg.get(1).unwrap().moderator_note, "from the server");
    }

    #[test]
    fn resolved_reports_never_notify() {
        let clock = clock();
        let notifier = Arc::new(RecordingNotifier::default());
        let mut reg = registry(clock.clone()).with_notifier(notifier.clone());
        reg.on_connect();
        clock.advance(Duration::seconds(10));

        let mut resolved = open(8);
        resolved.state = ReportState::Resolved;
        reg.upsert(resolved);

        reg.upsert(open(9));
        reg.begin_action(9, ReportAction::Resolve).unwrap();
        let mut echo = open(9);
        echo.state = ReportState::Resolved;
        reg.upsert(echo.clone());
        reg.confirm_action(9);
        reg.upsert(echo);

        let sent = notifier.0.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].report_id, 9);
    }

    #[test]
    fn report_evicted_by_pending_resolve_is_not_new() {
        let clock = clock();
        let notifier = Arc::new(RecordingNotifier::default());
        let mut reg = registry(clock.clone()).with_notifier(notifier.clone());
        reg.on_connect();
        clock.advance(Duration::seconds(10));
        reg.upsert(open(3));
        reg.begin_action(3, ReportAction::Resolve).unwrap();

        // a claim by someone else lands while our resolve is in flight
        reg.upsert(claimed_by_other(3));
        assert_eq!(notifier.0.lock().unwrap().len(), 1);
    }

    fn claimed_by_other(id: i64) -> Report {
        let mut report = open(id);
        report.moderator = Some(PlayerRef::new(7, "other"));
        report
    }

    #[test]
    fn plain_users_only_see_reports_they_filed() {
        let mut reg = ReportRegistry::new(Viewer::new(5, UserRole::User), ReportEvents::new(16))
            .with_clock(clock());
        let mut theirs = open(1);
        theirs.reporting_user = Some(PlayerRef::new(42, "someone"));
        let mut own = open(2);
        own.reporting_user = Some(PlayerRef::new(5, "me"));
        reg.upsert(theirs);
        reg.upsert(own);
        reg.upsert(open(3));

        assert_eq!(ids(&reg.available_reports()), vec![2]);
        assert_eq!(ids(&reg.eligible_reports()), vec![2]);
        assert_eq!(reg.active_count(), 1);
        assert_eq!(reg.len(), 3);
    }

    #[tokio::test]
    async fn upsert_emits_report_count_and_update() {
        let events = ReportEvents::new(16);
        let mut reports = events.subscribe_incident_reports();
        let mut counts = events.subscribe_active_count();
        let mut updates = events.subscribe_updates();

        let mut reg = ReportRegistry::new(Viewer::moderator(ME), events).with_clock(clock());
        reg.upsert(open(12));

        assert_eq!(reports.recv().await.unwrap().id, 12);
        assert_eq!(counts.recv().await.unwrap(), 1);
        updates.recv().await.unwrap();
    }
}
