use serde::Serialize;

use crate::models::Report;

/// Where clicking a new-report notification takes the moderator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum ClickTarget {
    Game(i64),
    Review(i64),
    User(i64),
}

impl ClickTarget {
    /// Game, then review, then the reported user's profile.
    pub fn for_report(report: &Report) -> Option<Self> {
        report
            .reported_game
            .map(ClickTarget::Game)
            .or(report.reported_review.map(ClickTarget::Review))
            .or(report.reported_user_id().map(ClickTarget::User))
    }

    pub fn path(&self) -> String {
        match self {
            ClickTarget::Game(id) => format!("/game/{id}"),
            ClickTarget::Review(id) => format!("/review/{id}"),
            ClickTarget::User(id) => format!("/user/view/{id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncidentNotification {
    pub report_id: i64,
    pub title: String,
    pub body: String,
    pub target: Option<ClickTarget>,
}

impl IncidentNotification {
    pub fn for_report(report: &Report) -> Self {
        let reporter = report
            .reporting_user
            .as_ref()
            .map(|u| u.username.as_str())
            .unwrap_or("unknown");

        Self {
            report_id: report.id,
            title: "Incident Report".to_string(),
            body: format!("{reporter}: {}", report.reporter_note),
            target: ClickTarget::for_report(report),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: IncidentNotification);
}

/// Writes notifications to the log; the desktop shell tails it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: IncidentNotification) {
        tracing::info!(
            report_id = notification.report_id,
            title = %notification.title,
            body = %notification.body,
            target = notification.target.map(|t| t.path()).as_deref().unwrap_or("-"),
            "incident notification"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PlayerRef;

    #[test]
    fn target_prefers_game_then_review_then_user() {
        let mut report = Report::new(1, "other");
        report.reported_user = Some(PlayerRef::new(12, "troll"));
        assert_eq!(ClickTarget::for_report(&report), Some(ClickTarget::User(12)));

        report.reported_review = Some(34);
        assert_eq!(ClickTarget::for_report(&report), Some(ClickTarget::Review(34)));

        report.reported_game = Some(56);
        assert_eq!(ClickTarget::for_report(&report).map(|t| t.path()), Some("/game/56".into()));
    }

    #[test]
    fn body_names_the_reporter() {
        let mut report = Report::new(2, "harassment");
        report.reporting_user = Some(PlayerRef::new(3, "alice"));
        report.reporter_note = "rude in chat".into();
        let n = IncidentNotification::for_report(&report);
        assert_eq!(n.title, "Incident Report");
        assert_eq!(n.body, "alice: rude in chat");
        assert_eq!(n.target, None);
    }
}
