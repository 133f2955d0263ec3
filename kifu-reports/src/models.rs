use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

// --- Report ---

/// One moderation incident as pushed by the backend.
///
/// Everything except `id` defaults when absent so that partially shaped
/// payloads still land in the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    #[serde(deserialize_with = "lenient_id")]
    pub id: i64,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub state: ReportState,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub report_type: String,
    #[serde(default)]
    pub reporting_user: Option<PlayerRef>,
    #[serde(default)]
    pub reported_user: Option<PlayerRef>,
    #[serde(default, deserialize_with = "lenient_opt_id")]
    pub reported_game: Option<i64>,
    #[serde(default, deserialize_with = "lenient_opt_id")]
    pub reported_review: Option<i64>,
    #[serde(default)]
    pub reported_conversation: Option<ReportedConversation>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub moderator: Option<PlayerRef>,
    #[serde(default)]
    pub cleared_by_user: bool,
    #[serde(default)]
    pub was_helpful: bool,
    #[serde(default)]
    pub reporter_note: String,
    #[serde(default)]
    pub reporter_note_translation: Option<NoteTranslation>,
    #[serde(default)]
    pub moderator_note: String,
    #[serde(default)]
    pub system_note: String,
}

impl Report {
    /// A bare open report; mostly useful for building fixtures.
    pub fn new(id: i64, report_type: impl Into<String>) -> Self {
        Self {
            id,
            created: None,
            updated: None,
            state: ReportState::Pending,
            source: String::new(),
            report_type: report_type.into(),
            reporting_user: None,
            reported_user: None,
            reported_game: None,
            reported_review: None,
            reported_conversation: None,
            url: None,
            moderator: None,
            cleared_by_user: false,
            was_helpful: false,
            reporter_note: String::new(),
            reporter_note_translation: None,
            moderator_note: String::new(),
            system_note: String::new(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.state == ReportState::Resolved
    }

    pub fn moderator_id(&self) -> Option<i64> {
        self.moderator.as_ref().map(|m| m.id)
    }

    pub fn is_claimed_by(&self, user_id: i64) -> bool {
        self.moderator_id() == Some(user_id)
    }

    /// Unclaimed, or claimed by `user_id`: the reports that user may act on.
    pub fn is_open_to(&self, user_id: i64) -> bool {
        match self.moderator_id() {
            None => true,
            Some(id) => id == user_id,
        }
    }

    pub fn reporting_user_id(&self) -> Option<i64> {
        self.reporting_user.as_ref().map(|u| u.id)
    }

    pub fn reported_user_id(&self) -> Option<i64> {
        self.reported_user.as_ref().map(|u| u.id)
    }
}

/// Lifecycle state as reported by the backend. Unknown states are kept
/// verbatim and treated as active.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ReportState {
    #[default]
    Pending,
    Claimed,
    Resolved,
    Other(String),
}

impl From<String> for ReportState {
    fn from(s: String) -> Self {
        match s.as_str() {
            "pending" | "open" => ReportState::Pending,
            "claimed" => ReportState::Claimed,
            "resolved" => ReportState::Resolved,
            _ => ReportState::Other(s),
        }
    }
}

impl From<ReportState> for String {
    fn from(state: ReportState) -> Self {
        match state {
            ReportState::Pending => "pending".into(),
            ReportState::Claimed => "claimed".into(),
            ReportState::Resolved => "resolved".into(),
            ReportState::Other(s) => s,
        }
    }
}

// --- References ---

/// Identity-only reference to a player (reporter, reported user, moderator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRef {
    #[serde(deserialize_with = "lenient_id")]
    pub id: i64,
    #[serde(default)]
    pub username: String,
}

impl PlayerRef {
    pub fn new(id: i64, username: impl Into<String>) -> Self {
        Self { id, username: username.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedConversation {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub content: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteTranslation {
    pub source_language: String,
    pub target_language: String,
    pub source_text: String,
    pub target_text: String,
}

// --- Action wire types ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportAction {
    Claim,
    Unclaim,
    Steal,
    Resolve,
    Reopen,
}

impl ReportAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportAction::Claim => "claim",
            ReportAction::Unclaim => "unclaim",
            ReportAction::Steal => "steal",
            ReportAction::Resolve => "resolve",
            ReportAction::Reopen => "reopen",
        }
    }
}

impl std::fmt::Display for ReportAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of `POST moderation/incident/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionRequest {
    pub id: i64,
    pub action: ReportAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub was_helpful: Option<bool>,
}

impl ActionRequest {
    pub fn new(id: i64, action: ReportAction) -> Self {
        Self { id, action, was_helpful: None }
    }

    pub fn resolve(id: i64, helpful: bool) -> Self {
        Self { id, action: ReportAction::Resolve, was_helpful: Some(helpful) }
    }
}

/// What the backend answers to an action: the canonical report, or one of
/// the two claim sentinels.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionResponse {
    Report(Box<Report>),
    Vanished,
    AlreadyClaimed,
}

impl<'de> Deserialize<'de> for ActionResponse {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        let flag = |name: &str| value.get(name).and_then(|v| v.as_bool()).unwrap_or(false);

        if flag("vanished") {
            return Ok(ActionResponse::Vanished);
        }
        if flag("already_claimed") {
            return Ok(ActionResponse::AlreadyClaimed);
        }
        Report::deserialize(value)
            .map(|r| ActionResponse::Report(Box::new(r)))
            .map_err(de::Error::custom)
    }
}

// --- Lenient field decoding ---

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Int(i64),
    Float(f64),
    Str(String),
}

impl NumberOrString {
    fn to_i64(&self) -> Option<i64> {
        match self {
            NumberOrString::Int(n) => Some(*n),
            NumberOrString::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            NumberOrString::Float(_) => None,
            NumberOrString::Str(s) => s.trim().parse().ok(),
        }
    }
}

fn lenient_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let raw = NumberOrString::deserialize(deserializer)?;
    raw.to_i64()
        .ok_or_else(|| de::Error::custom("id is not an integer or numeric string"))
}

fn lenient_opt_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    let raw = Option::<NumberOrString>::deserialize(deserializer)?;
    Ok(raw.and_then(|r| r.to_i64()).filter(|id| *id != 0))
}

fn lenient_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(serde_json::Value::String(s)) => DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        // epoch milliseconds
        Some(serde_json::Value::Number(n)) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    })
}
