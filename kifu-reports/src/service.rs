use async_trait::async_trait;

use kifu_shared::clients::http::ApiClient;
use kifu_shared::AppResult;

use crate::models::{ActionRequest, ActionResponse, Report};

/// The moderation backend, as seen by the queue.
#[async_trait]
pub trait ReportService: Send + Sync {
    /// `GET moderation/incident/{id}`
    async fn fetch(&self, report_id: i64) -> AppResult<Report>;

    /// `POST moderation/incident/{id}`
    async fn act(&self, request: &ActionRequest) -> AppResult<ActionResponse>;
}

pub struct HttpReportService {
    client: ApiClient,
}

impl HttpReportService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

fn incident_path(report_id: i64) -> String {
    format!("moderation/incident/{report_id}")
}

#[async_trait]
impl ReportService for HttpReportService {
    async fn fetch(&self, report_id: i64) -> AppResult<Report> {
        self.client.get_json(&incident_path(report_id)).await
    }

    async fn act(&self, request: &ActionRequest) -> AppResult<ActionResponse> {
        tracing::debug!(report_id = request.id, action = %request.action, "sending report action");
        self.client.post_json(&incident_path(request.id), request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReportAction;
    use serde_json::json;

    #[test]
    fn actions_post_to_the_incident_path() {
        assert_eq!(incident_path(42), "moderation/incident/42");
    }

    #[test]
    fn resolve_body_carries_helpfulness() {
        let body = serde_json::to_value(ActionRequest::resolve(42, false)).unwrap();
        assert_eq!(body, json!({ "id": 42, "action": "resolve", "was_helpful": false }));

        let claim = serde_json::to_value(ActionRequest::new(42, ReportAction::Claim)).unwrap();
        assert_eq!(claim, json!({ "id": 42, "action": "claim" }));
    }
}
