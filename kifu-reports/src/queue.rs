use std::sync::{Arc, Mutex, MutexGuard};

use kifu_shared::{AppError, AppResult, ErrorCode};

use crate::events::ReportEvents;
use crate::models::{ActionRequest, ActionResponse, Report, ReportAction};
use crate::preferences::ReportPreferences;
use crate::registry::{ReportRegistry, ReportRelation};
use crate::service::ReportService;

/// Result of a claim attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    Claimed(Report),
    /// The report was deleted before the claim reached the backend.
    Vanished,
    /// Another moderator got there first.
    AlreadyClaimed,
}

/// The registry plus the backend actions that mutate it.
///
/// The registry lock is only ever held for synchronous work and is released
/// before any request goes out.
pub struct ReportQueue {
    registry: Arc<Mutex<ReportRegistry>>,
    service: Arc<dyn ReportService>,
}

fn lock(registry: &Mutex<ReportRegistry>) -> MutexGuard<'_, ReportRegistry> {
    registry.lock().unwrap_or_else(|e| e.into_inner())
}

impl ReportQueue {
    pub fn new(registry: ReportRegistry, service: Arc<dyn ReportService>) -> Self {
        Self {
            registry: Arc::new(Mutex::new(registry)),
            service,
        }
    }

    fn registry(&self) -> MutexGuard<'_, ReportRegistry> {
        lock(&self.registry)
    }

    /// Run `f` against the registry under the lock.
    pub fn with_registry<R>(&self, f: impl FnOnce(&mut ReportRegistry) -> R) -> R {
        f(&mut self.registry())
    }

    // --- registry passthroughs ---

    pub fn upsert(&self, report: Report) {
        self.registry().upsert(report);
    }

    pub fn on_connect(&self) {
        self.registry().on_connect();
    }

    pub fn set_preferences(&self, preferences: ReportPreferences) {
        self.registry().set_preferences(preferences);
    }

    pub fn ignore(&self, report_id: i64) {
        self.registry().ignore(report_id);
    }

    pub fn available_reports(&self) -> Vec<Report> {
        self.registry().available_reports()
    }

    pub fn eligible_reports(&self) -> Vec<Report> {
        self.registry().eligible_reports()
    }

    pub fn sorted_reports(&self) -> Vec<Report> {
        self.registry().sorted().to_vec()
    }

    pub fn active_count(&self) -> usize {
        self.registry().active_count()
    }

    pub fn reports_left_until_goal(&self) -> usize {
        self.registry().reports_left_until_goal()
    }

    pub fn related_reports(&self, report_id: i64) -> Vec<ReportRelation> {
        self.registry().related_reports(report_id)
    }

    pub fn is_pending(&self, report_id: i64) -> bool {
        self.registry().pending(report_id).is_some()
    }

    pub fn events(&self) -> ReportEvents {
        self.registry().events().clone()
    }

    // --- lookups ---

    /// The local copy if we have one, otherwise ask the backend.
    pub async fn get_report(&self, report_id: i64) -> AppResult<Report> {
        if let Some(report) = self.registry().get(report_id).cloned() {
            return Ok(report);
        }

        match self.service.fetch(report_id).await {
            Ok(report) => Ok(report),
            Err(e) if e.error_code() == ErrorCode::NotFound => {
                Err(AppError::new(ErrorCode::ReportNotFound, "Report not found"))
            }
            Err(e) => Err(e),
        }
    }

    // --- actions ---

    pub async fn claim(&self, report_id: i64) -> AppResult<ClaimOutcome> {
        let response = self.perform(ActionRequest::new(report_id, ReportAction::Claim)).await?;
        Ok(match response {
            ActionResponse::Report(report) => ClaimOutcome::Claimed(*report),
            ActionResponse::Vanished => {
                tracing::info!(report_id, "Report was removed");
                ClaimOutcome::Vanished
            }
            ActionResponse::AlreadyClaimed => {
                tracing::info!(report_id, "Report was removed");
                ClaimOutcome::AlreadyClaimed
            }
        })
    }

    pub async fn unclaim(&self, report_id: i64) -> AppResult<Report> {
        let response = self.perform(ActionRequest::new(report_id, ReportAction::Unclaim)).await?;
        expect_report(report_id, response)
    }

    pub async fn steal(&self, report_id: i64) -> AppResult<Report> {
        let response = self.perform(ActionRequest::new(report_id, ReportAction::Steal)).await?;
        expect_report(report_id, response)
    }

    pub async fn reopen(&self, report_id: i64) -> AppResult<Report> {
        let response = self.perform(ActionRequest::new(report_id, ReportAction::Reopen)).await?;
        expect_report(report_id, response)
    }

    /// Close a report. It leaves the queue immediately; if the backend
    /// rejects the request it is put back.
    ///
    /// Returns the resolved report, or `None` when the backend no longer had it.
    pub async fn resolve(&self, report_id: i64, helpful: bool) -> AppResult<Option<Report>> {
        let response = self.perform(ActionRequest::resolve(report_id, helpful)).await?;
        Ok(match response {
            ActionResponse::Report(report) => Some(*report),
            ActionResponse::Vanished | ActionResponse::AlreadyClaimed => {
                tracing::info!(report_id, "Report was removed");
                None
            }
        })
    }

    pub async fn good_report(&self, report_id: i64) -> AppResult<Option<Report>> {
        self.resolve(report_id, true).await
    }

    pub async fn bad_report(&self, report_id: i64) -> AppResult<Option<Report>> {
        self.resolve(report_id, false).await
    }

    /// Send an action and fold the answer back into the registry.
    ///
    /// The request runs on its own task: a caller that goes away does not
    /// cancel it, and the answer is applied whenever it arrives.
    async fn perform(&self, request: ActionRequest) -> AppResult<ActionResponse> {
        let report_id = request.id;

        self.registry()
            .begin_action(report_id, request.action)
            .map_err(|pending| {
                AppError::new(
                    ErrorCode::ActionPending,
                    format!("{} already in progress for report {report_id}", pending.action),
                )
            })?;

        let registry = self.registry.clone();
        let service = self.service.clone();
        let task = tokio::spawn(async move {
            let result = service.act(&request).await;
            settle(&registry, &request, &result);
            result
        });

        match task.await {
            Ok(result) => result,
            Err(e) => {
                // settle never ran
                tracing::error!(report_id, error = %e, "report action task failed");
                lock(&self.registry).abandon_action(report_id);
                Err(AppError::internal(format!("report action task failed: {e}")))
            }
        }
    }
}

fn settle(registry: &Mutex<ReportRegistry>, request: &ActionRequest, result: &AppResult<ActionResponse>) {
    let report_id = request.id;
    let mut registry = lock(registry);
    match result {
        Ok(response) => {
            registry.confirm_action(report_id);
            if let ActionResponse::Report(report) = response {
                registry.upsert(report.as_ref().clone());
            }
            tracing::info!(report_id, action = %request.action, "report action confirmed");
        }
        Err(e) => {
            tracing::warn!(report_id, action = %request.action, error = %e, "report action failed");
            registry.abandon_action(report_id);
        }
    }
}

fn expect_report(report_id: i64, response: ActionResponse) -> AppResult<Report> {
    match response {
        ActionResponse::Report(report) => Ok(*report),
        ActionResponse::Vanished => Err(AppError::new(ErrorCode::ReportNotFound, "Report was removed")),
        ActionResponse::AlreadyClaimed => Err(AppError::new(
            ErrorCode::ActionPending,
            format!("report {report_id} is claimed by another moderator"),
        )),
    }
}
