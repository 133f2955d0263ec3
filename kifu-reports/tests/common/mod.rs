#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::Notify;

use kifu_reports::clock::ManualClock;
use kifu_reports::events::ReportEvents;
use kifu_reports::models::{ActionRequest, ActionResponse, PlayerRef, Report};
use kifu_reports::notify::{IncidentNotification, Notifier};
use kifu_reports::queue::ReportQueue;
use kifu_reports::registry::ReportRegistry;
use kifu_reports::service::ReportService;
use kifu_shared::types::auth::Viewer;
use kifu_shared::{AppError, AppResult};

pub const ME: i64 = 99;

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<IncidentNotification>>,
}

impl RecordingNotifier {
    pub fn report_ids(&self) -> Vec<i64> {
        self.sent.lock().unwrap().iter().map(|n| n.report_id).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: IncidentNotification) {
        self.sent.lock().unwrap().push(notification);
    }
}

/// Backend double: answers actions from a script, optionally waiting on a gate first.
#[derive(Default)]
pub struct ScriptedService {
    responses: Mutex<VecDeque<AppResult<ActionResponse>>>,
    reports: Mutex<HashMap<i64, Report>>,
    pub requests: Mutex<Vec<ActionRequest>>,
    pub gate: Option<Arc<Notify>>,
}

impl ScriptedService {
    pub fn gated(gate: Arc<Notify>) -> Self {
        Self { gate: Some(gate), ..Default::default() }
    }

    pub fn respond(&self, response: AppResult<ActionResponse>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn respond_with_report(&self, report: Report) {
        self.respond(Ok(ActionResponse::Report(Box::new(report))));
    }

    pub fn store(&self, report: Report) {
        self.reports.lock().unwrap().insert(report.id, report);
    }

    pub fn requests(&self) -> Vec<ActionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReportService for ScriptedService {
    async fn fetch(&self, report_id: i64) -> AppResult<Report> {
        self.reports
            .lock()
            .unwrap()
            .get(&report_id)
            .cloned()
            .ok_or(AppError::Upstream { status: 404, message: "Not found".into() })
    }

    async fn act(&self, request: &ActionRequest) -> AppResult<ActionResponse> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AppError::internal("no scripted response")))
    }
}

pub fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()))
}

pub fn open(id: i64) -> Report {
    Report::new(id, "escalation")
}

pub fn claimed_by(id: i64, moderator: i64) -> Report {
    let mut report = open(id);
    report.moderator = Some(PlayerRef::new(moderator, format!("mod{moderator}")));
    report
}

pub fn ids(reports: &[Report]) -> Vec<i64> {
    reports.iter().map(|r| r.id).collect()
}

pub struct Harness {
    pub queue: Arc<ReportQueue>,
    pub service: Arc<ScriptedService>,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<RecordingNotifier>,
}

pub fn harness_with(service: ScriptedService) -> Harness {
    let clock = clock();
    let notifier = Arc::new(RecordingNotifier::default());
    let service = Arc::new(service);
    let registry = ReportRegistry::new(Viewer::moderator(ME), ReportEvents::new(64))
        .with_clock(clock.clone())
        .with_notifier(notifier.clone());
    let queue = Arc::new(ReportQueue::new(registry, service.clone()));
    Harness { queue, service, clock, notifier }
}

pub fn harness() -> Harness {
    harness_with(ScriptedService::default())
}

/// Yield until the queue shows an action in flight for `report_id`.
pub async fn wait_for_pending(queue: &ReportQueue, report_id: i64) {
    for _ in 0..1000 {
        if queue.is_pending(report_id) {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("action for report {report_id} never started");
}

/// Yield until no action is in flight for `report_id`.
pub async fn wait_for_settled(queue: &ReportQueue, report_id: i64) {
    for _ in 0..1000 {
        if !queue.is_pending(report_id) {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("action for report {report_id} never settled");
}
