use tokio::sync::broadcast;

use crate::models::Report;

/// The queue's three outbound streams, one typed channel each.
///
/// Sends never block and never fail the caller: with no subscribers the
/// event is simply dropped, and a slow subscriber sees `Lagged` on its end.
#[derive(Clone)]
pub struct ReportEvents {
    incident_report: broadcast::Sender<Report>,
    active_count: broadcast::Sender<usize>,
    update: broadcast::Sender<()>,
}

impl ReportEvents {
    pub fn new(capacity: usize) -> Self {
        let (incident_report, _) = broadcast::channel(capacity);
        let (active_count, _) = broadcast::channel(capacity);
        let (update, _) = broadcast::channel(capacity);
        Self { incident_report, active_count, update }
    }

    pub fn subscribe_incident_reports(&self) -> broadcast::Receiver<Report> {
        self.incident_report.subscribe()
    }

    pub fn subscribe_active_count(&self) -> broadcast::Receiver<usize> {
        self.active_count.subscribe()
    }

    pub fn subscribe_updates(&self) -> broadcast::Receiver<()> {
        self.update.subscribe()
    }

    pub(crate) fn emit_incident_report(&self, report: Report) {
        let _ = self.incident_report.send(report);
    }

    pub(crate) fn emit_active_count(&self, count: usize) {
        let _ = self.active_count.send(count);
    }

    pub(crate) fn emit_update(&self) {
        let _ = self.update.send(());
    }

    pub fn subscriber_count(&self) -> usize {
        self.incident_report.receiver_count()
            + self.active_count.receiver_count()
            + self.update.receiver_count()
    }
}

impl Default for ReportEvents {
    fn default() -> Self {
        Self::new(256)
    }
}
