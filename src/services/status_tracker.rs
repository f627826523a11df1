use crate::domain::{RuntimeEvent, ServiceId, ServiceStatus, StatusPatch, StreamEvent};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, warn};

/// Snapshot of every tracked service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusBoard {
    statuses: HashMap<ServiceId, ServiceStatus>,
    observed: HashSet<ServiceId>,
}

impl StatusBoard {
    fn new() -> Self {
        Self {
            statuses: ServiceId::ALL
                .into_iter()
                .map(|id| (id, ServiceStatus::absent()))
                .collect(),
            observed: HashSet::new(),
        }
    }

    pub fn get(&self, id: ServiceId) -> ServiceStatus {
        self.statuses.get(&id).copied().unwrap_or_default()
    }

    /// Status of `id`, or `None` if nothing has been recorded for it yet.
    pub fn observed(&self, id: ServiceId) -> Option<ServiceStatus> {
        self.observed.contains(&id).then(|| self.get(id))
    }
}

/// Outcome of feeding a stream event to the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Pending,
    Succeeded,
    Failed(String),
}

/// Per-service status records, observable by the health monitor.
#[derive(Debug, Clone)]
pub struct StatusTracker {
    board: Arc<watch::Sender<StatusBoard>>,
}

impl StatusTracker {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(StatusBoard::new());
        Self { board: Arc::new(tx) }
    }

    pub fn get(&self, id: ServiceId) -> ServiceStatus {
        self.board.borrow().get(id)
    }

    pub fn snapshot(&self) -> StatusBoard {
        self.board.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusBoard> {
        self.board.subscribe()
    }

    /// Merges `patch` into the record of `id` as one atomic step.
    pub fn update(&self, id: ServiceId, patch: StatusPatch) {
        self.board.send_modify(|board| {
            board.statuses.entry(id).or_default().merge(patch);
            board.observed.insert(id);
        });
    }

    pub fn mark_removed(&self, id: ServiceId) {
        self.update(id, StatusPatch::default().exists(false));
    }

    pub fn mark_started(&self, id: ServiceId) {
        self.update(id, StatusPatch::default().running(true));
    }

    pub fn mark_stopped(&self, id: ServiceId) {
        self.update(id, StatusPatch::default().running(false));
    }

    pub fn apply_event(&self, event: &RuntimeEvent) -> EventOutcome {
        let service = event.service;
        match &event.kind {
            StreamEvent::Started => {
                debug!("[{service}] comando iniciado");
                EventOutcome::Pending
            }
            StreamEvent::Output(line) => {
                debug!("[{service}] {line}");
                EventOutcome::Pending
            }
            StreamEvent::Failed(message) => {
                error!("[{service}] Erro: {message}");
                EventOutcome::Failed(message.clone())
            }
            StreamEvent::Closed(0) => {
                self.update(service, StatusPatch::default().exists(true).running(true));
                EventOutcome::Succeeded
            }
            StreamEvent::Closed(code) => {
                warn!("[{service}] terminou com código {code}");
                EventOutcome::Failed(format!("código de saída {code}"))
            }
        }
    }
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_with_absent_unobserved_records() {
        let tracker = StatusTracker::new();
        for id in ServiceId::ALL {
            assert_eq!(tracker.get(id), ServiceStatus::absent());
            assert_eq!(tracker.snapshot().observed(id), None);
        }
    }

    #[test]
    fn test_update_marks_observed() {
        let tracker = StatusTracker::new();
        tracker.update(ServiceId::App, ServiceStatus::absent().into());
        assert_eq!(
            tracker.snapshot().observed(ServiceId::App),
            Some(ServiceStatus::absent())
        );
        assert_eq!(tracker.snapshot().observed(ServiceId::Mongo), None);
    }

    #[test]
    fn test_mark_helpers() {
        let tracker = StatusTracker::new();

        tracker.mark_started(ServiceId::Mongo);
        assert!(tracker.get(ServiceId::Mongo).exists);
        assert!(tracker.get(ServiceId::Mongo).is_running);

        tracker.mark_stopped(ServiceId::Mongo);
        assert!(tracker.get(ServiceId::Mongo).exists);
        assert!(!tracker.get(ServiceId::Mongo).is_running);

        tracker.mark_removed(ServiceId::Mongo);
        assert_eq!(tracker.get(ServiceId::Mongo), ServiceStatus::absent());
    }

    #[test]
    fn test_updates_are_keyed_per_service() {
        let tracker = StatusTracker::new();
        tracker.mark_started(ServiceId::Kafka);
        tracker.mark_started(ServiceId::Postman);
        tracker.mark_removed(ServiceId::Kafka);

        assert!(!tracker.get(ServiceId::Kafka).exists);
        assert!(tracker.get(ServiceId::Postman).is_running);
    }

    #[test]
    fn test_successful_close_marks_running() {
        let tracker = StatusTracker::new();
        let outcome = tracker.apply_event(&RuntimeEvent::new(
            ServiceId::Postman,
            StreamEvent::Closed(0),
        ));

        assert_eq!(outcome, EventOutcome::Succeeded);
        assert!(tracker.get(ServiceId::Postman).is_running);
    }

    #[test]
    fn test_stream_errors_leave_state_unchanged() {
        let tracker = StatusTracker::new();

        let failed = tracker.apply_event(&RuntimeEvent::new(
            ServiceId::App,
            StreamEvent::Failed("boom".into()),
        ));
        let exited = tracker.apply_event(&RuntimeEvent::new(
            ServiceId::App,
            StreamEvent::Closed(125),
        ));
        let output = tracker.apply_event(&RuntimeEvent::new(
            ServiceId::App,
            StreamEvent::Output("pulling image".into()),
        ));

        assert_eq!(failed, EventOutcome::Failed("boom".into()));
        assert!(matches!(exited, EventOutcome::Failed(_)));
        assert_eq!(output, EventOutcome::Pending);
        assert_eq!(tracker.get(ServiceId::App), ServiceStatus::absent());
    }

    #[tokio::test]
    async fn test_subscribers_see_updates() {
        let tracker = StatusTracker::new();
        let mut rx = tracker.subscribe();

        tracker.mark_started(ServiceId::App);

        rx.changed().await.unwrap();
        assert!(rx.borrow().get(ServiceId::App).is_running);
    }
}
