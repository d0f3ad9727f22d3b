//! Shared application state for the HTTP server.

use std::sync::Arc;

use sorter::coordinator::Coordinator;
use sorter::core::types::RunState;
use tokio::sync::broadcast;

use crate::notifications::NotificationLog;

/// Events broadcast to SSE clients and the notification log after mutations.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    RunStateChanged {
        command: String,
        state: RunState,
    },
    BatchCreated {
        id: i64,
        batch_number: i64,
    },
    BatchUpdated {
        id: i64,
    },
    /// A request was answered with a fail-open default.
    Degraded {
        message: String,
    },
}

/// Shared state accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    /// Broadcast sender for change events.
    pub event_tx: Arc<broadcast::Sender<ChangeEvent>>,
    pub notifications: Arc<NotificationLog>,
}

impl AppState {
    pub fn new(coordinator: Coordinator) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            coordinator: Arc::new(coordinator),
            event_tx: Arc::new(event_tx),
            notifications: Arc::new(NotificationLog::default()),
        }
    }

    /// Record and broadcast an event. Having no subscribers is not an error.
    pub fn publish(&self, event: ChangeEvent) {
        self.notifications.record(&event);
        let _ = self.event_tx.send(event);
    }
}
