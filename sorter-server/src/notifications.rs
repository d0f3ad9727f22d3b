//! In-memory notification feed for the companion client's alerts tab.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde::Serialize;
use sorter::coordinator::local_now;
use sorter::core::types::TIMESTAMP_FORMAT;

use crate::state::ChangeEvent;

/// Oldest notifications are dropped beyond this many.
const CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Warning,
    Success,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub timestamp: String,
}

#[derive(Default)]
pub struct NotificationLog {
    inner: Mutex<LogInner>,
}

#[derive(Default)]
struct LogInner {
    next_id: u64,
    entries: VecDeque<Notification>,
}

impl NotificationLog {
    /// Record a notification for `event`, if it warrants one.
    pub fn record(&self, event: &ChangeEvent) {
        let Some((kind, title, message)) = describe(event) else {
            return;
        };
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.next_id += 1;
        let notification = Notification {
            id: inner.next_id,
            kind,
            title,
            message,
            timestamp: local_now().format(TIMESTAMP_FORMAT).to_string(),
        };
        inner.entries.push_front(notification);
        inner.entries.truncate(CAPACITY);
    }

    /// Newest first.
    pub fn list(&self) -> Vec<Notification> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.iter().cloned().collect()
    }
}

fn describe(event: &ChangeEvent) -> Option<(NotificationKind, String, String)> {
    match event {
        ChangeEvent::RunStateChanged { command, state } => match command.as_str() {
            "TOGGLE" if state.is_sorting => Some((
                NotificationKind::Info,
                "Sorting started".to_string(),
                format!("Sorting into batch {}", state.batch_id),
            )),
            "TOGGLE" => Some((
                NotificationKind::Info,
                "Sorting paused".to_string(),
                format!("Batch {} paused", state.batch_id),
            )),
            "NEW_BATCH" => Some((
                NotificationKind::Success,
                "New batch".to_string(),
                format!("Batch {} created and ready", state.batch_id),
            )),
            "CONTINUE" => Some((
                NotificationKind::Info,
                "Batch resumed".to_string(),
                format!("Continuing batch {}", state.batch_id),
            )),
            _ => None,
        },
        ChangeEvent::BatchCreated { batch_number, .. } => Some((
            NotificationKind::Success,
            "Batch saved".to_string(),
            format!("Batch #{batch_number} saved"),
        )),
        ChangeEvent::BatchUpdated { .. } => None,
        ChangeEvent::Degraded { message } => Some((
            NotificationKind::Warning,
            "Degraded response".to_string(),
            message.clone(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use sorter::core::types::RunState;

    use super::*;

    #[test]
    fn list_is_newest_first_with_increasing_ids() {
        let log = NotificationLog::default();
        log.record(&ChangeEvent::BatchCreated {
            id: 1,
            batch_number: 1,
        });
        log.record(&ChangeEvent::Degraded {
            message: "batch 9 not found, counts zeroed".to_string(),
        });

        let listed = log.list();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].kind, NotificationKind::Warning);
        assert_eq!(listed[0].id, 2);
        assert_eq!(listed[1].title, "Batch saved");
    }

    #[test]
    fn count_updates_are_not_notified() {
        let log = NotificationLog::default();
        log.record(&ChangeEvent::BatchUpdated { id: 3 });
        assert!(log.list().is_empty());
    }

    #[test]
    fn log_is_bounded() {
        let log = NotificationLog::default();
        for _ in 0..(CAPACITY + 5) {
            log.record(&ChangeEvent::RunStateChanged {
                command: "TOGGLE".to_string(),
                state: RunState::default(),
            });
        }
        let listed = log.list();
        assert_eq!(listed.len(), CAPACITY);
        assert_eq!(listed[0].id, (CAPACITY + 5) as u64);
    }

    #[test]
    fn notification_uses_client_field_names() {
        let log = NotificationLog::default();
        log.record(&ChangeEvent::RunStateChanged {
            command: "TOGGLE".to_string(),
            state: RunState {
                is_sorting: true,
                batch_id: 4,
            },
        });
        let json = serde_json::to_value(&log.list()[0]).expect("serialize");
        assert_eq!(json["type"], "info");
        assert_eq!(json["title"], "Sorting started");
        assert!(json["timestamp"].is_string());
    }
}
