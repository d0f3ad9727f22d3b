//! Server-Sent Events stream of coordinator changes.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde::Serialize;
use sorter::core::types::RunState;
use tokio::sync::broadcast;
use tracing::warn;

use crate::state::{AppState, ChangeEvent};

#[derive(Serialize)]
struct SsePayload {
    #[serde(rename = "type")]
    event_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    command: Option<String>,
    #[serde(rename = "runState", skip_serializing_if = "Option::is_none")]
    run_state: Option<RunState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    batch_number: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl SsePayload {
    fn new(event_type: &'static str) -> Self {
        Self {
            event_type,
            command: None,
            run_state: None,
            id: None,
            batch_number: None,
            message: None,
        }
    }
}

impl From<&ChangeEvent> for SsePayload {
    fn from(event: &ChangeEvent) -> Self {
        match event {
            ChangeEvent::RunStateChanged { command, state } => SsePayload {
                command: Some(command.clone()),
                run_state: Some(*state),
                ..SsePayload::new("run_state_changed")
            },
            ChangeEvent::BatchCreated { id, batch_number } => SsePayload {
                id: Some(*id),
                batch_number: Some(*batch_number),
                ..SsePayload::new("batch_created")
            },
            ChangeEvent::BatchUpdated { id } => SsePayload {
                id: Some(*id),
                ..SsePayload::new("batch_updated")
            },
            ChangeEvent::Degraded { message } => SsePayload {
                message: Some(message.clone()),
                ..SsePayload::new("degraded")
            },
        }
    }
}

/// SSE endpoint handler.
pub async fn events_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.event_tx.subscribe();

    let stream = async_stream::stream! {
        // Send initial connected event
        yield Ok(Event::default().event("connected").data("{}"));

        loop {
            match rx.recv().await {
                Ok(change_event) => {
                    let payload = SsePayload::from(&change_event);
                    if let Ok(json) = serde_json::to_string(&payload) {
                        yield Ok(Event::default().event("change").data(json));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "SSE client lagged, some events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_state_payload_carries_state() {
        let payload = SsePayload::from(&ChangeEvent::RunStateChanged {
            command: "NEW_BATCH".to_string(),
            state: RunState {
                is_sorting: false,
                batch_id: 3,
            },
        });
        let json = serde_json::to_value(&payload).expect("serialize");
        assert_eq!(json["type"], "run_state_changed");
        assert_eq!(json["command"], "NEW_BATCH");
        assert_eq!(json["runState"]["batchId"], 3);
        assert!(json.get("id").is_none());
    }

    #[test]
    fn batch_created_payload_omits_state() {
        let payload = SsePayload::from(&ChangeEvent::BatchCreated {
            id: 8,
            batch_number: 2,
        });
        let json = serde_json::to_value(&payload).expect("serialize");
        assert_eq!(json["type"], "batch_created");
        assert_eq!(json["id"], 8);
        assert_eq!(json["batch_number"], 2);
        assert!(json.get("runState").is_none());
    }
}
