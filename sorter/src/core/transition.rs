//! Run-state transitions for control commands.
//!
//! Each command is first planned (which store access it needs), then the
//! coordinator performs that access and feeds the result back into one of the
//! pure transition functions below.

use crate::core::types::{Command, RunState};

/// Store access a command requires before its state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    /// Flip `is_sorting`; no batch store access.
    Flip,
    /// Insert a new batch using running numbering, then point at it.
    CreateBatch,
    /// Look up the most recently created batch and point at it.
    ResumeLatest,
    /// Unrecognized command; state is echoed back unchanged.
    Ignore { command: String },
}

pub fn plan(command: &Command) -> Plan {
    match command {
        Command::Toggle => Plan::Flip,
        Command::NewBatch => Plan::CreateBatch,
        Command::Continue => Plan::ResumeLatest,
        Command::Unknown(raw) => Plan::Ignore {
            command: raw.clone(),
        },
    }
}

pub fn toggle(state: RunState) -> RunState {
    RunState {
        is_sorting: !state.is_sorting,
        ..state
    }
}

/// New batches start paused.
pub fn after_new_batch(_state: RunState, new_id: i64) -> RunState {
    RunState {
        is_sorting: false,
        batch_id: new_id,
    }
}

/// Resume the latest batch, paused. Without any batch the state is unchanged.
pub fn after_continue(state: RunState, latest_id: Option<i64>) -> RunState {
    match latest_id {
        Some(batch_id) => RunState {
            is_sorting: false,
            batch_id,
        },
        None => state,
    }
}
