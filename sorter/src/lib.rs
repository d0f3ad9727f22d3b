//! Run-state and batch-lifecycle coordinator for a cacao bean sorting device.
//!
//! The crate keeps one shared control record (`RunState`) consistent with a
//! durable table of sorting batches while a control client, the sorting
//! process and status pollers read and write concurrently. The architecture
//! enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (command transitions, batch
//!   numbering, status assembly). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting collaborators (run-state file, SQLite batch
//!   store, hardware metrics, config). Isolated behind traits for tests.
//!
//! [`coordinator`] combines the two and is the only place that touches more
//! than one store at once.

pub mod coordinator;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
