//! I/O collaborators for the coordinator.

pub mod batch_store;
pub mod config;
pub mod metrics;
pub mod run_state;
