//! Deterministic, pure logic shared by the coordinator.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod numbering;
pub mod outcome;
pub mod status;
pub mod transition;
pub mod types;
