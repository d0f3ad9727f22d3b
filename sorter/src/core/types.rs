//! Shared deterministic types for the coordinator.
//!
//! These types define stable contracts between the core logic, the stores and
//! the transport. They must not depend on external state or I/O.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Wire/storage format for batch timestamps (server-local time).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Identifier used for `RunState::batch_id` before any batch exists.
pub const SENTINEL_BATCH_ID: i64 = 1;

/// Per-batch tallies of sized and graded beans.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchCounts {
    pub total: u64,
    pub large: u64,
    pub medium: u64,
    pub small: u64,
    pub quality_good: u64,
    pub quality_bad: u64,
}

/// One persisted sorting run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    /// Store-assigned, monotonically increasing, never reused.
    pub id: i64,
    /// Display number; unique within a calendar month only.
    pub batch_number: i64,
    #[serde(flatten)]
    pub counts: BatchCounts,
    /// Set once at insert.
    #[serde(rename = "timestamp", with = "timestamp_text")]
    pub created_at: NaiveDateTime,
}

/// Insert request for the batch store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBatch {
    pub batch_number: i64,
    pub counts: BatchCounts,
    pub created_at: NaiveDateTime,
}

/// The single shared control record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunState {
    /// True while the device is actively processing beans.
    pub is_sorting: bool,
    /// Batch currently being written to. May not resolve before the first
    /// batch is created.
    pub batch_id: i64,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            is_sorting: false,
            batch_id: SENTINEL_BATCH_ID,
        }
    }
}

/// Control command issued by the companion client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Toggle,
    NewBatch,
    Continue,
    /// Anything the coordinator does not recognize, kept verbatim for logs.
    Unknown(String),
}

impl Command {
    /// Parse a wire command. Matching is case-sensitive; unrecognized input is
    /// kept as [`Command::Unknown`] rather than rejected here.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "TOGGLE" => Command::Toggle,
            "NEW_BATCH" => Command::NewBatch,
            "CONTINUE" => Command::Continue,
            other => Command::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Command::Toggle => "TOGGLE",
            Command::NewBatch => "NEW_BATCH",
            Command::Continue => "CONTINUE",
            Command::Unknown(raw) => raw,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only hardware health sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub cpu_percent: f32,
    pub cpu_temp_c: f32,
    pub mem_percent: f32,
    pub mem_used: u64,
    pub mem_total: u64,
    pub disk_percent: f32,
    pub disk_used: u64,
    pub disk_total: u64,
}

mod timestamp_text {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::TIMESTAMP_FORMAT;

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, ser: S) -> Result<S::Ok, S::Error> {
        ser.collect_str(&value.format(TIMESTAMP_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(de)?;
        NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_parse_is_case_sensitive() {
        assert_eq!(Command::parse("TOGGLE"), Command::Toggle);
        assert_eq!(Command::parse("NEW_BATCH"), Command::NewBatch);
        assert_eq!(Command::parse("CONTINUE"), Command::Continue);
        assert_eq!(
            Command::parse("toggle"),
            Command::Unknown("toggle".to_string())
        );
    }

    #[test]
    fn run_state_uses_camel_case_on_the_wire() {
        let json = serde_json::to_string(&RunState::default()).expect("serialize");
        assert_eq!(json, r#"{"isSorting":false,"batchId":1}"#);
    }

    /// Batch rows keep the column names the companion client reads.
    #[test]
    fn batch_serializes_flat_with_timestamp() {
        let created_at =
            NaiveDateTime::parse_from_str("2026-03-04 05:06:07", TIMESTAMP_FORMAT).expect("ts");
        let batch = Batch {
            id: 7,
            batch_number: 2,
            counts: BatchCounts {
                total: 10,
                quality_good: 9,
                quality_bad: 1,
                ..BatchCounts::default()
            },
            created_at,
        };
        let value = serde_json::to_value(&batch).expect("serialize");
        assert_eq!(value["id"], 7);
        assert_eq!(value["batch_number"], 2);
        assert_eq!(value["total"], 10);
        assert_eq!(value["quality_bad"], 1);
        assert_eq!(value["timestamp"], "2026-03-04 05:06:07");

        let back: Batch = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back, batch);
    }

    #[test]
    fn counts_default_missing_fields_to_zero() {
        let counts: BatchCounts = serde_json::from_str(r#"{"total":5}"#).expect("parse");
        assert_eq!(
            counts,
            BatchCounts {
                total: 5,
                ..BatchCounts::default()
            }
        );
    }
}
