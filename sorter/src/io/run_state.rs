//! Run state storage (`<data_dir>/run_state.json`).
//!
//! The store only loads and replaces the whole record. Read-modify-write is
//! owned by the coordinator, which serializes it.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::core::outcome::{BestEffort, Degradation};
use crate::core::types::RunState;

/// File-backed store for the shared [`RunState`] singleton.
#[derive(Debug, Clone)]
pub struct RunStateStore {
    path: PathBuf,
}

impl RunStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load the persisted state, creating it with defaults when absent.
    ///
    /// An unreadable or corrupt file is treated as absent: defaults are
    /// written back and the result is flagged degraded. Failing to write the
    /// defaults is an error.
    pub fn load(&self) -> Result<BestEffort<RunState>> {
        let loaded = self.peek()?;
        if loaded.is_degraded() || !self.path.exists() {
            self.save(&loaded.value)?;
        }
        Ok(loaded)
    }

    /// Read-only load. Never writes; absent or corrupt files yield defaults.
    pub fn peek(&self) -> Result<BestEffort<RunState>> {
        debug!(path = %self.path.display(), "loading run state");
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no run state yet, using defaults");
                return Ok(BestEffort::healthy(RunState::default()));
            }
            Err(err) => return Ok(reset(&self.path, format!("read failed: {err}"))),
        };
        match serde_json::from_str::<RunState>(&contents) {
            Ok(state) => {
                debug!(
                    is_sorting = state.is_sorting,
                    batch_id = state.batch_id,
                    "run state loaded"
                );
                Ok(BestEffort::healthy(state))
            }
            Err(err) => Ok(reset(&self.path, format!("parse failed: {err}"))),
        }
    }

    /// Atomically replace the persisted state (temp file + rename).
    pub fn save(&self, state: &RunState) -> Result<()> {
        debug!(
            path = %self.path.display(),
            is_sorting = state.is_sorting,
            batch_id = state.batch_id,
            "writing run state"
        );
        let mut buf = serde_json::to_string_pretty(state)?;
        buf.push('\n');
        write_atomic(&self.path, &buf)
    }
}

fn reset(path: &Path, reason: String) -> BestEffort<RunState> {
    warn!(path = %path.display(), %reason, "run state unusable, resetting to defaults");
    BestEffort::degraded(RunState::default(), Degradation::RunStateReset { reason })
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("run state path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp run state {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace run state {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Verifies save → load preserves all fields.
    #[test]
    fn run_state_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = RunStateStore::new(temp.path().join("run_state.json"));

        let state = RunState {
            is_sorting: true,
            batch_id: 17,
        };

        store.save(&state).expect("save");
        let loaded = store.load().expect("load");
        assert_eq!(loaded, BestEffort::healthy(state));
    }

    /// First access creates the file with defaults.
    #[test]
    fn missing_state_is_created_with_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("state").join("run_state.json");
        let store = RunStateStore::new(&path);

        let loaded = store.load().expect("load");
        assert_eq!(loaded, BestEffort::healthy(RunState::default()));

        let contents = fs::read_to_string(&path).expect("read");
        assert_eq!(contents, "{\n  \"isSorting\": false,\n  \"batchId\": 1\n}\n");
    }

    /// Corrupt files fail open to defaults and are overwritten.
    #[test]
    fn corrupt_state_resets_and_is_flagged() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("run_state.json");
        fs::write(&path, "{\"isSorting\": tru").expect("write");
        let store = RunStateStore::new(&path);

        let loaded = store.load().expect("load");
        assert_eq!(loaded.value, RunState::default());
        assert!(matches!(
            loaded.degradations.as_slice(),
            [Degradation::RunStateReset { .. }]
        ));

        let again = store.load().expect("reload");
        assert!(!again.is_degraded(), "defaults were written back");
    }

    #[test]
    fn peek_does_not_create_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("run_state.json");
        let store = RunStateStore::new(&path);

        let peeked = store.peek().expect("peek");
        assert_eq!(peeked.value, RunState::default());
        assert!(!path.exists());
    }
}
