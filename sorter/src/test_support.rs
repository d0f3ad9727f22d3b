//! Test-only collaborators and workspace helpers.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Result, anyhow};
use chrono::NaiveDateTime;
use tempfile::TempDir;

use crate::coordinator::Coordinator;
use crate::core::outcome::BestEffort;
use crate::core::types::{Batch, MetricsSnapshot, NewBatch, TIMESTAMP_FORMAT};
use crate::io::batch_store::{BatchStore, SqliteBatchStore};
use crate::io::config::{CommandPolicy, SorterConfig, SorterPaths};
use crate::io::metrics::MetricsProvider;
use crate::io::run_state::RunStateStore;

/// Metrics provider returning the same healthy snapshot every call.
#[derive(Debug, Clone, Copy)]
pub struct FixedMetrics(pub MetricsSnapshot);

impl FixedMetrics {
    pub fn sample() -> MetricsSnapshot {
        MetricsSnapshot {
            cpu_percent: 23.5,
            cpu_temp_c: 51.2,
            mem_percent: 37.5,
            mem_used: 3 * 1024,
            mem_total: 8 * 1024,
            disk_percent: 25.0,
            disk_used: 16,
            disk_total: 64,
        }
    }
}

impl Default for FixedMetrics {
    fn default() -> Self {
        Self(Self::sample())
    }
}

impl MetricsProvider for FixedMetrics {
    fn snapshot(&self) -> BestEffort<MetricsSnapshot> {
        BestEffort::healthy(self.0)
    }
}

/// Wraps a store and makes `count_in_month` fail while the switch is on.
pub struct FlakyCountStore<S> {
    inner: S,
    failing: AtomicBool,
}

impl<S: BatchStore> FlakyCountStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            failing: AtomicBool::new(true),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl<S: BatchStore> BatchStore for FlakyCountStore<S> {
    fn insert(&self, batch: &NewBatch) -> Result<i64> {
        self.inner.insert(batch)
    }

    fn get_by_id(&self, id: i64) -> Result<Option<Batch>> {
        self.inner.get_by_id(id)
    }

    fn max_batch_number(&self) -> Result<i64> {
        self.inner.max_batch_number()
    }

    fn latest(&self) -> Result<Option<Batch>> {
        self.inner.latest()
    }

    fn count_in_month(&self, month: &str) -> Result<i64> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("database is locked"));
        }
        self.inner.count_in_month(month)
    }

    fn list_all(&self) -> Result<Vec<Batch>> {
        self.inner.list_all()
    }

    fn update(&self, batch: &Batch) -> Result<bool> {
        self.inner.update(batch)
    }
}

/// Temporary data directory with a file-backed batch database.
pub struct TestData {
    temp: TempDir,
    paths: SorterPaths,
}

impl TestData {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir()?;
        let paths = SorterPaths::new(temp.path(), &SorterConfig::default());
        Ok(Self { temp, paths })
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    pub fn paths(&self) -> &SorterPaths {
        &self.paths
    }

    pub fn run_state_path(&self) -> PathBuf {
        self.paths.run_state_path.clone()
    }

    pub fn run_state(&self) -> RunStateStore {
        RunStateStore::new(self.run_state_path())
    }

    pub fn batch_store(&self) -> SqliteBatchStore {
        SqliteBatchStore::open(
            &self.paths.database_path,
            SorterConfig::default().busy_timeout(),
        )
        .expect("open test batch database")
    }

    /// Coordinator over this directory with fixed metrics.
    pub fn coordinator(&self, policy: CommandPolicy) -> Coordinator {
        self.coordinator_with_store(Arc::new(self.batch_store()), policy)
    }

    pub fn coordinator_with_store(
        &self,
        batches: Arc<dyn BatchStore>,
        policy: CommandPolicy,
    ) -> Coordinator {
        Coordinator::new(
            self.run_state(),
            batches,
            Arc::new(FixedMetrics::default()),
            policy,
        )
    }
}

/// Parse a `YYYY-MM-DD HH:MM:SS` literal.
pub fn at(raw: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT).expect("test timestamp")
}
