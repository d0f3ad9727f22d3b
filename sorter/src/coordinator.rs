//! Run-state and batch-lifecycle coordination.
//!
//! The coordinator is the only component that touches more than one store at
//! once. All run-state mutations and batch creations go through a single
//! writer lock, so concurrent commands cannot lose each other's updates and
//! monthly batch numbers stay distinct within this process.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result, anyhow};
use chrono::{Local, NaiveDateTime, Timelike};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::numbering::{month_key, monthly_batch_number, running_batch_number};
use crate::core::outcome::{BestEffort, Degradation};
use crate::core::status::{StatusView, assemble_status};
use crate::core::transition::{self, Plan};
use crate::core::types::{Batch, BatchCounts, Command, NewBatch, RunState};
use crate::io::batch_store::{BatchStore, SqliteBatchStore};
use crate::io::config::{CommandPolicy, SorterConfig, SorterPaths, load_config};
use crate::io::metrics::{MetricsProvider, SystemMetrics};
use crate::io::run_state::RunStateStore;

/// Failure of a control command.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    /// Only returned under [`CommandPolicy::Reject`].
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Result of the manual batch creation path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CreatedBatch {
    pub id: i64,
    pub batch_number: i64,
}

pub struct Coordinator {
    writer: Mutex<RunStateStore>,
    /// Same file as `writer`, for lock-free reads. Saves are atomic renames.
    reader: RunStateStore,
    batches: Arc<dyn BatchStore>,
    metrics: Arc<dyn MetricsProvider>,
    policy: CommandPolicy,
}

impl Coordinator {
    pub fn new(
        run_state: RunStateStore,
        batches: Arc<dyn BatchStore>,
        metrics: Arc<dyn MetricsProvider>,
        policy: CommandPolicy,
    ) -> Self {
        Self {
            reader: run_state.clone(),
            writer: Mutex::new(run_state),
            batches,
            metrics,
            policy,
        }
    }

    /// Build a coordinator over `<data_dir>` using its `config.toml`.
    pub fn open(data_dir: &Path) -> Result<Self> {
        let cfg = load_config(&data_dir.join(crate::io::config::CONFIG_FILE))?;
        Self::from_config(data_dir, &cfg)
    }

    pub fn from_config(data_dir: &Path, cfg: &SorterConfig) -> Result<Self> {
        let paths = SorterPaths::new(data_dir, cfg);
        let batches = SqliteBatchStore::open(&paths.database_path, cfg.busy_timeout())?;
        info!(
            data_dir = %paths.data_dir.display(),
            policy = ?cfg.unknown_commands,
            "coordinator ready"
        );
        Ok(Self::new(
            RunStateStore::new(paths.run_state_path),
            Arc::new(batches),
            Arc::new(SystemMetrics::new(&cfg.metrics)),
            cfg.unknown_commands,
        ))
    }

    /// Apply a control command and return the persisted state.
    ///
    /// Load, transition and save happen under the writer lock. `NEW_BATCH`
    /// inserts its row before saving state; if the process dies in between,
    /// the row exists without a pointer and `CONTINUE` picks it up.
    ///
    /// The lock is held while the batch store waits out a busy database, so
    /// other commands queue for up to the busy timeout. `status` does not.
    pub fn handle_command(
        &self,
        command: &Command,
    ) -> Result<BestEffort<RunState>, CoordinatorError> {
        let plan = transition::plan(command);
        if let Plan::Ignore { command } = &plan {
            if self.policy == CommandPolicy::Reject {
                warn!(%command, "rejecting unknown command");
                return Err(CoordinatorError::UnknownCommand(command.clone()));
            }
        }

        let store = self.writer()?;
        let mut result = store.load()?;
        let current = result.value;

        let next = match plan {
            Plan::Flip => transition::toggle(current),
            Plan::CreateBatch => {
                let batch_number = running_batch_number(self.batches.max_batch_number()?);
                let id = self.batches.insert(&NewBatch {
                    batch_number,
                    counts: BatchCounts::default(),
                    created_at: local_now(),
                })?;
                info!(id, batch_number, "new batch started");
                transition::after_new_batch(current, id)
            }
            Plan::ResumeLatest => {
                let latest = self.batches.latest()?.map(|batch| batch.id);
                if latest.is_none() {
                    debug!("continue with no batches, state unchanged");
                }
                transition::after_continue(current, latest)
            }
            Plan::Ignore { command } => {
                warn!(%command, "ignoring unknown command");
                result.push(Degradation::UnknownCommand { command });
                current
            }
        };

        store.save(&next)?;
        debug!(
            %command,
            is_sorting = next.is_sorting,
            batch_id = next.batch_id,
            "command applied"
        );
        result.value = next;
        Ok(result)
    }

    /// Current run state, creating the default record on first access.
    pub fn current_state(&self) -> Result<BestEffort<RunState>> {
        self.writer()?.load()
    }

    /// Fresh status snapshot: metrics, run state and active batch counts.
    ///
    /// Read-only. Run state is peeked without the writer lock, so polls never
    /// wait behind a command that is waiting on a busy database, and a missing
    /// or corrupt file is reported as defaults without being rewritten.
    pub fn status(&self) -> Result<BestEffort<StatusView>> {
        let mut result = BestEffort::healthy(());
        let metrics = result.absorb(self.metrics.snapshot());
        let state = result.absorb(self.reader.peek()?);
        let batch = self.batches.get_by_id(state.batch_id)?;
        let view = result.absorb(assemble_status(&metrics, state, batch.as_ref()));
        Ok(result.map(|()| view))
    }

    pub fn list_batches(&self) -> Result<Vec<Batch>> {
        self.batches.list_all()
    }

    pub fn get_batch(&self, id: i64) -> Result<Option<Batch>> {
        self.batches.get_by_id(id)
    }

    /// Manually create a batch numbered by the monthly-reset scheme.
    pub fn create_batch(&self, counts: BatchCounts) -> Result<BestEffort<CreatedBatch>> {
        self.create_batch_at(counts, local_now())
    }

    pub fn create_batch_at(
        &self,
        counts: BatchCounts,
        now: NaiveDateTime,
    ) -> Result<BestEffort<CreatedBatch>> {
        // Count and insert under the writer lock so numbers stay distinct.
        let _guard = self.writer()?;
        let month = month_key(now);
        let number = monthly_batch_number(self.batches.count_in_month(&month));
        let id = self.batches.insert(&NewBatch {
            batch_number: number.value,
            counts,
            created_at: now,
        })?;
        info!(id, batch_number = number.value, %month, "batch created");
        Ok(number.map(|batch_number| CreatedBatch { id, batch_number }))
    }

    /// Overwrite the tallies of a batch. Returns the updated row, or `None`
    /// when no batch has that id.
    pub fn record_counts(&self, id: i64, counts: BatchCounts) -> Result<Option<Batch>> {
        let Some(mut batch) = self.batches.get_by_id(id)? else {
            return Ok(None);
        };
        batch.counts = counts;
        if !self.batches.update(&batch)? {
            return Ok(None);
        }
        debug!(id, total = counts.total, "batch counts recorded");
        Ok(Some(batch))
    }

    fn writer(&self) -> Result<MutexGuard<'_, RunStateStore>> {
        self.writer
            .lock()
            .map_err(|_| anyhow!("run state writer poisoned"))
            .context("acquire run state writer")
    }
}

/// Server-local wall clock, second precision.
pub fn local_now() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}
