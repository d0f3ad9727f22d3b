//! Status assembly: a flat merge of metrics, run state and batch counts.

use serde::Serialize;
use tracing::warn;

use crate::core::outcome::{BestEffort, Degradation};
use crate::core::types::{Batch, BatchCounts, MetricsSnapshot, RunState};

/// Snapshot returned to status pollers. Never cached.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    pub cpu: CpuView,
    pub memory: UsageView,
    pub storage: UsageView,
    pub run_state: RunState,
    pub counts: BatchCounts,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CpuView {
    pub percent: f32,
    pub temp: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UsageView {
    pub percent: f32,
    pub used: u64,
    pub total: u64,
}

/// Join the three sources. A missing batch yields zeroed counts, not an error.
pub fn assemble_status(
    metrics: &MetricsSnapshot,
    state: RunState,
    batch: Option<&Batch>,
) -> BestEffort<StatusView> {
    let mut view = BestEffort::healthy(());
    let counts = match batch {
        Some(batch) => batch.counts,
        None => {
            warn!(batch_id = state.batch_id, "active batch not found, reporting zero counts");
            view.push(Degradation::BatchMissing {
                batch_id: state.batch_id,
            });
            BatchCounts::default()
        }
    };

    view.map(|()| StatusView {
        cpu: CpuView {
            percent: metrics.cpu_percent,
            temp: metrics.cpu_temp_c,
        },
        memory: UsageView {
            percent: metrics.mem_percent,
            used: metrics.mem_used,
            total: metrics.mem_total,
        },
        storage: UsageView {
            percent: metrics.disk_percent,
            used: metrics.disk_used,
            total: metrics.disk_total,
        },
        run_state: state,
        counts,
    })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDateTime;

    use super::*;

    fn metrics() -> MetricsSnapshot {
        MetricsSnapshot {
            cpu_percent: 12.5,
            cpu_temp_c: 48.2,
            mem_percent: 40.0,
            mem_used: 400,
            mem_total: 1000,
            disk_percent: 10.0,
            disk_used: 1,
            disk_total: 10,
        }
    }

    #[test]
    fn missing_batch_reports_zero_counts() {
        let state = RunState {
            is_sorting: true,
            batch_id: 42,
        };
        let status = assemble_status(&metrics(), state, None);
        assert_eq!(status.value.counts, BatchCounts::default());
        assert_eq!(status.value.run_state, state);
        assert_eq!(
            status.degradations,
            vec![Degradation::BatchMissing { batch_id: 42 }]
        );
    }

    #[test]
    fn status_serializes_to_client_shape() {
        let batch = Batch {
            id: 1,
            batch_number: 1,
            counts: BatchCounts {
                total: 6,
                large: 3,
                medium: 2,
                small: 1,
                quality_good: 5,
                quality_bad: 1,
            },
            created_at: NaiveDateTime::default(),
        };
        let status = assemble_status(&metrics(), RunState::default(), Some(&batch));
        assert!(!status.is_degraded());

        let json = serde_json::to_value(&status.value).expect("serialize");
        assert_eq!(json["cpu"]["percent"], 12.5);
        assert_eq!(json["memory"]["total"], 1000);
        assert_eq!(json["storage"]["used"], 1);
        assert_eq!(json["runState"]["isSorting"], false);
        assert_eq!(json["runState"]["batchId"], 1);
        assert_eq!(json["counts"]["large"], 3);
        assert_eq!(json["counts"]["quality_good"], 5);
    }
}
