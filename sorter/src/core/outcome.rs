//! Best-effort results.
//!
//! The coordinator prefers answering with a safe default over failing a
//! request. Every time it does so it records a [`Degradation`] so callers and
//! tests can tell a healthy answer from a degraded one.

use std::fmt;

use serde::Serialize;

/// A fail-open event: something went wrong and a default was substituted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Degradation {
    /// Persisted run state was unreadable or corrupt and was reset to defaults.
    RunStateReset { reason: String },
    /// Counting this month's batches failed; numbering restarted at 1.
    MonthlyCountFailed { reason: String },
    /// The active batch id does not resolve to a row; zeroed counts returned.
    BatchMissing { batch_id: i64 },
    /// The command was not recognized and was ignored.
    UnknownCommand { command: String },
    /// A hardware metric could not be sampled; zero reported instead.
    MetricUnavailable { metric: String, reason: String },
}

impl fmt::Display for Degradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Degradation::RunStateReset { reason } => {
                write!(f, "run state reset to defaults: {reason}")
            }
            Degradation::MonthlyCountFailed { reason } => {
                write!(f, "monthly batch count failed, numbering from 1: {reason}")
            }
            Degradation::BatchMissing { batch_id } => {
                write!(f, "batch {batch_id} not found, counts zeroed")
            }
            Degradation::UnknownCommand { command } => {
                write!(f, "unknown command '{command}' ignored")
            }
            Degradation::MetricUnavailable { metric, reason } => {
                write!(f, "metric {metric} unavailable: {reason}")
            }
        }
    }
}

/// A value plus the degradations hit while producing it.
#[derive(Debug, Clone, PartialEq)]
pub struct BestEffort<T> {
    pub value: T,
    pub degradations: Vec<Degradation>,
}

impl<T> BestEffort<T> {
    pub fn healthy(value: T) -> Self {
        Self {
            value,
            degradations: Vec::new(),
        }
    }

    pub fn degraded(value: T, degradation: Degradation) -> Self {
        Self {
            value,
            degradations: vec![degradation],
        }
    }

    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> BestEffort<U> {
        BestEffort {
            value: f(self.value),
            degradations: self.degradations,
        }
    }

    /// Take the value of a nested result, keeping its degradations.
    pub fn absorb<U>(&mut self, other: BestEffort<U>) -> U {
        self.degradations.extend(other.degradations);
        other.value
    }

    pub fn push(&mut self, degradation: Degradation) {
        self.degradations.push(degradation);
    }
}

impl<T: Serialize> BestEffort<T> {
    /// Flat JSON view: the value's fields plus `degraded` and `degradations`.
    pub fn report(&self) -> Report<'_, T> {
        Report {
            value: &self.value,
            degraded: self.is_degraded(),
            degradations: &self.degradations,
        }
    }
}

/// Serializable view of a [`BestEffort`] whose value is a JSON object.
#[derive(Debug, Serialize)]
pub struct Report<'a, T: Serialize> {
    #[serde(flatten)]
    pub value: &'a T,
    pub degraded: bool,
    pub degradations: &'a [Degradation],
}
