//! Batch numbering.
//!
//! Two independent schemes coexist and must not be merged:
//!
//! - **Monthly**: display numbering for manually created batches. Restarts at 1
//!   every calendar month (server-local time).
//! - **Running**: `NEW_BATCH` numbering, one past the highest number ever
//!   stored, regardless of month.

use std::fmt::Display;

use chrono::NaiveDateTime;
use tracing::warn;

use crate::core::outcome::{BestEffort, Degradation};

/// `YYYY-MM` key of the month containing `at`.
pub fn month_key(at: NaiveDateTime) -> String {
    at.format("%Y-%m").to_string()
}

/// Next monthly number given the result of counting this month's batches.
///
/// A failed count is treated as zero, so numbering restarts at 1.
pub fn monthly_batch_number<E: Display>(count: Result<i64, E>) -> BestEffort<i64> {
    match count {
        Ok(count) => BestEffort::healthy(count.max(0) + 1),
        Err(err) => {
            warn!(error = %err, "monthly batch count failed, numbering from 1");
            BestEffort::degraded(
                1,
                Degradation::MonthlyCountFailed {
                    reason: err.to_string(),
                },
            )
        }
    }
}

/// Next running number given the highest stored number (0 when empty).
pub fn running_batch_number(max: i64) -> i64 {
    max.max(0) + 1
}
