//! Progress meter: completed vs. total work units for one in-flight execution.

use serde::{Deserialize, Serialize};

use crate::id::{MeterId, RecordId};

/// Ephemeral counter owned by a record for the duration of one execution.
///
/// `current_count` may overshoot `total_count` (work is allowed to miscount);
/// [`ProgressMeter::progress`] clamps instead of rejecting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressMeter {
    pub id: MeterId,
    /// Owning record.
    pub record_id: RecordId,
    current_count: u64,
    total_count: i64,
}

impl ProgressMeter {
    pub fn new(record_id: RecordId, total_count: i64) -> Self {
        Self {
            id: MeterId::new(),
            record_id,
            current_count: 0,
            total_count: coerce_total(total_count),
        }
    }

    pub fn current_count(&self) -> u64 {
        self.current_count
    }

    pub fn total_count(&self) -> i64 {
        self.total_count
    }

    /// Set the total. Non-positive totals are treated as a single unit of work.
    pub fn set_total_count(&mut self, count: i64) {
        self.total_count = coerce_total(count);
    }

    pub fn increment(&mut self) {
        self.increment_by(1);
    }

    pub fn increment_by(&mut self, units: u64) {
        self.current_count = self.current_count.saturating_add(units);
    }

    /// Completion percentage in `[0, 100]`.
    pub fn progress(&self) -> u8 {
        percent(self.current_count, self.total_count)
    }
}

fn coerce_total(count: i64) -> i64 {
    if count <= 0 { 1 } else { count }
}

/// `floor(current / total * 100)` clamped to `[0, 100]`; a corrupted total yields 0.
pub fn percent(current: u64, total: i64) -> u8 {
    if total <= 0 {
        return 0;
    }
    let pct = (current as u128 * 100) / total as u128;
    pct.min(100) as u8
}
