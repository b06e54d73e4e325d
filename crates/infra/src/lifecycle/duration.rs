//! Execution time accounting.

use std::time::Duration;

use serde::Serialize;

use stint_core::JobRecord;

use crate::store::{RecordStore, StoreError};

/// Adds elapsed time to a record's duration field.
///
/// Read-then-add, not atomic: two executions of the same record finishing
/// together can lose one increment.
pub(crate) struct DurationAccumulator<'a> {
    store: &'a dyn RecordStore,
    field: &'a str,
}

impl<'a> DurationAccumulator<'a> {
    pub(crate) fn new(store: &'a dyn RecordStore, field: &'a str) -> Self {
        Self { store, field }
    }

    /// Returns the new total in seconds.
    pub(crate) fn add<R: JobRecord>(&self, record: &mut R, elapsed: Duration) -> Result<f64, StoreError> {
        let id = record.id();
        let current = self.store.duration(id, self.field)?.unwrap_or(0.0);
        let total = current + elapsed.as_secs_f64();
        self.store.write_duration(id, self.field, total)?;
        record.job_mut().set_duration_total(total);
        Ok(total)
    }
}

/// Summary of accumulated durations across records of one kind, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DurationStats {
    pub count: usize,
    pub total: f64,
    pub average: f64,
    pub min: f64,
    pub max: f64,
}

impl DurationStats {
    /// `None` for an empty sample.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let total: f64 = samples.iter().sum();
        let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
        let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some(Self {
            count: samples.len(),
            total,
            average: total / samples.len() as f64,
            min,
            max,
        })
    }
}
