//! In-memory record store for tests/dev.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use stint_core::{ErrorDetail, JobStatus, MeterId, ProgressMeter, RecordId};

use super::{RecordStore, StoreError, StoredRecord};

/// In-memory record store.
///
/// Each method takes its lock once, so every individual write is atomic the
/// way a row update would be. Sequences of calls are not.
///
/// Persistence failures can be injected to exercise fallback paths.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: RwLock<HashMap<RecordId, StoredRecord>>,
    meters: RwLock<HashMap<MeterId, ProgressMeter>>,
    rejected_targets: RwLock<HashSet<JobStatus>>,
    reject_raw_writes: AtomicBool,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Make every conditional transition into `status` fail with a storage error.
    pub fn reject_transitions_into(&self, status: JobStatus) {
        if let Ok(mut rejected) = self.rejected_targets.write() {
            rejected.insert(status);
        }
    }

    /// Make every unconditional raw write fail with a storage error.
    pub fn reject_raw_writes(&self, reject: bool) {
        self.reject_raw_writes.store(reject, Ordering::SeqCst);
    }

    pub fn clear_rejections(&self) {
        if let Ok(mut rejected) = self.rejected_targets.write() {
            rejected.clear();
        }
        self.reject_raw_writes(false);
    }

    /// Number of live progress meters.
    pub fn meter_count(&self) -> usize {
        self.meters.read().map(|m| m.len()).unwrap_or(0)
    }

    fn records(&self) -> Result<RwLockReadGuard<'_, HashMap<RecordId, StoredRecord>>, StoreError> {
        self.records.read().map_err(|_| poisoned())
    }

    fn records_mut(
        &self,
    ) -> Result<RwLockWriteGuard<'_, HashMap<RecordId, StoredRecord>>, StoreError> {
        self.records.write().map_err(|_| poisoned())
    }

    fn meters_mut(&self) -> Result<RwLockWriteGuard<'_, HashMap<MeterId, ProgressMeter>>, StoreError> {
        self.meters.write().map_err(|_| poisoned())
    }

    fn is_rejected(&self, status: JobStatus) -> bool {
        self.rejected_targets
            .read()
            .map(|r| r.contains(&status))
            .unwrap_or(false)
    }
}

fn poisoned() -> StoreError {
    StoreError::Storage("record store lock poisoned".to_string())
}

fn injected(what: &str) -> StoreError {
    StoreError::Storage(format!("injected failure: {what}"))
}

impl RecordStore for InMemoryRecordStore {
    fn insert(&self, record: StoredRecord) -> Result<(), StoreError> {
        let mut records = self.records_mut()?;
        if records.contains_key(&record.id) {
            return Err(StoreError::AlreadyExists(record.id));
        }
        records.insert(record.id, record);
        Ok(())
    }

    fn load(&self, id: RecordId) -> Result<StoredRecord, StoreError> {
        self.records()?
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    fn transition(
        &self,
        id: RecordId,
        from: &[JobStatus],
        to: JobStatus,
        error_detail: Option<&ErrorDetail>,
    ) -> Result<(), StoreError> {
        if self.is_rejected(to) {
            return Err(injected(&format!("transition into '{to}'")));
        }

        let mut records = self.records_mut()?;
        let record = records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if !from.contains(&record.status) {
            return Err(StoreError::StatusConflict {
                id,
                expected: from.to_vec(),
                actual: record.status,
            });
        }
        record.status = to;
        if let Some(detail) = error_detail {
            record.error_detail = detail.clone();
        }
        Ok(())
    }

    fn write_raw(
        &self,
        id: RecordId,
        status: JobStatus,
        error_detail: &ErrorDetail,
    ) -> Result<(), StoreError> {
        if self.reject_raw_writes.load(Ordering::SeqCst) {
            return Err(injected("raw write"));
        }

        let mut records = self.records_mut()?;
        let record = records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        record.status = status;
        record.error_detail = error_detail.clone();
        Ok(())
    }

    fn duration(&self, id: RecordId, field: &str) -> Result<Option<f64>, StoreError> {
        let records = self.records()?;
        let record = records.get(&id).ok_or(StoreError::NotFound(id))?;
        Ok(record.durations.get(field).copied())
    }

    fn write_duration(&self, id: RecordId, field: &str, seconds: f64) -> Result<(), StoreError> {
        let mut records = self.records_mut()?;
        let record = records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        record.durations.insert(field.to_string(), seconds);
        Ok(())
    }

    fn create_meter(&self, meter: &ProgressMeter) -> Result<(), StoreError> {
        if !self.records()?.contains_key(&meter.record_id) {
            return Err(StoreError::NotFound(meter.record_id));
        }
        self.meters_mut()?.insert(meter.id, meter.clone());
        Ok(())
    }

    fn meter(&self, record_id: RecordId) -> Result<Option<ProgressMeter>, StoreError> {
        let meters = self.meters.read().map_err(|_| poisoned())?;
        Ok(meters.values().find(|m| m.record_id == record_id).cloned())
    }

    fn increment_meter(&self, meter_id: MeterId, units: u64) -> Result<(), StoreError> {
        let mut meters = self.meters_mut()?;
        let meter = meters
            .get_mut(&meter_id)
            .ok_or(StoreError::MeterNotFound(meter_id))?;
        meter.increment_by(units);
        Ok(())
    }

    fn delete_meter(&self, meter_id: MeterId) -> Result<(), StoreError> {
        self.meters_mut()?.remove(&meter_id);
        Ok(())
    }

    fn delete(&self, id: RecordId) -> Result<(), StoreError> {
        self.records_mut()?
            .remove(&id)
            .ok_or(StoreError::NotFound(id))?;
        self.meters_mut()?.retain(|_, m| m.record_id != id);
        Ok(())
    }

    fn list_by_status(&self, kind: &str, status: JobStatus) -> Result<Vec<RecordId>, StoreError> {
        let records = self.records()?;
        let mut ids: Vec<_> = records
            .values()
            .filter(|r| r.kind == kind && r.status == status)
            .map(|r| r.id)
            .collect();
        // UUIDv7 ids sort by creation time.
        ids.sort();
        Ok(ids)
    }

    fn durations(&self, kind: &str, field: &str) -> Result<Vec<f64>, StoreError> {
        let records = self.records()?;
        let mut ids: Vec<_> = records.values().filter(|r| r.kind == kind).collect();
        ids.sort_by_key(|r| r.id);
        Ok(ids
            .into_iter()
            .filter_map(|r| r.durations.get(field).copied())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(kind: &str) -> StoredRecord {
        StoredRecord {
            id: RecordId::new(),
            kind: kind.to_string(),
            status: JobStatus::Pending,
            error_detail: ErrorDetail::new(),
            durations: HashMap::new(),
        }
    }

    #[test]
    fn insert_and_load() {
        let store = InMemoryRecordStore::new();
        let record = row("report");
        let id = record.id;
        store.insert(record.clone()).unwrap();

        assert_eq!(store.load(id).unwrap(), record);
        assert_eq!(store.insert(record), Err(StoreError::AlreadyExists(id)));
    }

    #[test]
    fn transition_is_conditional_on_current_status() {
        let store = InMemoryRecordStore::new();
        let record = row("report");
        let id = record.id;
        store.insert(record).unwrap();

        store
            .transition(id, &[JobStatus::Pending], JobStatus::Processing, Some(&ErrorDetail::new()))
            .unwrap();

        // A second claim loses the race.
        let err = store
            .transition(id, &[JobStatus::Pending], JobStatus::Processing, Some(&ErrorDetail::new()))
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::StatusConflict {
                id,
                expected: vec![JobStatus::Pending],
                actual: JobStatus::Processing,
            }
        );
        assert_eq!(store.status(id).unwrap(), JobStatus::Processing);
    }

    #[test]
    fn transition_without_detail_keeps_the_stored_one() {
        let store = InMemoryRecordStore::new();
        let mut record = row("report");
        record.status = JobStatus::Completed;
        record.error_detail = ErrorDetail::from_fault(&stint_core::Fault::new("RuntimeError", "old"));
        let id = record.id;
        store.insert(record).unwrap();

        store
            .transition(id, &[JobStatus::Completed], JobStatus::Pending, None)
            .unwrap();
        let stored = store.load(id).unwrap();
        assert_eq!(stored.status, JobStatus::Pending);
        assert_eq!(stored.error_detail.message(), Some("old"));

        store
            .transition(id, &[JobStatus::Pending], JobStatus::Processing, Some(&ErrorDetail::new()))
            .unwrap();
        assert!(store.load(id).unwrap().error_detail.is_empty());
    }

    #[test]
    fn injected_failures() {
        let store = InMemoryRecordStore::new();
        let record = row("report");
        let id = record.id;
        store.insert(record).unwrap();

        store.reject_transitions_into(JobStatus::ProcessingError);
        assert!(matches!(
            store.transition(id, &JobStatus::ALL, JobStatus::ProcessingError, None),
            Err(StoreError::Storage(_))
        ));

        store.reject_raw_writes(true);
        assert!(store
            .write_raw(id, JobStatus::ProcessingError, &ErrorDetail::new())
            .is_err());

        store.clear_rejections();
        store
            .write_raw(id, JobStatus::ProcessingError, &ErrorDetail::persistence_failure())
            .unwrap();
        assert_eq!(store.status(id).unwrap(), JobStatus::ProcessingError);
    }

    #[test]
    fn meters_follow_their_record() {
        let store = InMemoryRecordStore::new();
        let record = row("report");
        let id = record.id;
        store.insert(record).unwrap();

        let meter = ProgressMeter::new(id, 4);
        store.create_meter(&meter).unwrap();
        store.increment_meter(meter.id, 1).unwrap();
        store.increment_meter(meter.id, 1).unwrap();
        assert_eq!(store.meter(id).unwrap().unwrap().progress(), 50);

        store.delete(id).unwrap();
        assert_eq!(store.meter_count(), 0);
        assert!(matches!(
            store.increment_meter(meter.id, 1),
            Err(StoreError::MeterNotFound(_))
        ));
    }

    #[test]
    fn meter_requires_an_existing_record() {
        let store = InMemoryRecordStore::new();
        let orphan = ProgressMeter::new(RecordId::new(), 1);
        assert!(matches!(store.create_meter(&orphan), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn list_and_durations_are_scoped_by_kind() {
        let store = InMemoryRecordStore::new();
        let a = row("report");
        let b = row("report");
        let other = row("import");
        let (a_id, b_id, other_id) = (a.id, b.id, other.id);
        for r in [a, b, other] {
            store.insert(r).unwrap();
        }

        store.write_duration(a_id, "stint_duration", 1.5).unwrap();
        store.write_duration(other_id, "stint_duration", 9.0).unwrap();
        store
            .transition(b_id, &[JobStatus::Pending], JobStatus::Processing, Some(&ErrorDetail::new()))
            .unwrap();

        assert_eq!(
            store.list_by_status("report", JobStatus::Pending).unwrap(),
            vec![a_id]
        );
        assert_eq!(store.durations("report", "stint_duration").unwrap(), vec![1.5]);
        assert_eq!(store.duration(b_id, "stint_duration").unwrap(), None);
    }
}
