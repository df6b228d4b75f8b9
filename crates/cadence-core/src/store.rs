//! Persistence provider contract.
//!
//! Writes are conditional on the record's `version`: a put succeeds only when
//! the stored version still equals the one the record was read at (or the key
//! is absent and the record's version is 0). The provider bumps the version
//! and returns the committed record. A lost race surfaces as
//! [`EngineError::ConcurrentModification`].

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::due::select_due;
use crate::error::{EngineError, Result};
use crate::mastery::{MasteryKey, MasteryRecord};
use crate::schedule::{ScheduleKey, ScheduleRecord};

pub trait ScheduleStore {
    fn get_schedule(&self, key: &ScheduleKey) -> Result<Option<ScheduleRecord>>;

    /// Conditional insert-or-update. Returns the record with its new version.
    fn put_schedule(&self, record: &ScheduleRecord) -> Result<ScheduleRecord>;

    /// Every record, ordered by key.
    fn all_schedules(&self) -> Result<Vec<ScheduleRecord>>;

    fn learner_schedules(&self, learner_id: &str) -> Result<Vec<ScheduleRecord>> {
        Ok(self
            .all_schedules()?
            .into_iter()
            .filter(|r| r.learner_id == learner_id)
            .collect())
    }

    /// Due records for a learner, oldest-due first, at most `limit`.
    fn due_schedules(
        &self,
        learner_id: &str,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ScheduleRecord>> {
        Ok(select_due(self.learner_schedules(learner_id)?, now, limit))
    }

    /// Records whose `next_review_at` lies in `[start, end]`, ascending.
    fn schedules_between(
        &self,
        learner_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ScheduleRecord>> {
        let mut records: Vec<ScheduleRecord> = self
            .learner_schedules(learner_id)?
            .into_iter()
            .filter(|r| r.next_review_at >= start && r.next_review_at <= end)
            .collect();
        records.sort_by(|a, b| {
            a.next_review_at
                .cmp(&b.next_review_at)
                .then_with(|| a.item_id.cmp(&b.item_id))
        });
        Ok(records)
    }
}

pub trait MasteryStore {
    fn get_mastery(&self, key: &MasteryKey) -> Result<Option<MasteryRecord>>;

    /// Conditional insert-or-update. Returns the record with its new version.
    fn put_mastery(&self, record: &MasteryRecord) -> Result<MasteryRecord>;

    /// Every record, ordered by key.
    fn all_mastery(&self) -> Result<Vec<MasteryRecord>>;

    fn learner_mastery(&self, learner_id: &str) -> Result<Vec<MasteryRecord>> {
        Ok(self
            .all_mastery()?
            .into_iter()
            .filter(|r| r.learner_id == learner_id)
            .collect())
    }
}

/// Process-local provider for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStore {
    schedules: Mutex<BTreeMap<ScheduleKey, ScheduleRecord>>,
    mastery: Mutex<BTreeMap<MasteryKey, MasteryRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule_count(&self) -> usize {
        self.schedules.lock().map(|m| m.len()).unwrap_or(0)
    }
}

fn poisoned<T>(_: T) -> EngineError {
    EngineError::Storage("memory store lock poisoned".into())
}

impl ScheduleStore for MemoryStore {
    fn get_schedule(&self, key: &ScheduleKey) -> Result<Option<ScheduleRecord>> {
        let map = self.schedules.lock().map_err(poisoned)?;
        Ok(map.get(key).cloned())
    }

    fn put_schedule(&self, record: &ScheduleRecord) -> Result<ScheduleRecord> {
        let mut map = self.schedules.lock().map_err(poisoned)?;
        let key = record.key();
        let stored = map.get(&key).map_or(0, |r| r.version);
        if stored != record.version {
            return Err(EngineError::ConcurrentModification {
                key: key.to_string(),
            });
        }
        let mut committed = record.clone();
        committed.version = stored + 1;
        map.insert(key, committed.clone());
        Ok(committed)
    }

    fn all_schedules(&self) -> Result<Vec<ScheduleRecord>> {
        let map = self.schedules.lock().map_err(poisoned)?;
        Ok(map.values().cloned().collect())
    }
}

impl MasteryStore for MemoryStore {
    fn get_mastery(&self, key: &MasteryKey) -> Result<Option<MasteryRecord>> {
        let map = self.mastery.lock().map_err(poisoned)?;
        Ok(map.get(key).cloned())
    }

    fn put_mastery(&self, record: &MasteryRecord) -> Result<MasteryRecord> {
        let mut map = self.mastery.lock().map_err(poisoned)?;
        let key = record.key();
        let stored = map.get(&key).map_or(0, |r| r.version);
        if stored != record.version {
            return Err(EngineError::ConcurrentModification {
                key: key.to_string(),
            });
        }
        let mut committed = record.clone();
        committed.version = stored + 1;
        map.insert(key, committed.clone());
        Ok(committed)
    }

    fn all_mastery(&self) -> Result<Vec<MasteryRecord>> {
        let map = self.mastery.lock().map_err(poisoned)?;
        Ok(map.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 2, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_insert_then_update_bumps_version() {
        let store = MemoryStore::new();
        let rec = ScheduleRecord::new("ann", "q1", now());
        let v1 = store.put_schedule(&rec).unwrap();
        assert_eq!(v1.version, 1);
        let v2 = store.put_schedule(&v1).unwrap();
        assert_eq!(v2.version, 2);
        assert_eq!(store.get_schedule(&rec.key()).unwrap().unwrap().version, 2);
    }

    #[test]
    fn test_stale_write_conflicts() {
        let store = MemoryStore::new();
        let rec = ScheduleRecord::new("ann", "q1", now());
        let first = store.put_schedule(&rec).unwrap();
        store.put_schedule(&first).unwrap();

        let err = store.put_schedule(&first).unwrap_err();
        assert!(err.is_conflict());

        // Double insert of a fresh record also conflicts.
        let err = store.put_schedule(&rec).unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_learner_scoping() {
        let store = MemoryStore::new();
        store.put_schedule(&ScheduleRecord::new("ann", "q1", now())).unwrap();
        store.put_schedule(&ScheduleRecord::new("ann", "q2", now())).unwrap();
        store.put_schedule(&ScheduleRecord::new("ben", "q1", now())).unwrap();
        assert_eq!(store.learner_schedules("ann").unwrap().len(), 2);
        assert_eq!(store.learner_schedules("ben").unwrap().len(), 1);
        assert_eq!(store.schedule_count(), 3);
    }

    #[test]
    fn test_mastery_conditional_write() {
        let store = MemoryStore::new();
        let rec = MasteryRecord::new("ann", "physics", now());
        let committed = store.put_mastery(&rec).unwrap();
        assert_eq!(committed.version, 1);
        assert!(store.put_mastery(&rec).unwrap_err().is_conflict());
        assert_eq!(store.learner_mastery("ann").unwrap().len(), 1);
    }
}
