//! Read-side projections over schedule records: the due queue and the
//! calendar view. Nothing here mutates a record.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::schedule::{ScheduleRecord, overdue_days};
use crate::store::ScheduleStore;
use crate::time::utc_date;

/// Reviews grouped by UTC calendar date, each day ascending by due time.
pub type Calendar = BTreeMap<NaiveDate, Vec<ScheduleRecord>>;

/// Queries due work for a learner against any schedule store.
pub struct DueQueueProjector<'a, S: ScheduleStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: ScheduleStore + ?Sized> DueQueueProjector<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Records with `next_review_at <= now`, oldest-due first, at most `limit`.
    ///
    /// Calling again with the same arguments yields the same order, modulo
    /// writes that landed in between.
    pub fn due_items(
        &self,
        learner_id: &str,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<std::vec::IntoIter<ScheduleRecord>> {
        let records = self.store.due_schedules(learner_id, now, limit)?;
        Ok(records.into_iter())
    }

    /// Records due within `[start, end]`, grouped by UTC date.
    pub fn calendar(
        &self,
        learner_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Calendar> {
        if end < start {
            return Err(EngineError::invalid(format!(
                "calendar range ends ({end}) before it starts ({start})"
            )));
        }
        let records = self.store.schedules_between(learner_id, start, end)?;
        Ok(group_by_day(records))
    }
}

/// Pure selection behind [`DueQueueProjector::due_items`].
pub fn select_due<I>(records: I, now: DateTime<Utc>, limit: usize) -> Vec<ScheduleRecord>
where
    I: IntoIterator<Item = ScheduleRecord>,
{
    let mut due: Vec<ScheduleRecord> = records.into_iter().filter(|r| r.is_due(now)).collect();
    due.sort_by(|a, b| {
        a.next_review_at
            .cmp(&b.next_review_at)
            .then_with(|| a.item_id.cmp(&b.item_id))
    });
    due.truncate(limit);
    due
}

/// Bucket records by the UTC date of `next_review_at`, keeping ascending order per day.
pub fn group_by_day<I>(records: I) -> Calendar
where
    I: IntoIterator<Item = ScheduleRecord>,
{
    let mut calendar = Calendar::new();
    for record in records {
        calendar
            .entry(utc_date(record.next_review_at))
            .or_default()
            .push(record);
    }
    for day in calendar.values_mut() {
        day.sort_by(|a, b| {
            a.next_review_at
                .cmp(&b.next_review_at)
                .then_with(|| a.item_id.cmp(&b.item_id))
        });
    }
    calendar
}

/// A due record annotated for caller-side prioritisation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DueEntry {
    pub record: ScheduleRecord,
    pub overdue_days: i64,
}

impl DueEntry {
    pub fn new(record: ScheduleRecord, now: DateTime<Utc>) -> Self {
        let overdue_days = overdue_days(&record, now);
        Self {
            record,
            overdue_days,
        }
    }
}

pub fn annotate<I>(records: I, now: DateTime<Utc>) -> Vec<DueEntry>
where
    I: IntoIterator<Item = ScheduleRecord>,
{
    records.into_iter().map(|r| DueEntry::new(r, now)).collect()
}

/// Most overdue first, then oldest due time.
pub fn sort_overdue_first(entries: &mut [DueEntry]) {
    entries.sort_by(|a, b| {
        b.overdue_days
            .cmp(&a.overdue_days)
            .then_with(|| a.record.next_review_at.cmp(&b.record.next_review_at))
    });
}
