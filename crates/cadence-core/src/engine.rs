//! Engine facade: binds the pure transforms to a persistence provider and a clock.
//!
//! Every mutating call is one read, one pure computation, and one conditional
//! write. A lost race comes back as `ConcurrentModification` and nothing is
//! retried here; hosts wrap calls in [`retry_on_conflict`].

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::due::{Calendar, DueQueueProjector};
use crate::error::{EngineError, Result};
use crate::mastery::{MasteryKey, MasteryRecord};
use crate::quality::{AttemptOutcome, QualityScore};
use crate::schedule::{Review, ScheduleKey, ScheduleRecord, SchedulingStrategy};
use crate::snapshot::Snapshot;
use crate::stats::{
    EmotionInsights, MasteryProfile, RevisionStats, emotion_insights, mastery_profile,
    revision_stats,
};
use crate::store::{MasteryStore, ScheduleStore};
use crate::time::Clock;

pub struct Engine<S, C> {
    store: S,
    clock: C,
    strategy: SchedulingStrategy,
}

/// Record counts written by [`Engine::import_snapshot`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub schedules: usize,
    pub mastery: usize,
}

impl<S, C> Engine<S, C>
where
    S: ScheduleStore + MasteryStore,
    C: Clock,
{
    pub fn new(store: S, clock: C) -> Self {
        Self {
            store,
            clock,
            strategy: SchedulingStrategy::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: SchedulingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn strategy(&self) -> SchedulingStrategy {
        self.strategy
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Current time at microsecond precision, the finest a store keeps.
    pub fn now(&self) -> DateTime<Utc> {
        self.now().trunc_subsecs(6)
    }

    pub fn score_quality(&self, outcome: &AttemptOutcome) -> Result<QualityScore> {
        crate::quality::score_quality(outcome)
    }

    /// Apply one scored review, creating the record on first exposure.
    pub fn record_attempt(
        &self,
        learner_id: &str,
        item_id: &str,
        review: &Review,
    ) -> Result<ScheduleRecord> {
        self.record_attempt_tagged(learner_id, item_id, None, review)
    }

    /// As [`Engine::record_attempt`], labelling the record with `topic` when it
    /// has none yet.
    pub fn record_attempt_tagged(
        &self,
        learner_id: &str,
        item_id: &str,
        topic: Option<&str>,
        review: &Review,
    ) -> Result<ScheduleRecord> {
        let key = schedule_key(learner_id, item_id)?;
        let now = self.now();

        let mut record = self
            .store
            .get_schedule(&key)?
            .unwrap_or_else(|| ScheduleRecord::new(learner_id, item_id, now));
        if record.topic.is_none() {
            record.topic = non_empty(topic);
        }
        record.apply_review(review, now, self.strategy)?;
        self.store.put_schedule(&record)
    }

    /// Fold one topic attempt into the learner's mastery estimate.
    pub fn record_topic_attempt(
        &self,
        learner_id: &str,
        topic: &str,
        correct: bool,
    ) -> Result<MasteryRecord> {
        let key = mastery_key(learner_id, topic)?;
        let now = self.now();

        let mut record = self
            .store
            .get_mastery(&key)?
            .unwrap_or_else(|| MasteryRecord::new(learner_id, topic, now));
        record.apply_attempt(correct, now);
        self.store.put_mastery(&record)
    }

    pub fn schedule(&self, learner_id: &str, item_id: &str) -> Result<Option<ScheduleRecord>> {
        self.store.get_schedule(&schedule_key(learner_id, item_id)?)
    }

    pub fn mastery(&self, learner_id: &str, topic: &str) -> Result<Option<MasteryRecord>> {
        self.store.get_mastery(&mastery_key(learner_id, topic)?)
    }

    pub fn due_items(
        &self,
        learner_id: &str,
        limit: usize,
    ) -> Result<std::vec::IntoIter<ScheduleRecord>> {
        DueQueueProjector::new(&self.store).due_items(learner_id, self.now(), limit)
    }

    pub fn calendar(
        &self,
        learner_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Calendar> {
        DueQueueProjector::new(&self.store).calendar(learner_id, start, end)
    }

    /// Create the record with default state if absent. Existing records are
    /// returned untouched.
    pub fn ensure_scheduled(
        &self,
        learner_id: &str,
        item_id: &str,
        topic: Option<&str>,
    ) -> Result<ScheduleRecord> {
        let key = schedule_key(learner_id, item_id)?;
        if let Some(existing) = self.store.get_schedule(&key)? {
            return Ok(existing);
        }
        let record = ScheduleRecord::new(learner_id, item_id, self.now())
            .with_topic(non_empty(topic).as_deref());
        self.store.put_schedule(&record)
    }

    /// Shift an existing record's due time by `days` (either sign).
    pub fn reschedule(&self, learner_id: &str, item_id: &str, days: i64) -> Result<ScheduleRecord> {
        let key = schedule_key(learner_id, item_id)?;
        let mut record = self
            .store
            .get_schedule(&key)?
            .ok_or_else(|| EngineError::UnknownSchedule {
                learner_id: learner_id.to_string(),
                item_id: item_id.to_string(),
            })?;
        record.reschedule(days, self.now());
        self.store.put_schedule(&record)
    }

    /// Push a review later. Negative `days` is rejected.
    pub fn snooze(&self, learner_id: &str, item_id: &str, days: i64) -> Result<ScheduleRecord> {
        if days < 0 {
            return Err(EngineError::invalid(format!(
                "snooze days must be non-negative, got {days}"
            )));
        }
        self.reschedule(learner_id, item_id, days)
    }

    pub fn stats(&self, learner_id: &str) -> Result<RevisionStats> {
        let records = self.store.learner_schedules(learner_id)?;
        Ok(revision_stats(&records, self.now()))
    }

    pub fn insights(&self, learner_id: &str) -> Result<EmotionInsights> {
        let records = self.store.learner_schedules(learner_id)?;
        Ok(emotion_insights(&records))
    }

    pub fn profile(&self, learner_id: &str) -> Result<MasteryProfile> {
        let records = self.store.learner_mastery(learner_id)?;
        Ok(mastery_profile(&records))
    }

    /// Every record in the store, or one learner's records.
    pub fn export_snapshot(&self, learner_id: Option<&str>) -> Result<Snapshot> {
        let (schedules, mastery) = match learner_id {
            Some(id) => (self.store.learner_schedules(id)?, self.store.learner_mastery(id)?),
            None => (self.store.all_schedules()?, self.store.all_mastery()?),
        };
        Ok(Snapshot::new(schedules, mastery, self.now()))
    }

    /// Validate, then upsert every record, replacing whatever is stored under
    /// the same key.
    pub fn import_snapshot(&self, snapshot: &Snapshot) -> Result<ImportSummary> {
        snapshot.validate()?;
        let mut summary = ImportSummary::default();

        for incoming in &snapshot.schedules {
            let mut record = incoming.clone();
            record.version = self.store.get_schedule(&record.key())?.map_or(0, |r| r.version);
            self.store.put_schedule(&record)?;
            summary.schedules += 1;
        }
        for incoming in &snapshot.mastery {
            let mut record = incoming.clone();
            record.version = self.store.get_mastery(&record.key())?.map_or(0, |r| r.version);
            self.store.put_mastery(&record)?;
            summary.mastery += 1;
        }
        Ok(summary)
    }
}

/// Run `op`, re-running it from scratch after each `ConcurrentModification`
/// up to `max_retries` extra times. `on_retry` sees the retry number and the
/// conflict that caused it.
pub fn retry_on_conflict<T>(
    max_retries: u32,
    mut op: impl FnMut() -> Result<T>,
    mut on_retry: impl FnMut(u32, &EngineError),
) -> Result<T> {
    let mut retries = 0;
    loop {
        match op() {
            Err(err) if err.is_conflict() && retries < max_retries => {
                retries += 1;
                on_retry(retries, &err);
            }
            other => return other,
        }
    }
}

fn schedule_key(learner_id: &str, item_id: &str) -> Result<ScheduleKey> {
    if learner_id.trim().is_empty() || item_id.trim().is_empty() {
        return Err(EngineError::invalid("learner id and item id must not be empty"));
    }
    Ok(ScheduleKey::new(learner_id, item_id))
}

fn mastery_key(learner_id: &str, topic: &str) -> Result<MasteryKey> {
    if learner_id.trim().is_empty() || topic.trim().is_empty() {
        return Err(EngineError::invalid("learner id and topic must not be empty"));
    }
    Ok(MasteryKey::new(learner_id, topic))
}

fn non_empty(topic: Option<&str>) -> Option<String> {
    topic
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}
