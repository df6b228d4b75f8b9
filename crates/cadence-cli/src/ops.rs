//! Host-side operations shared by the CLI and the MCP server.
//!
//! One learner attempt touches two records: the item schedule and, when the
//! item has a topic, the topic mastery. Each write is retried on its own from
//! a fresh read, so a conflict on one never replays the other.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;

use cadence_core::time::{end_of_day, start_of_day, utc_date};
use cadence_core::{
    AttemptOutcome, Calendar, Clock, DueEntry, Engine, EngineError, MasteryRecord, MasteryStore,
    QualityScore, Review, ScheduleRecord, ScheduleStore, annotate, retry_on_conflict,
    sort_overdue_first,
};
use cadence_store::Store;

pub type AppEngine = Engine<Store, Arc<dyn Clock>>;

#[derive(Debug, Clone, Serialize)]
pub struct ReviewOutcome {
    pub quality: QualityScore,
    pub schedule: ScheduleRecord,
    pub mastery: Option<MasteryRecord>,
}

/// `retry_on_conflict` with a warning per retry.
pub fn with_retry<T>(
    max_retries: u32,
    op: impl FnMut() -> cadence_core::Result<T>,
) -> cadence_core::Result<T> {
    retry_on_conflict(max_retries, op, |attempt, err: &EngineError| {
        tracing::warn!(attempt, max_retries, "{err}, retrying from a fresh read");
    })
}

/// Score `outcome`, advance the item schedule, then fold the attempt into
/// the topic mastery. The topic is the explicit one if given, else whatever
/// the stored schedule is tagged with.
pub fn record_review<S, C>(
    engine: &Engine<S, C>,
    max_retries: u32,
    learner_id: &str,
    item_id: &str,
    topic: Option<&str>,
    outcome: &AttemptOutcome,
) -> cadence_core::Result<ReviewOutcome>
where
    S: ScheduleStore + MasteryStore,
    C: Clock,
{
    let quality = engine.score_quality(outcome)?;
    let review = Review::from_score(quality, outcome);

    let schedule = with_retry(max_retries, || {
        engine.record_attempt_tagged(learner_id, item_id, topic, &review)
    })?;

    let topic = topic
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .or_else(|| schedule.topic.clone());

    let mastery = match topic {
        Some(topic) => Some(with_retry(max_retries, || {
            engine.record_topic_attempt(learner_id, &topic, outcome.correct)
        })?),
        None => None,
    };

    tracing::debug!(
        learner_id,
        item_id,
        quality = quality.quality,
        interval_days = schedule.interval_days,
        "review recorded"
    );

    Ok(ReviewOutcome {
        quality,
        schedule,
        mastery,
    })
}

/// Due items annotated with days overdue.
///
/// `overdue_only` keeps items whose due time has already passed;
/// `overdue_first` orders by days overdue, most first.
pub fn due_entries<S, C>(
    engine: &Engine<S, C>,
    learner_id: &str,
    limit: usize,
    overdue_first: bool,
    overdue_only: bool,
) -> cadence_core::Result<Vec<DueEntry>>
where
    S: ScheduleStore + MasteryStore,
    C: Clock,
{
    let now = engine.now();
    let mut entries = annotate(engine.due_items(learner_id, limit)?, now);
    if overdue_only {
        entries.retain(|e| e.record.next_review_at < now);
    }
    if overdue_first {
        sort_overdue_first(&mut entries);
    }
    Ok(entries)
}

/// Calendar over whole UTC days. `from` defaults to today, `to` to
/// `from + default_days`.
pub fn calendar_window<S, C>(
    engine: &Engine<S, C>,
    learner_id: &str,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    default_days: i64,
) -> cadence_core::Result<(NaiveDate, NaiveDate, Calendar)>
where
    S: ScheduleStore + MasteryStore,
    C: Clock,
{
    let from = from.unwrap_or_else(|| utc_date(engine.now()));
    let to = match to {
        Some(to) => to,
        None => from
            .checked_add_signed(Duration::days(default_days.max(0)))
            .unwrap_or(from),
    };
    let calendar = engine.calendar(learner_id, start_of_day(from), end_of_day(to))?;
    Ok((from, to, calendar))
}

pub fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("invalid RFC 3339 timestamp '{s}': {e}"))
}
