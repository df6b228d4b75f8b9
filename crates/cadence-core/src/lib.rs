//! Cadence adaptive review scheduling engine.
//!
//! Scores attempt outcomes into an SM-2 quality, advances per-item review
//! schedules, tracks per-topic mastery with band-dependent forgetting, and
//! projects due queues and calendars.
//!
//! Zero I/O. Time comes from an injected [`Clock`]; records live behind the
//! [`ScheduleStore`] and [`MasteryStore`] traits, whose writes are
//! version-checked so concurrent updates to one key serialize by retry.

pub mod constants;
pub mod due;
pub mod engine;
pub mod error;
pub mod history;
pub mod mastery;
pub mod quality;
pub mod schedule;
pub mod snapshot;
pub mod stats;
pub mod store;
pub mod time;

pub use constants::{DEFAULT_DUE_LIMIT, DEFAULT_EASINESS, HISTORY_CAPACITY, MIN_EASINESS};
pub use due::{
    Calendar, DueEntry, DueQueueProjector, annotate, group_by_day, select_due, sort_overdue_first,
};
pub use engine::{Engine, ImportSummary, retry_on_conflict};
pub use error::{EngineError, Result};
pub use history::BoundedHistory;
pub use mastery::{MasteryBand, MasteryKey, MasteryRecord, record_topic_attempt};
pub use quality::{AttemptOutcome, QualityScore, score_quality};
pub use schedule::{
    EmotionEntry, QualityEntry, Review, ScheduleKey, ScheduleRecord, ScheduleState,
    SchedulingStrategy, overdue_days, record_attempt,
};
pub use snapshot::{CURRENT_VERSION, Snapshot, export_json, import_json};
pub use stats::{
    EmotionInsights, MasteryProfile, RevisionStats, TopicSummary, emotion_insights,
    mastery_profile, revision_stats,
};
pub use store::{MasteryStore, MemoryStore, ScheduleStore};
pub use time::{Clock, FixedClock, SystemClock};
