use std::path::Path;

use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::{Connection, Row, params};

use cadence_core::{
    BoundedHistory, MasteryBand, MasteryKey, MasteryRecord, MasteryStore, ScheduleKey,
    ScheduleRecord, ScheduleStore,
};

use crate::error::{Result, StoreError};
use crate::schema;

const SCHEDULE_COLUMNS: &str = "learner_id, item_id, topic, easiness_factor, interval_days, \
     repetitions, next_review_at, quality_history, emotion_history, created_at, updated_at, \
     version";

const MASTERY_COLUMNS: &str = "learner_id, topic, mastery_score, total_attempts, correct_attempts, \
     mastery_band, improvement_streak, last_updated, version";

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    // --- Metadata ---

    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM metadata WHERE key = ?1")?;
        let result = stmt.query_row([key], |row| row.get(0)).ok();
        Ok(result)
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Row counts as `(schedules, mastery)`.
    pub fn counts(&self) -> Result<(u64, u64)> {
        let schedules: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM schedules", [], |row| row.get(0))?;
        let mastery: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM mastery", [], |row| row.get(0))?;
        Ok((schedules.max(0) as u64, mastery.max(0) as u64))
    }

    /// Fold the WAL into the main file and truncate it. Run on shutdown.
    pub fn checkpoint_truncate(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    }

    // --- Schedules ---

    pub fn load_schedule(&self, key: &ScheduleKey) -> Result<Option<ScheduleRecord>> {
        let sql = format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE learner_id = ?1 AND item_id = ?2"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query_map(params![key.learner_id, key.item_id], RawSchedule::read)?;
        rows.next().transpose()?.map(RawSchedule::into_record).transpose()
    }

    /// Insert when `record.version == 0`, otherwise update only if the stored
    /// version still matches. Either way a miss is [`StoreError::Conflict`].
    pub fn save_schedule(&self, record: &ScheduleRecord) -> Result<ScheduleRecord> {
        let quality_history = serde_json::to_string(&record.quality_history)?;
        let emotion_history = serde_json::to_string(&record.emotion_history)?;
        let version = to_sql_version(record.version)?;

        let changed = if record.version == 0 {
            self.conn.execute(
                "INSERT INTO schedules (learner_id, item_id, topic, easiness_factor, interval_days,
                     repetitions, next_review_at, quality_history, emotion_history,
                     created_at, updated_at, version)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 1)
                 ON CONFLICT (learner_id, item_id) DO NOTHING",
                params![
                    record.learner_id,
                    record.item_id,
                    record.topic,
                    record.easiness_factor,
                    record.interval_days,
                    record.repetitions,
                    record.next_review_at.timestamp_micros(),
                    quality_history,
                    emotion_history,
                    record.created_at.timestamp_micros(),
                    record.updated_at.timestamp_micros(),
                ],
            )?
        } else {
            self.conn.execute(
                "UPDATE schedules SET topic = ?3, easiness_factor = ?4, interval_days = ?5,
                     repetitions = ?6, next_review_at = ?7, quality_history = ?8,
                     emotion_history = ?9, updated_at = ?10, version = version + 1
                 WHERE learner_id = ?1 AND item_id = ?2 AND version = ?11",
                params![
                    record.learner_id,
                    record.item_id,
                    record.topic,
                    record.easiness_factor,
                    record.interval_days,
                    record.repetitions,
                    record.next_review_at.timestamp_micros(),
                    quality_history,
                    emotion_history,
                    record.updated_at.timestamp_micros(),
                    version,
                ],
            )?
        };

        let key = record.key();
        if changed == 0 {
            tracing::debug!(%key, version = record.version, "conditional write missed");
            return Err(StoreError::Conflict {
                key: key.to_string(),
            });
        }

        // Columns keep microseconds; hand back exactly what a reload would see.
        let mut committed = record.clone();
        committed.version = record.version + 1;
        committed.next_review_at = committed.next_review_at.trunc_subsecs(6);
        committed.created_at = committed.created_at.trunc_subsecs(6);
        committed.updated_at = committed.updated_at.trunc_subsecs(6);
        tracing::debug!(
            %key,
            version = committed.version,
            interval_days = committed.interval_days,
            easiness = committed.easiness_factor,
            "schedule committed"
        );
        Ok(committed)
    }

    /// Overwrite by key regardless of stored version. Used by bulk import.
    pub fn upsert_schedule(&self, conn: &Connection, record: &ScheduleRecord) -> Result<()> {
        conn.execute(
            "INSERT INTO schedules (learner_id, item_id, topic, easiness_factor, interval_days,
                 repetitions, next_review_at, quality_history, emotion_history,
                 created_at, updated_at, version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 1)
             ON CONFLICT (learner_id, item_id) DO UPDATE SET
                 topic = excluded.topic,
                 easiness_factor = excluded.easiness_factor,
                 interval_days = excluded.interval_days,
                 repetitions = excluded.repetitions,
                 next_review_at = excluded.next_review_at,
                 quality_history = excluded.quality_history,
                 emotion_history = excluded.emotion_history,
                 created_at = excluded.created_at,
                 updated_at = excluded.updated_at,
                 version = schedules.version + 1",
            params![
                record.learner_id,
                record.item_id,
                record.topic,
                record.easiness_factor,
                record.interval_days,
                record.repetitions,
                record.next_review_at.timestamp_micros(),
                serde_json::to_string(&record.quality_history)?,
                serde_json::to_string(&record.emotion_history)?,
                record.created_at.timestamp_micros(),
                record.updated_at.timestamp_micros(),
            ],
        )?;
        Ok(())
    }

    pub fn load_schedules(&self, learner_id: Option<&str>) -> Result<Vec<ScheduleRecord>> {
        let sql = match learner_id {
            Some(_) => format!(
                "SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE learner_id = ?1 ORDER BY item_id"
            ),
            None => {
                format!("SELECT {SCHEDULE_COLUMNS} FROM schedules ORDER BY learner_id, item_id")
            }
        };
        let mut stmt = self.conn.prepare(&sql)?;
        let raw: Vec<RawSchedule> = match learner_id {
            Some(id) => stmt
                .query_map([id], RawSchedule::read)?
                .collect::<std::result::Result<_, _>>()?,
            None => stmt
                .query_map([], RawSchedule::read)?
                .collect::<std::result::Result<_, _>>()?,
        };
        raw.into_iter().map(RawSchedule::into_record).collect()
    }

    /// Indexed due-queue scan: `next_review_at <= now`, oldest first.
    pub fn load_due(
        &self,
        learner_id: &str,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ScheduleRecord>> {
        let sql = format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules
             WHERE learner_id = ?1 AND next_review_at <= ?2
             ORDER BY next_review_at, item_id LIMIT ?3"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let raw: Vec<RawSchedule> = stmt
            .query_map(
                params![learner_id, now.timestamp_micros(), limit],
                RawSchedule::read,
            )?
            .collect::<std::result::Result<_, _>>()?;
        raw.into_iter().map(RawSchedule::into_record).collect()
    }

    pub fn load_between(
        &self,
        learner_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ScheduleRecord>> {
        let sql = format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules
             WHERE learner_id = ?1 AND next_review_at BETWEEN ?2 AND ?3
             ORDER BY next_review_at, item_id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let raw: Vec<RawSchedule> = stmt
            .query_map(
                params![learner_id, start.timestamp_micros(), end.timestamp_micros()],
                RawSchedule::read,
            )?
            .collect::<std::result::Result<_, _>>()?;
        raw.into_iter().map(RawSchedule::into_record).collect()
    }

    // --- Mastery ---

    pub fn load_mastery(&self, key: &MasteryKey) -> Result<Option<MasteryRecord>> {
        let sql =
            format!("SELECT {MASTERY_COLUMNS} FROM mastery WHERE learner_id = ?1 AND topic = ?2");
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query_map(params![key.learner_id, key.topic], RawMastery::read)?;
        rows.next().transpose()?.map(RawMastery::into_record).transpose()
    }

    /// Version-checked insert or update, as for schedules.
    pub fn save_mastery(&self, record: &MasteryRecord) -> Result<MasteryRecord> {
        let version = to_sql_version(record.version)?;
        let changed = if record.version == 0 {
            self.conn.execute(
                "INSERT INTO mastery (learner_id, topic, mastery_score, total_attempts,
                     correct_attempts, mastery_band, improvement_streak, last_updated, version)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1)
                 ON CONFLICT (learner_id, topic) DO NOTHING",
                params![
                    record.learner_id,
                    record.topic,
                    record.mastery_score,
                    record.total_attempts,
                    record.correct_attempts,
                    record.mastery_band.as_str(),
                    record.improvement_streak,
                    record.last_updated.timestamp_micros(),
                ],
            )?
        } else {
            self.conn.execute(
                "UPDATE mastery SET mastery_score = ?3, total_attempts = ?4,
                     correct_attempts = ?5, mastery_band = ?6, improvement_streak = ?7,
                     last_updated = ?8, version = version + 1
                 WHERE learner_id = ?1 AND topic = ?2 AND version = ?9",
                params![
                    record.learner_id,
                    record.topic,
                    record.mastery_score,
                    record.total_attempts,
                    record.correct_attempts,
                    record.mastery_band.as_str(),
                    record.improvement_streak,
                    record.last_updated.timestamp_micros(),
                    version,
                ],
            )?
        };

        let key = record.key();
        if changed == 0 {
            tracing::debug!(%key, version = record.version, "conditional write missed");
            return Err(StoreError::Conflict {
                key: key.to_string(),
            });
        }

        let mut committed = record.clone();
        committed.version = record.version + 1;
        committed.last_updated = committed.last_updated.trunc_subsecs(6);
        tracing::debug!(
            %key,
            version = committed.version,
            score = committed.mastery_score,
            band = %committed.mastery_band,
            "mastery committed"
        );
        Ok(committed)
    }

    pub fn upsert_mastery(&self, conn: &Connection, record: &MasteryRecord) -> Result<()> {
        conn.execute(
            "INSERT INTO mastery (learner_id, topic, mastery_score, total_attempts,
                 correct_attempts, mastery_band, improvement_streak, last_updated, version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1)
             ON CONFLICT (learner_id, topic) DO UPDATE SET
                 mastery_score = excluded.mastery_score,
                 total_attempts = excluded.total_attempts,
                 correct_attempts = excluded.correct_attempts,
                 mastery_band = excluded.mastery_band,
                 improvement_streak = excluded.improvement_streak,
                 last_updated = excluded.last_updated,
                 version = mastery.version + 1",
            params![
                record.learner_id,
                record.topic,
                record.mastery_score,
                record.total_attempts,
                record.correct_attempts,
                record.mastery_band.as_str(),
                record.improvement_streak,
                record.last_updated.timestamp_micros(),
            ],
        )?;
        Ok(())
    }

    pub fn load_mastery_records(&self, learner_id: Option<&str>) -> Result<Vec<MasteryRecord>> {
        let sql = match learner_id {
            Some(_) => format!(
                "SELECT {MASTERY_COLUMNS} FROM mastery WHERE learner_id = ?1 ORDER BY topic"
            ),
            None => format!("SELECT {MASTERY_COLUMNS} FROM mastery ORDER BY learner_id, topic"),
        };
        let mut stmt = self.conn.prepare(&sql)?;
        let raw: Vec<RawMastery> = match learner_id {
            Some(id) => stmt
                .query_map([id], RawMastery::read)?
                .collect::<std::result::Result<_, _>>()?,
            None => stmt
                .query_map([], RawMastery::read)?
                .collect::<std::result::Result<_, _>>()?,
        };
        raw.into_iter().map(RawMastery::into_record).collect()
    }
}

// --- Trait impls: the engine sees the store through these ---

impl ScheduleStore for Store {
    fn get_schedule(&self, key: &ScheduleKey) -> cadence_core::Result<Option<ScheduleRecord>> {
        Ok(self.load_schedule(key)?)
    }

    fn put_schedule(&self, record: &ScheduleRecord) -> cadence_core::Result<ScheduleRecord> {
        Ok(self.save_schedule(record)?)
    }

    fn all_schedules(&self) -> cadence_core::Result<Vec<ScheduleRecord>> {
        Ok(self.load_schedules(None)?)
    }

    fn learner_schedules(&self, learner_id: &str) -> cadence_core::Result<Vec<ScheduleRecord>> {
        Ok(self.load_schedules(Some(learner_id))?)
    }

    fn due_schedules(
        &self,
        learner_id: &str,
        now: DateTime<Utc>,
        limit: usize,
    ) -> cadence_core::Result<Vec<ScheduleRecord>> {
        Ok(self.load_due(learner_id, now, limit)?)
    }

    fn schedules_between(
        &self,
        learner_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> cadence_core::Result<Vec<ScheduleRecord>> {
        Ok(self.load_between(learner_id, start, end)?)
    }
}

impl MasteryStore for Store {
    fn get_mastery(&self, key: &MasteryKey) -> cadence_core::Result<Option<MasteryRecord>> {
        Ok(self.load_mastery(key)?)
    }

    fn put_mastery(&self, record: &MasteryRecord) -> cadence_core::Result<MasteryRecord> {
        Ok(self.save_mastery(record)?)
    }

    fn all_mastery(&self) -> cadence_core::Result<Vec<MasteryRecord>> {
        Ok(self.load_mastery_records(None)?)
    }

    fn learner_mastery(&self, learner_id: &str) -> cadence_core::Result<Vec<MasteryRecord>> {
        Ok(self.load_mastery_records(Some(learner_id))?)
    }
}

// --- Row decoding ---

struct RawSchedule {
    learner_id: String,
    item_id: String,
    topic: Option<String>,
    easiness_factor: f64,
    interval_days: i64,
    repetitions: u32,
    next_review_at: i64,
    quality_history: String,
    emotion_history: String,
    created_at: i64,
    updated_at: i64,
    version: i64,
}

impl RawSchedule {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            learner_id: row.get(0)?,
            item_id: row.get(1)?,
            topic: row.get(2)?,
            easiness_factor: row.get(3)?,
            interval_days: row.get(4)?,
            repetitions: row.get(5)?,
            next_review_at: row.get(6)?,
            quality_history: row.get(7)?,
            emotion_history: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
            version: row.get(11)?,
        })
    }

    fn into_record(self) -> Result<ScheduleRecord> {
        let quality_history: BoundedHistory<_> = serde_json::from_str(&self.quality_history)?;
        let emotion_history: BoundedHistory<_> = serde_json::from_str(&self.emotion_history)?;
        Ok(ScheduleRecord {
            learner_id: self.learner_id,
            item_id: self.item_id,
            topic: self.topic,
            easiness_factor: self.easiness_factor,
            interval_days: self.interval_days,
            repetitions: self.repetitions,
            next_review_at: from_micros(self.next_review_at)?,
            quality_history,
            emotion_history,
            created_at: from_micros(self.created_at)?,
            updated_at: from_micros(self.updated_at)?,
            version: from_sql_version(self.version)?,
        })
    }
}

struct RawMastery {
    learner_id: String,
    topic: String,
    mastery_score: f64,
    total_attempts: u32,
    correct_attempts: u32,
    mastery_band: String,
    improvement_streak: u32,
    last_updated: i64,
    version: i64,
}

impl RawMastery {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            learner_id: row.get(0)?,
            topic: row.get(1)?,
            mastery_score: row.get(2)?,
            total_attempts: row.get(3)?,
            correct_attempts: row.get(4)?,
            mastery_band: row.get(5)?,
            improvement_streak: row.get(6)?,
            last_updated: row.get(7)?,
            version: row.get(8)?,
        })
    }

    fn into_record(self) -> Result<MasteryRecord> {
        let mastery_band: MasteryBand = self.mastery_band.parse().map_err(|_| {
            StoreError::InvalidData(format!("unknown mastery band '{}'", self.mastery_band))
        })?;
        Ok(MasteryRecord {
            learner_id: self.learner_id,
            topic: self.topic,
            mastery_score: self.mastery_score,
            total_attempts: self.total_attempts,
            correct_attempts: self.correct_attempts,
            mastery_band,
            improvement_streak: self.improvement_streak,
            last_updated: from_micros(self.last_updated)?,
            version: from_sql_version(self.version)?,
        })
    }
}

fn from_micros(us: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(us)
        .ok_or_else(|| StoreError::InvalidData(format!("timestamp out of range: {us}")))
}

fn to_sql_version(version: u64) -> Result<i64> {
    i64::try_from(version)
        .map_err(|_| StoreError::InvalidData(format!("version out of range: {version}")))
}

fn from_sql_version(version: i64) -> Result<u64> {
    u64::try_from(version)
        .map_err(|_| StoreError::InvalidData(format!("negative version: {version}")))
}
