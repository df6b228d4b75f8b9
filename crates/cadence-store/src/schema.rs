use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA_VERSION: i64 = 1;

pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;
    // Checkpoint every ~400KB instead of the default ~4MB to keep WAL files small
    conn.pragma_update(None, "wal_autocheckpoint", 100)?;

    // Fold stale WAL data into the main DB on startup. In-memory and fresh
    // databases legitimately fail this, so the result is ignored.
    if conn
        .execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
        .is_ok()
    {
        tracing::info!("startup WAL checkpoint complete");
    }

    // Timestamps are stored as Unix microseconds so range scans stay numeric.
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS schedules (
            learner_id       TEXT NOT NULL,
            item_id          TEXT NOT NULL,
            topic            TEXT,
            easiness_factor  REAL NOT NULL,
            interval_days    INTEGER NOT NULL,
            repetitions      INTEGER NOT NULL DEFAULT 0,
            next_review_at   INTEGER NOT NULL,
            quality_history  TEXT NOT NULL DEFAULT '[]',
            emotion_history  TEXT NOT NULL DEFAULT '[]',
            created_at       INTEGER NOT NULL,
            updated_at       INTEGER NOT NULL,
            version          INTEGER NOT NULL DEFAULT 1,
            PRIMARY KEY (learner_id, item_id)
        );

        CREATE TABLE IF NOT EXISTS mastery (
            learner_id          TEXT NOT NULL,
            topic               TEXT NOT NULL,
            mastery_score       REAL NOT NULL,
            total_attempts      INTEGER NOT NULL DEFAULT 0,
            correct_attempts    INTEGER NOT NULL DEFAULT 0,
            mastery_band        TEXT NOT NULL DEFAULT 'beginner',
            improvement_streak  INTEGER NOT NULL DEFAULT 0,
            last_updated        INTEGER NOT NULL,
            version             INTEGER NOT NULL DEFAULT 1,
            PRIMARY KEY (learner_id, topic)
        );

        CREATE INDEX IF NOT EXISTS idx_sched_due ON schedules(learner_id, next_review_at);
        ",
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

pub fn get_schema_version(conn: &Connection) -> Result<Option<i64>> {
    let mut stmt = conn.prepare("SELECT value FROM metadata WHERE key = 'schema_version'")?;
    let version = stmt
        .query_row([], |row| {
            let v: String = row.get(0)?;
            Ok(v.parse::<i64>().unwrap_or(0))
        })
        .ok();
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_creates_tables() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();

        for table in &["metadata", "schedules", "mastery"] {
            let count: i64 = conn
                .query_row(&format!("SELECT count(*) FROM {table}"), [], |row| {
                    row.get(0)
                })
                .unwrap();
            assert_eq!(count, 0, "table {table} should exist and be empty");
        }
    }

    #[test]
    fn test_schema_version_set() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), Some(SCHEMA_VERSION));
    }

    #[test]
    fn test_idempotent_initialize() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        initialize(&conn).unwrap();
    }

    #[test]
    fn test_busy_timeout_set() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();

        let timeout: i64 = conn
            .query_row("PRAGMA busy_timeout", [], |row| row.get(0))
            .unwrap();
        assert_eq!(timeout, 5000);
    }

    #[test]
    fn test_composite_key_is_unique() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();

        let insert = "INSERT INTO schedules (learner_id, item_id, easiness_factor, interval_days, \
                      next_review_at, created_at, updated_at) VALUES ('a', 'i', 2.5, 1, 0, 0, 0)";
        conn.execute(insert, []).unwrap();
        assert!(conn.execute(insert, []).is_err());
    }

    #[test]
    fn test_fresh_schedules_table_has_topic() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();

        conn.execute(
            "INSERT INTO schedules (learner_id, item_id, topic, easiness_factor, interval_days,
                 next_review_at, created_at, updated_at) VALUES ('a', 'i', 'x', 2.5, 1, 0, 0, 0)",
            [],
        )
        .unwrap();
        let topic: Option<String> = conn
            .query_row("SELECT topic FROM schedules", [], |row| row.get(0))
            .unwrap();
        assert_eq!(topic.as_deref(), Some("x"));
    }
}
