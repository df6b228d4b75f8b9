//! JSON snapshot of schedule and mastery records.
//!
//! Records travel as-is (snake_case fields, RFC 3339 timestamps, histories as
//! plain arrays). Versions are local concurrency tokens and are reset on import.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::mastery::MasteryRecord;
use crate::schedule::ScheduleRecord;

pub const CURRENT_VERSION: &str = "1";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    #[serde(default)]
    pub schedules: Vec<ScheduleRecord>,
    #[serde(default)]
    pub mastery: Vec<MasteryRecord>,
}

impl Snapshot {
    pub fn new(
        schedules: Vec<ScheduleRecord>,
        mastery: Vec<MasteryRecord>,
        exported_at: DateTime<Utc>,
    ) -> Self {
        Self {
            version: CURRENT_VERSION.to_string(),
            exported_at,
            schedules,
            mastery,
        }
    }

    /// Reject the whole snapshot if any record breaks an invariant.
    pub fn validate(&self) -> Result<()> {
        if self.version != CURRENT_VERSION {
            return Err(EngineError::invalid(format!(
                "unsupported snapshot version '{}' (expected {CURRENT_VERSION})",
                self.version
            )));
        }
        for r in &self.schedules {
            r.validate()?;
        }
        for r in &self.mastery {
            r.validate()?;
        }
        Ok(())
    }
}

/// Serialize a snapshot to pretty-printed JSON.
pub fn export_json(snapshot: &Snapshot) -> Result<String> {
    serde_json::to_string_pretty(snapshot).map_err(|e| EngineError::Storage(Box::new(e)))
}

/// Parse and validate a snapshot. Malformed JSON is `InvalidInput`.
pub fn import_json(json: &str) -> Result<Snapshot> {
    let mut snapshot: Snapshot = serde_json::from_str(json)
        .map_err(|e| EngineError::invalid(format!("malformed snapshot: {e}")))?;
    snapshot.validate()?;
    for r in &mut snapshot.schedules {
        r.version = 0;
    }
    for r in &mut snapshot.mastery {
        r.version = 0;
    }
    Ok(snapshot)
}
