use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};

use cadence_core::{ImportSummary, Snapshot, export_json, import_json};

use crate::error::{Result, StoreError};
use crate::store::Store;

impl Store {
    /// Build a snapshot of every record, or of one learner's records.
    pub fn snapshot(&self, learner_id: Option<&str>, now: DateTime<Utc>) -> Result<Snapshot> {
        Ok(Snapshot::new(
            self.load_schedules(learner_id)?,
            self.load_mastery_records(learner_id)?,
            now,
        ))
    }

    /// Export as a pretty-printed JSON string.
    pub fn export_json_string(
        &self,
        learner_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let snapshot = self.snapshot(learner_id, now)?;
        export_json(&snapshot)
            .map_err(|e| StoreError::InvalidData(format!("JSON export failed: {e}")))
    }

    pub fn export_json_file(
        &self,
        path: &Path,
        learner_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let json = self.export_json_string(learner_id, now)?;
        fs::write(path, json)?;
        tracing::info!(path = %path.display(), "exported snapshot");
        Ok(())
    }

    /// Validate and upsert a JSON snapshot in one transaction. Nothing is
    /// written if any record is invalid.
    pub fn import_json_str(&self, json: &str) -> Result<ImportSummary> {
        let snapshot = import_json(json)
            .map_err(|e| StoreError::InvalidData(format!("invalid snapshot: {e}")))?;

        let tx = self.conn().unchecked_transaction()?;
        for record in &snapshot.schedules {
            self.upsert_schedule(&tx, record)?;
        }
        for record in &snapshot.mastery {
            self.upsert_mastery(&tx, record)?;
        }
        tx.commit()?;

        self.set_metadata("last_import_at", &snapshot.exported_at.to_rfc3339())?;
        Ok(ImportSummary {
            schedules: snapshot.schedules.len(),
            mastery: snapshot.mastery.len(),
        })
    }

    pub fn import_json_file(&self, path: &Path) -> Result<ImportSummary> {
        let json = fs::read_to_string(path)?;
        let summary = self.import_json_str(&json)?;
        tracing::info!(
            path = %path.display(),
            schedules = summary.schedules,
            mastery = summary.mastery,
            "imported snapshot"
        );
        Ok(summary)
    }
}
