//! Topic mastery with time decay.
//!
//! Each attempt blends the observed correctness ratio with the previous score
//! decayed by the days since the last attempt. Lower bands decay faster. The
//! blend leans on the fresh ratio while the history is short, capped at 70%.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{MAX_MASTERY, MAX_RECENT_WEIGHT, MIN_MASTERY, RECENT_WEIGHT_ATTEMPTS};
use crate::error::{EngineError, Result};
use crate::time::whole_days_between;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MasteryBand {
    Beginner,
    Intermediate,
    Advanced,
    Expert,
}

impl MasteryBand {
    /// Band for a score: `[0,25)`, `[25,60)`, `[60,85)`, `[85,100]`.
    pub fn of(score: f64) -> Self {
        if score >= 85.0 {
            MasteryBand::Expert
        } else if score >= 60.0 {
            MasteryBand::Advanced
        } else if score >= 25.0 {
            MasteryBand::Intermediate
        } else {
            MasteryBand::Beginner
        }
    }

    /// Fraction of the score lost per idle day.
    pub fn daily_decay_rate(self) -> f64 {
        match self {
            MasteryBand::Beginner => 0.02,
            MasteryBand::Intermediate => 0.015,
            MasteryBand::Advanced => 0.01,
            MasteryBand::Expert => 0.005,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MasteryBand::Beginner => "beginner",
            MasteryBand::Intermediate => "intermediate",
            MasteryBand::Advanced => "advanced",
            MasteryBand::Expert => "expert",
        }
    }
}

impl fmt::Display for MasteryBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MasteryBand {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "beginner" => Ok(MasteryBand::Beginner),
            "intermediate" => Ok(MasteryBand::Intermediate),
            "advanced" => Ok(MasteryBand::Advanced),
            "expert" => Ok(MasteryBand::Expert),
            other => Err(EngineError::invalid(format!("unknown mastery band '{other}'"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MasteryKey {
    pub learner_id: String,
    pub topic: String,
}

impl MasteryKey {
    pub fn new(learner_id: &str, topic: &str) -> Self {
        Self {
            learner_id: learner_id.to_string(),
            topic: topic.to_string(),
        }
    }
}

impl fmt::Display for MasteryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mastery {}/{}", self.learner_id, self.topic)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MasteryRecord {
    pub learner_id: String,
    pub topic: String,
    pub mastery_score: f64,
    pub total_attempts: u32,
    pub correct_attempts: u32,
    pub mastery_band: MasteryBand,
    pub improvement_streak: u32,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub version: u64,
}

impl MasteryRecord {
    pub fn new(learner_id: &str, topic: &str, now: DateTime<Utc>) -> Self {
        Self {
            learner_id: learner_id.to_string(),
            topic: topic.to_string(),
            mastery_score: 0.0,
            total_attempts: 0,
            correct_attempts: 0,
            mastery_band: MasteryBand::Beginner,
            improvement_streak: 0,
            last_updated: now,
            version: 0,
        }
    }

    pub fn key(&self) -> MasteryKey {
        MasteryKey::new(&self.learner_id, &self.topic)
    }

    /// Fold one attempt into the estimate.
    pub fn apply_attempt(&mut self, correct: bool, now: DateTime<Utc>) {
        let previous = self.mastery_score;
        let days_since_last = if self.total_attempts == 0 {
            0
        } else {
            whole_days_between(self.last_updated, now)
        };

        self.total_attempts += 1;
        if correct {
            self.correct_attempts += 1;
        }

        self.mastery_score = blend_mastery(
            self.correct_attempts,
            self.total_attempts,
            previous,
            days_since_last,
        );
        self.mastery_band = MasteryBand::of(self.mastery_score);

        if self.mastery_score > previous {
            self.improvement_streak += 1;
        } else {
            self.improvement_streak = 0;
        }
        self.last_updated = now;
    }

    /// Check record invariants. Used when accepting records from outside.
    pub fn validate(&self) -> Result<()> {
        if self.learner_id.is_empty() || self.topic.is_empty() {
            return Err(EngineError::invalid("mastery key must not be empty"));
        }
        if !(MIN_MASTERY..=MAX_MASTERY).contains(&self.mastery_score) {
            return Err(EngineError::invalid(format!(
                "{}: score {} outside [0, 100]",
                self.key(),
                self.mastery_score
            )));
        }
        if self.correct_attempts > self.total_attempts {
            return Err(EngineError::invalid(format!(
                "{}: {} correct of {} attempts",
                self.key(),
                self.correct_attempts,
                self.total_attempts
            )));
        }
        if self.mastery_band != MasteryBand::of(self.mastery_score) {
            return Err(EngineError::invalid(format!(
                "{}: band {} does not match score {}",
                self.key(),
                self.mastery_band,
                self.mastery_score
            )));
        }
        Ok(())
    }
}

/// Functional form of [`MasteryRecord::apply_attempt`].
pub fn record_topic_attempt(
    mut record: MasteryRecord,
    correct: bool,
    now: DateTime<Utc>,
) -> MasteryRecord {
    record.apply_attempt(correct, now);
    record
}

/// New mastery score from the running counts, the previous score, and the gap.
pub fn blend_mastery(
    correct_attempts: u32,
    total_attempts: u32,
    previous_score: f64,
    days_since_last: i64,
) -> f64 {
    if total_attempts == 0 {
        return 0.0;
    }

    let mut mastery = correct_attempts as f64 / total_attempts as f64 * 100.0;

    if days_since_last > 0 && previous_score > 0.0 {
        let prior = decayed_prior(previous_score, days_since_last);
        let weight = recent_weight(total_attempts);
        mastery = mastery * weight + prior * (1.0 - weight);
    }

    mastery.clamp(MIN_MASTERY, MAX_MASTERY)
}

/// `previous * (1 - rate(band(previous)))^days`.
pub fn decayed_prior(previous_score: f64, days: i64) -> f64 {
    let rate = MasteryBand::of(previous_score).daily_decay_rate();
    let days = i32::try_from(days.max(0)).unwrap_or(i32::MAX);
    previous_score * (1.0 - rate).powi(days)
}

/// Share of the blend given to the fresh ratio: `min(0.7, total / 10)`.
pub fn recent_weight(total_attempts: u32) -> f64 {
    (total_attempts as f64 / RECENT_WEIGHT_ATTEMPTS).min(MAX_RECENT_WEIGHT)
}
