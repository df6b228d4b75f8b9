//! Aggregate read models over a learner's records.
//!
//! All functions are pure folds; the engine feeds them whatever the store
//! returns for one learner.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{
    IMPROVING_STREAK, RECENT_ACTIVITY_DAYS, STRENGTH_THRESHOLD, WEAKNESS_THRESHOLD,
};
use crate::mastery::{MasteryBand, MasteryRecord};
use crate::schedule::ScheduleRecord;

/// Label used in `topic_distribution` for records created without a topic.
pub const UNTAGGED_TOPIC: &str = "untagged";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RevisionStats {
    pub total: usize,
    pub due_now: usize,
    pub overdue: usize,
    pub average_easiness: f64,
    pub recent_activity: usize,
    pub topic_distribution: BTreeMap<String, usize>,
    pub next_review_at: Option<DateTime<Utc>>,
}

pub fn revision_stats(records: &[ScheduleRecord], now: DateTime<Utc>) -> RevisionStats {
    if records.is_empty() {
        return RevisionStats::default();
    }

    let recent_since = now - Duration::days(RECENT_ACTIVITY_DAYS);
    let mut stats = RevisionStats {
        total: records.len(),
        ..RevisionStats::default()
    };
    let mut easiness_sum = 0.0;

    for r in records {
        if r.next_review_at <= now {
            stats.due_now += 1;
        }
        if r.next_review_at < now {
            stats.overdue += 1;
        }
        if r.updated_at >= recent_since {
            stats.recent_activity += 1;
        }
        easiness_sum += r.easiness_factor;
        let topic = r.topic.as_deref().unwrap_or(UNTAGGED_TOPIC);
        *stats.topic_distribution.entry(topic.to_string()).or_default() += 1;
        stats.next_review_at = Some(match stats.next_review_at {
            Some(earliest) => earliest.min(r.next_review_at),
            None => r.next_review_at,
        });
    }

    stats.average_easiness = round2(easiness_sum / records.len() as f64);
    stats
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EmotionInsights {
    pub emotion_counts: BTreeMap<String, usize>,
    pub average_quality: BTreeMap<String, f64>,
    pub dominant: Option<String>,
    pub best: Option<String>,
    pub worst: Option<String>,
}

/// Emotion tallies and the mean quality of the attempts each emotion accompanied.
///
/// Entries without a recorded quality count but do not move the averages.
pub fn emotion_insights(records: &[ScheduleRecord]) -> EmotionInsights {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut quality_sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();

    for entry in records.iter().flat_map(|r| r.emotion_history.iter()) {
        let emotion = entry.emotion.to_ascii_lowercase();
        *counts.entry(emotion.clone()).or_default() += 1;
        if let Some(q) = entry.quality {
            let slot = quality_sums.entry(emotion).or_default();
            slot.0 += q;
            slot.1 += 1;
        }
    }

    let average_quality: BTreeMap<String, f64> = quality_sums
        .into_iter()
        .map(|(emotion, (sum, n))| (emotion, round2(sum / n as f64)))
        .collect();

    // BTreeMap iteration is alphabetical, so ties resolve to the first name.
    let dominant = counts
        .iter()
        .fold(None::<(&String, usize)>, |acc, (e, &n)| match acc {
            Some((_, best)) if best >= n => acc,
            _ => Some((e, n)),
        })
        .map(|(e, _)| e.clone());
    let best = average_quality
        .iter()
        .fold(None::<(&String, f64)>, |acc, (e, &q)| match acc {
            Some((_, top)) if top >= q => acc,
            _ => Some((e, q)),
        })
        .map(|(e, _)| e.clone());
    let worst = average_quality
        .iter()
        .fold(None::<(&String, f64)>, |acc, (e, &q)| match acc {
            Some((_, low)) if low <= q => acc,
            _ => Some((e, q)),
        })
        .map(|(e, _)| e.clone());

    EmotionInsights {
        emotion_counts: counts,
        average_quality,
        dominant,
        best,
        worst,
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TopicSummary {
    pub topic: String,
    pub mastery_score: f64,
    pub mastery_band: MasteryBand,
    pub total_attempts: u32,
    pub improvement_streak: u32,
    pub last_updated: DateTime<Utc>,
}

impl From<&MasteryRecord> for TopicSummary {
    fn from(r: &MasteryRecord) -> Self {
        Self {
            topic: r.topic.clone(),
            mastery_score: round2(r.mastery_score),
            mastery_band: r.mastery_band,
            total_attempts: r.total_attempts,
            improvement_streak: r.improvement_streak,
            last_updated: r.last_updated,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MasteryProfile {
    pub total_topics: usize,
    pub average_mastery: f64,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub improving: Vec<String>,
    /// Highest mastery first.
    pub topics: Vec<TopicSummary>,
}

pub fn mastery_profile(records: &[MasteryRecord]) -> MasteryProfile {
    if records.is_empty() {
        return MasteryProfile::default();
    }

    let mut topics: Vec<TopicSummary> = records.iter().map(TopicSummary::from).collect();
    topics.sort_by(|a, b| {
        b.mastery_score
            .total_cmp(&a.mastery_score)
            .then_with(|| a.topic.cmp(&b.topic))
    });

    let pick = |keep: &dyn Fn(&MasteryRecord) -> bool| -> Vec<String> {
        let mut names: Vec<String> = records
            .iter()
            .filter(|r| keep(r))
            .map(|r| r.topic.clone())
            .collect();
        names.sort();
        names
    };

    let sum: f64 = records.iter().map(|r| r.mastery_score).sum();
    MasteryProfile {
        total_topics: records.len(),
        average_mastery: round2(sum / records.len() as f64),
        strengths: pick(&|r| r.mastery_score >= STRENGTH_THRESHOLD),
        weaknesses: pick(&|r| r.mastery_score < WEAKNESS_THRESHOLD),
        improving: pick(&|r| r.improvement_streak >= IMPROVING_STREAK),
        topics,
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
