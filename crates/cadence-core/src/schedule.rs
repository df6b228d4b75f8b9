//! SM-2 schedule state per (learner, item).
//!
//! A record is created lazily on first exposure and only ever advanced by
//! [`ScheduleRecord::apply_review`]. Whether an item is new, scheduled or due
//! is never stored; it falls out of `next_review_at` and the query time.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_EASINESS, EMOTION_SAMPLE_SIZE, EMOTION_WINDOW_HOURS, INITIAL_INTERVAL_DAYS,
    MAX_EASINESS_MULTIPLICATIVE, MAX_QUALITY, MIN_EASINESS, SECOND_INTERVAL_DAYS,
    SUCCESS_THRESHOLD,
};
use crate::error::{EngineError, Result};
use crate::history::BoundedHistory;
use crate::quality::{AttemptOutcome, QualityScore, validate_quality};
use crate::time::{add_days, whole_days_between};

/// Composite identity of a schedule record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScheduleKey {
    pub learner_id: String,
    pub item_id: String,
}

impl ScheduleKey {
    pub fn new(learner_id: &str, item_id: &str) -> Self {
        Self {
            learner_id: learner_id.to_string(),
            item_id: item_id.to_string(),
        }
    }
}

impl fmt::Display for ScheduleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "schedule {}/{}", self.learner_id, self.item_id)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QualityEntry {
    pub quality: f64,
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub response_time_seconds: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmotionEntry {
    pub emotion: String,
    pub at: DateTime<Utc>,
    /// Quality of the attempt this emotion was observed on.
    #[serde(default)]
    pub quality: Option<f64>,
}

/// Read-derived lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleState {
    /// No record exists yet.
    New,
    /// `next_review_at` is in the future.
    Scheduled,
    /// `now >= next_review_at`.
    Due,
}

impl ScheduleState {
    pub fn of(record: Option<&ScheduleRecord>, now: DateTime<Utc>) -> Self {
        match record {
            None => ScheduleState::New,
            Some(r) if r.is_due(now) => ScheduleState::Due,
            Some(_) => ScheduleState::Scheduled,
        }
    }
}

/// How a review moves the easiness factor and interval.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulingStrategy {
    /// Emotion delta added to easiness before the SM-2 update; easiness is
    /// only lower-clamped.
    #[default]
    Additive,
    /// SM-2 update clamped to `[1.3, 3.0]`, then scaled by a ratio derived
    /// from recent emotion history.
    Multiplicative,
}

impl fmt::Display for SchedulingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulingStrategy::Additive => f.write_str("additive"),
            SchedulingStrategy::Multiplicative => f.write_str("multiplicative"),
        }
    }
}

impl FromStr for SchedulingStrategy {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "additive" => Ok(SchedulingStrategy::Additive),
            "multiplicative" => Ok(SchedulingStrategy::Multiplicative),
            other => Err(EngineError::invalid(format!(
                "unknown scheduling strategy '{other}' (expected additive or multiplicative)"
            ))),
        }
    }
}

/// Everything the scheduler needs from one scored attempt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub quality: f64,
    #[serde(default)]
    pub easiness_delta: f64,
    #[serde(default)]
    pub response_time_seconds: Option<f64>,
    #[serde(default)]
    pub emotion: Option<String>,
    /// Whether the answer itself was right. `None` when only a quality is known.
    #[serde(default)]
    pub correct: Option<bool>,
}

impl Review {
    pub fn new(quality: f64, easiness_delta: f64) -> Self {
        Self {
            quality,
            easiness_delta,
            response_time_seconds: None,
            emotion: None,
            correct: None,
        }
    }

    /// Pair a computed score with the outcome's latency and emotion for history.
    ///
    /// An explicit quality stands on its own, so correctness is only carried
    /// over when the score was derived from the outcome.
    pub fn from_score(score: QualityScore, outcome: &AttemptOutcome) -> Self {
        Self {
            quality: score.quality,
            easiness_delta: score.easiness_delta,
            response_time_seconds: outcome.response_time_seconds,
            emotion: outcome.emotion.clone(),
            correct: outcome.explicit_quality.is_none().then_some(outcome.correct),
        }
    }

    pub fn with_correct(mut self, correct: bool) -> Self {
        self.correct = Some(correct);
        self
    }

    pub fn with_response_time(mut self, seconds: f64) -> Self {
        self.response_time_seconds = Some(seconds);
        self
    }

    pub fn with_emotion(mut self, emotion: impl Into<String>) -> Self {
        self.emotion = Some(emotion.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.quality >= SUCCESS_THRESHOLD
    }

    /// Correctness when known, else the quality threshold.
    pub fn is_correct(&self) -> bool {
        self.correct.unwrap_or_else(|| self.is_success())
    }

    fn validate(&self) -> Result<()> {
        validate_quality(self.quality)?;
        if !self.easiness_delta.is_finite() {
            return Err(EngineError::invalid("easiness delta must be finite"));
        }
        if let Some(seconds) = self.response_time_seconds
            && !(seconds >= 0.0 && seconds.is_finite())
        {
            return Err(EngineError::invalid(format!(
                "response time must be a non-negative number of seconds, got {seconds}"
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRecord {
    pub learner_id: String,
    pub item_id: String,
    #[serde(default)]
    pub topic: Option<String>,
    pub easiness_factor: f64,
    pub interval_days: i64,
    pub repetitions: u32,
    pub next_review_at: DateTime<Utc>,
    #[serde(default)]
    pub quality_history: BoundedHistory<QualityEntry>,
    #[serde(default)]
    pub emotion_history: BoundedHistory<EmotionEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic-concurrency token. 0 means never persisted.
    #[serde(default)]
    pub version: u64,
}

impl ScheduleRecord {
    /// Default state on first exposure: due again tomorrow.
    pub fn new(learner_id: &str, item_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            learner_id: learner_id.to_string(),
            item_id: item_id.to_string(),
            topic: None,
            easiness_factor: DEFAULT_EASINESS,
            interval_days: INITIAL_INTERVAL_DAYS,
            repetitions: 0,
            next_review_at: add_days(now, INITIAL_INTERVAL_DAYS),
            quality_history: BoundedHistory::new(),
            emotion_history: BoundedHistory::new(),
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn with_topic(mut self, topic: Option<&str>) -> Self {
        self.topic = topic.map(str::to_string);
        self
    }

    pub fn key(&self) -> ScheduleKey {
        ScheduleKey::new(&self.learner_id, &self.item_id)
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_review_at <= now
    }

    pub fn state(&self, now: DateTime<Utc>) -> ScheduleState {
        ScheduleState::of(Some(self), now)
    }

    /// Whole days past due, zero when not yet due.
    pub fn overdue_days(&self, now: DateTime<Utc>) -> i64 {
        overdue_days(self, now)
    }

    /// Advance the record by one scored review.
    ///
    /// Validates first; on error the record is left untouched.
    pub fn apply_review(
        &mut self,
        review: &Review,
        now: DateTime<Utc>,
        strategy: SchedulingStrategy,
    ) -> Result<()> {
        review.validate()?;

        self.quality_history.push(QualityEntry {
            quality: review.quality,
            at: now,
            response_time_seconds: review.response_time_seconds,
        });
        if let Some(emotion) = &review.emotion {
            self.emotion_history.push(EmotionEntry {
                emotion: emotion.clone(),
                at: now,
                quality: Some(review.quality),
            });
        }

        match strategy {
            SchedulingStrategy::Additive => self.advance_additive(review),
            SchedulingStrategy::Multiplicative => self.advance_multiplicative(review, now),
        }

        self.next_review_at = add_days(now, self.interval_days);
        self.updated_at = now;
        Ok(())
    }

    fn advance_additive(&mut self, review: &Review) {
        let adjusted = self.easiness_factor + review.easiness_delta;

        if review.is_success() {
            self.interval_days = match self.repetitions {
                0 => INITIAL_INTERVAL_DAYS,
                1 => SECOND_INTERVAL_DAYS,
                _ => ((self.interval_days as f64 * adjusted).round() as i64).max(1),
            };
            self.repetitions += 1;
        } else {
            self.repetitions = 0;
            self.interval_days = INITIAL_INTERVAL_DAYS;
        }

        self.easiness_factor = (adjusted + sm2_easiness_delta(review.quality)).max(MIN_EASINESS);
    }

    fn advance_multiplicative(&mut self, review: &Review, now: DateTime<Utc>) {
        let updated = (self.easiness_factor + sm2_easiness_delta(review.quality))
            .clamp(MIN_EASINESS, MAX_EASINESS_MULTIPLICATIVE);
        let ratio = emotion_ratio(&self.emotion_history, now);
        self.easiness_factor = (updated * ratio).clamp(MIN_EASINESS, MAX_EASINESS_MULTIPLICATIVE);

        // A correct but weak answer still counts as a repetition; the low
        // quality only holds the interval at one day.
        if review.is_correct() {
            // Interval is picked from the already-incremented count.
            self.repetitions += 1;
            self.interval_days = if !review.is_success() {
                INITIAL_INTERVAL_DAYS
            } else if self.repetitions == 1 {
                SECOND_INTERVAL_DAYS
            } else {
                ((self.interval_days as f64 * self.easiness_factor).floor() as i64).max(1)
            };
        } else {
            self.repetitions = 0;
            self.interval_days = INITIAL_INTERVAL_DAYS;
        }
    }

    /// Shift the due time by a signed number of days.
    pub fn reschedule(&mut self, days: i64, now: DateTime<Utc>) {
        self.next_review_at = add_days(self.next_review_at, days);
        self.updated_at = now;
    }

    /// Check record invariants. Used when accepting records from outside.
    pub fn validate(&self) -> Result<()> {
        if self.learner_id.is_empty() || self.item_id.is_empty() {
            return Err(EngineError::invalid("schedule key must not be empty"));
        }
        if !(self.easiness_factor >= MIN_EASINESS && self.easiness_factor.is_finite()) {
            return Err(EngineError::invalid(format!(
                "{}: easiness factor {} below {MIN_EASINESS}",
                self.key(),
                self.easiness_factor
            )));
        }
        if self.interval_days < 1 {
            return Err(EngineError::invalid(format!(
                "{}: interval must be at least one day, got {}",
                self.key(),
                self.interval_days
            )));
        }
        if self
            .quality_history
            .iter()
            .any(|q| !(0.0..=MAX_QUALITY).contains(&q.quality))
        {
            return Err(EngineError::invalid(format!(
                "{}: quality history holds a score outside [0, 5]",
                self.key()
            )));
        }
        if self
            .emotion_history
            .iter()
            .filter_map(|e| e.quality)
            .any(|q| !(0.0..=MAX_QUALITY).contains(&q))
        {
            return Err(EngineError::invalid(format!(
                "{}: emotion history holds a score outside [0, 5]",
                self.key()
            )));
        }
        Ok(())
    }
}

/// Functional form of [`ScheduleRecord::apply_review`] with the canonical strategy.
pub fn record_attempt(
    mut record: ScheduleRecord,
    review: &Review,
    now: DateTime<Utc>,
) -> Result<ScheduleRecord> {
    record.apply_review(review, now, SchedulingStrategy::Additive)?;
    Ok(record)
}

/// SM-2 easiness change for a quality score: +0.1 at 5, -0.8 at 0.
pub fn sm2_easiness_delta(quality: f64) -> f64 {
    let miss = MAX_QUALITY - quality;
    0.1 - miss * (0.08 + miss * 0.02)
}

/// Whole days `record` is past due at `now`, floored at zero.
pub fn overdue_days(record: &ScheduleRecord, now: DateTime<Utc>) -> i64 {
    whole_days_between(record.next_review_at, now)
}

const POSITIVE_EMOTIONS: [&str; 3] = ["happy", "surprise", "neutral"];
const NEGATIVE_EMOTIONS: [&str; 4] = ["sad", "angry", "fear", "disgust"];

/// 0.8 when recent emotions are mostly negative, 1.2 when mostly positive, else 1.0.
pub fn emotion_ratio(history: &BoundedHistory<EmotionEntry>, now: DateTime<Utc>) -> f64 {
    let since = now - Duration::hours(EMOTION_WINDOW_HOURS);
    let recent: Vec<String> = history
        .iter()
        .rev()
        .filter(|e| e.at >= since && e.at <= now)
        .take(EMOTION_SAMPLE_SIZE)
        .map(|e| e.emotion.to_ascii_lowercase())
        .collect();

    if recent.is_empty() {
        return 1.0;
    }

    let total = recent.len() as f64;
    let positive = recent
        .iter()
        .filter(|e| POSITIVE_EMOTIONS.contains(&e.as_str()))
        .count() as f64;
    let negative = recent
        .iter()
        .filter(|e| NEGATIVE_EMOTIONS.contains(&e.as_str()))
        .count() as f64;

    if negative / total > 0.6 {
        0.8
    } else if positive / total > 0.6 {
        1.2
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn fresh() -> ScheduleRecord {
        ScheduleRecord::new("alice", "card-1", t0())
    }

    #[test]
    fn test_new_record_defaults() {
        let r = fresh();
        assert_eq!(r.easiness_factor, 2.5);
        assert_eq!(r.interval_days, 1);
        assert_eq!(r.repetitions, 0);
        assert_eq!(r.next_review_at, t0() + Duration::days(1));
        assert_eq!(r.version, 0);
        assert!(r.quality_history.is_empty());
    }

    #[test]
    fn test_first_success_scenario() {
        let r = record_attempt(fresh(), &Review::new(5.0, 0.0), t0()).unwrap();
        assert_eq!(r.interval_days, 1);
        assert_eq!(r.repetitions, 1);
        assert_relative_eq!(r.easiness_factor, 2.6, epsilon = 1e-12);
        assert_eq!(r.next_review_at, t0() + Duration::days(1));
    }

    #[test]
    fn test_second_success_with_happy_hint() {
        let r = record_attempt(fresh(), &Review::new(5.0, 0.0), t0()).unwrap();
        let t1 = t0() + Duration::days(1);
        let r = record_attempt(r, &Review::new(3.5, 0.05).with_emotion("happy"), t1).unwrap();
        assert_eq!(r.interval_days, 6);
        assert_eq!(r.repetitions, 2);
        assert_relative_eq!(r.easiness_factor, 2.585, epsilon = 1e-9);
        assert_eq!(r.next_review_at, t1 + Duration::days(6));
        assert_eq!(r.emotion_history.len(), 1);
    }

    #[test]
    fn test_third_success_multiplies_interval() {
        let mut r = fresh();
        r.repetitions = 2;
        r.interval_days = 6;
        r.easiness_factor = 2.5;
        let r = record_attempt(r, &Review::new(4.0, 0.0), t0()).unwrap();
        // round(6 * 2.5) = 15
        assert_eq!(r.interval_days, 15);
        assert_eq!(r.repetitions, 3);
        assert_relative_eq!(r.easiness_factor, 2.5, epsilon = 1e-12);
    }

    #[test]
    fn test_quality_three_is_success() {
        let r = record_attempt(fresh(), &Review::new(3.0, 0.0), t0()).unwrap();
        assert_eq!(r.repetitions, 1);
        assert_relative_eq!(r.easiness_factor, 2.36, epsilon = 1e-12);
    }

    #[test]
    fn test_failure_resets() {
        let mut r = fresh();
        r.repetitions = 4;
        r.interval_days = 40;
        let r = record_attempt(r, &Review::new(2.9, 0.0), t0()).unwrap();
        assert_eq!(r.repetitions, 0);
        assert_eq!(r.interval_days, 1);
    }

    #[test]
    fn test_easiness_floor() {
        let mut r = fresh();
        for i in 0..10 {
            r = record_attempt(r, &Review::new(0.0, -0.1), t0() + Duration::days(i)).unwrap();
        }
        assert_relative_eq!(r.easiness_factor, MIN_EASINESS);
    }

    #[test]
    fn test_additive_has_no_upper_clamp() {
        let mut r = fresh();
        for i in 0..20 {
            r = record_attempt(r, &Review::new(5.0, 0.1), t0() + Duration::days(i)).unwrap();
        }
        assert!(r.easiness_factor > 3.0, "got {}", r.easiness_factor);
    }

    #[test]
    fn test_invalid_quality_leaves_record_untouched() {
        let mut r = fresh();
        let before = r.clone();
        let err = r
            .apply_review(&Review::new(7.0, 0.0), t0(), SchedulingStrategy::Additive)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
        assert_eq!(r, before);
    }

    #[test]
    fn test_history_keeps_latency() {
        let review = Review::new(4.0, 0.0).with_response_time(7.5);
        let r = record_attempt(fresh(), &review, t0()).unwrap();
        let entry = r.quality_history.latest().unwrap();
        assert_eq!(entry.response_time_seconds, Some(7.5));
        assert_eq!(entry.at, t0());
    }

    #[test]
    fn test_state_derivation() {
        let r = fresh();
        assert_eq!(ScheduleState::of(None, t0()), ScheduleState::New);
        assert_eq!(r.state(t0()), ScheduleState::Scheduled);
        assert_eq!(r.state(t0() + Duration::days(1)), ScheduleState::Due);
    }

    #[test]
    fn test_overdue_days() {
        let r = fresh();
        assert_eq!(r.overdue_days(t0()), 0);
        assert_eq!(r.overdue_days(t0() + Duration::hours(30)), 0);
        assert_eq!(r.overdue_days(t0() + Duration::days(4)), 3);
    }

    #[test]
    fn test_reschedule_shifts_both_ways() {
        let mut r = fresh();
        let later = t0() + Duration::hours(2);
        r.reschedule(3, later);
        assert_eq!(r.next_review_at, t0() + Duration::days(4));
        r.reschedule(-2, later);
        assert_eq!(r.next_review_at, t0() + Duration::days(2));
        assert_eq!(r.updated_at, later);
    }

    #[test]
    fn test_sm2_delta_endpoints() {
        assert_relative_eq!(sm2_easiness_delta(5.0), 0.1);
        assert_relative_eq!(sm2_easiness_delta(4.0), 0.0, epsilon = 1e-12);
        assert_relative_eq!(sm2_easiness_delta(0.0), -0.8, epsilon = 1e-12);
    }

    #[test]
    fn test_multiplicative_first_success_jumps_to_six() {
        let mut r = fresh();
        r.apply_review(&Review::new(4.0, 0.0), t0(), SchedulingStrategy::Multiplicative)
            .unwrap();
        assert_eq!(r.repetitions, 1);
        assert_eq!(r.interval_days, 6);
        assert_relative_eq!(r.easiness_factor, 2.5, epsilon = 1e-12);
    }

    #[test]
    fn test_multiplicative_clamps_and_scales() {
        let mut r = fresh();
        r.easiness_factor = 2.9;
        r.apply_review(
            &Review::new(5.0, 0.0).with_emotion("happy"),
            t0(),
            SchedulingStrategy::Multiplicative,
        )
        .unwrap();
        // min(3.0, 2.9 + 0.1) * 1.2 → clamped back to 3.0
        assert_relative_eq!(r.easiness_factor, 3.0);

        let mut r = fresh();
        r.apply_review(
            &Review::new(4.0, 0.0).with_emotion("sad"),
            t0(),
            SchedulingStrategy::Multiplicative,
        )
        .unwrap();
        assert_relative_eq!(r.easiness_factor, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_multiplicative_truncates_interval() {
        let mut r = fresh();
        r.repetitions = 1;
        r.interval_days = 6;
        r.easiness_factor = 2.45;
        r.apply_review(&Review::new(4.0, 0.0), t0(), SchedulingStrategy::Multiplicative)
            .unwrap();
        // floor(6 * 2.45) = 14
        assert_eq!(r.interval_days, 14);
        assert_eq!(r.repetitions, 2);
    }

    #[test]
    fn test_multiplicative_slow_correct_keeps_repetition() {
        let mut r = fresh();
        r.repetitions = 3;
        r.interval_days = 20;
        let outcome = AttemptOutcome::correct()
            .with_response_time(40.0)
            .with_confidence(0.0);
        let score = crate::quality::score_quality(&outcome).unwrap();
        assert_relative_eq!(score.quality, 2.5);

        r.apply_review(
            &Review::from_score(score, &outcome),
            t0(),
            SchedulingStrategy::Multiplicative,
        )
        .unwrap();
        assert_eq!(r.repetitions, 4);
        assert_eq!(r.interval_days, 1);
    }

    #[test]
    fn test_multiplicative_incorrect_resets_despite_quality() {
        let mut r = fresh();
        r.repetitions = 2;
        r.interval_days = 15;
        r.apply_review(
            &Review::new(4.0, 0.0).with_correct(false),
            t0(),
            SchedulingStrategy::Multiplicative,
        )
        .unwrap();
        assert_eq!(r.repetitions, 0);
        assert_eq!(r.interval_days, 1);
    }

    #[test]
    fn test_additive_ignores_correct_flag() {
        let slow = Review::new(2.5, 0.0).with_correct(true);
        let r = record_attempt(fresh(), &slow, t0()).unwrap();
        assert_eq!(r.repetitions, 0);
    }

    #[test]
    fn test_explicit_quality_drops_correct_flag() {
        let outcome = AttemptOutcome::incorrect().with_explicit_quality(4.0);
        let score = crate::quality::score_quality(&outcome).unwrap();
        let review = Review::from_score(score, &outcome);
        assert_eq!(review.correct, None);
        assert!(review.is_correct());
    }

    #[test]
    fn test_emotion_ratio_window() {
        let mut h = BoundedHistory::new();
        assert_eq!(emotion_ratio(&h, t0()), 1.0);

        // Old negative emotions fall outside the two-hour window.
        for _ in 0..3 {
            h.push(EmotionEntry {
                emotion: "sad".into(),
                at: t0() - Duration::hours(5),
                quality: None,
            });
        }
        assert_eq!(emotion_ratio(&h, t0()), 1.0);

        for _ in 0..4 {
            h.push(EmotionEntry {
                emotion: "angry".into(),
                at: t0() - Duration::minutes(10),
                quality: None,
            });
        }
        assert_eq!(emotion_ratio(&h, t0()), 0.8);

        for _ in 0..5 {
            h.push(EmotionEntry {
                emotion: "Happy".into(),
                at: t0(),
                quality: None,
            });
        }
        assert_eq!(emotion_ratio(&h, t0()), 1.2);
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!("Additive".parse::<SchedulingStrategy>().unwrap(), SchedulingStrategy::Additive);
        assert_eq!(
            "multiplicative".parse::<SchedulingStrategy>().unwrap(),
            SchedulingStrategy::Multiplicative
        );
        assert!("sm18".parse::<SchedulingStrategy>().is_err());
    }

    #[test]
    fn test_validate_rejects_broken_invariants() {
        let mut r = fresh();
        r.easiness_factor = 1.0;
        assert!(r.validate().is_err());

        let mut r = fresh();
        r.interval_days = 0;
        assert!(r.validate().is_err());

        assert!(fresh().validate().is_ok());
    }
}
