//! Integration tests driving the engine end to end:
//! score → schedule → mastery → due queue → stats → snapshot.

use std::sync::Arc;

use approx::assert_relative_eq;
use cadence_core::{
    AttemptOutcome, Engine, EngineError, FixedClock, MasteryBand, MemoryStore, Review,
    ScheduleState, annotate, export_json, import_json, sort_overdue_first,
};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 2, 8, 0, 0).unwrap()
}

fn setup() -> (Engine<MemoryStore, Arc<FixedClock>>, Arc<FixedClock>) {
    let clock = Arc::new(FixedClock::new(start()));
    (Engine::new(MemoryStore::new(), clock.clone()), clock)
}

fn review(engine: &Engine<MemoryStore, Arc<FixedClock>>, item: &str, outcome: AttemptOutcome) {
    let score = engine.score_quality(&outcome).unwrap();
    engine
        .record_attempt_tagged("ann", item, Some("algebra"), &Review::from_score(score, &outcome))
        .unwrap();
    engine
        .record_topic_attempt("ann", "algebra", outcome.correct)
        .unwrap();
}

/// Test 1: the staircase 1 → 6 → round(6 * ef) for a run of good answers.
#[test]
fn staircase_through_successive_reviews() {
    let (engine, clock) = setup();
    let good = || AttemptOutcome::correct().with_response_time(10.0).with_confidence(0.5);

    let mut intervals = Vec::new();
    for _ in 0..3 {
        review(&engine, "q1", good());
        let rec = engine.schedule("ann", "q1").unwrap().unwrap();
        intervals.push(rec.interval_days);
        clock.set(rec.next_review_at);
    }
    // quality 4.0 leaves ef at 2.5, so the third interval is 15.
    assert_eq!(intervals, vec![1, 6, 15]);
}

/// Test 2: a wrong answer drops the item back to a one-day interval.
#[test]
fn lapse_resets_progress() {
    let (engine, clock) = setup();
    for _ in 0..3 {
        review(&engine, "q1", AttemptOutcome::correct().with_response_time(2.0));
        clock.advance_days(7);
    }
    review(&engine, "q1", AttemptOutcome::incorrect());

    let rec = engine.schedule("ann", "q1").unwrap().unwrap();
    assert_eq!(rec.repetitions, 0);
    assert_eq!(rec.interval_days, 1);
    assert_eq!(rec.next_review_at, engine.now() + Duration::days(1));
    assert!(rec.easiness_factor >= 1.3);
}

/// Test 3: states are derived from the record and the query time.
#[test]
fn state_transitions_follow_clock() {
    let (engine, clock) = setup();
    assert_eq!(
        ScheduleState::of(engine.schedule("ann", "q1").unwrap().as_ref(), engine.now()),
        ScheduleState::New
    );
    review(&engine, "q1", AttemptOutcome::correct());
    let rec = engine.schedule("ann", "q1").unwrap().unwrap();
    assert_eq!(rec.state(engine.now()), ScheduleState::Scheduled);
    clock.advance_days(1);
    assert_eq!(rec.state(engine.now()), ScheduleState::Due);
}

/// Test 4: mastery climbs with correct answers and moves through bands.
#[test]
fn mastery_tracks_topic_performance() {
    let (engine, _) = setup();
    for item in ["q1", "q2", "q3", "q4"] {
        review(&engine, item, AttemptOutcome::correct());
    }
    let m = engine.mastery("ann", "algebra").unwrap().unwrap();
    assert_eq!(m.total_attempts, 4);
    assert_relative_eq!(m.mastery_score, 100.0);
    assert_eq!(m.mastery_band, MasteryBand::Expert);

    review(&engine, "q5", AttemptOutcome::incorrect());
    let m = engine.mastery("ann", "algebra").unwrap().unwrap();
    assert_relative_eq!(m.mastery_score, 80.0);
    assert_eq!(m.mastery_band, MasteryBand::Advanced);
    assert_eq!(m.improvement_streak, 0);
}

/// Test 5: due queue and calendar agree with overdue annotations.
#[test]
fn due_queue_and_calendar() {
    let (engine, clock) = setup();
    review(&engine, "q1", AttemptOutcome::incorrect());
    clock.advance(Duration::hours(6));
    review(&engine, "q2", AttemptOutcome::incorrect());
    clock.advance_days(4);

    let due: Vec<_> = engine.due_items("ann", 20).unwrap().collect();
    assert_eq!(due.len(), 2);
    assert_eq!(due[0].item_id, "q1");

    let mut entries = annotate(due, engine.now());
    sort_overdue_first(&mut entries);
    assert_eq!(entries[0].record.item_id, "q1");
    assert_eq!(entries[0].overdue_days, 3);

    let calendar = engine
        .calendar("ann", start(), start() + Duration::days(7))
        .unwrap();
    let day = NaiveDate::from_ymd_opt(2026, 2, 3).unwrap();
    assert_eq!(calendar.len(), 1);
    assert_eq!(calendar[&day].len(), 2);
}

/// Test 6: read models summarise what was recorded.
#[test]
fn stats_insights_and_profile() {
    let (engine, _) = setup();
    review(&engine, "q1", AttemptOutcome::correct().with_emotion("happy"));
    review(&engine, "q2", AttemptOutcome::incorrect().with_emotion("frustrated"));

    let stats = engine.stats("ann").unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.topic_distribution["algebra"], 2);
    assert_eq!(stats.recent_activity, 2);

    let insights = engine.insights("ann").unwrap();
    assert_eq!(insights.emotion_counts.len(), 2);
    assert_eq!(insights.best.as_deref(), Some("happy"));
    assert_eq!(insights.worst.as_deref(), Some("frustrated"));

    let profile = engine.profile("ann").unwrap();
    assert_eq!(profile.total_topics, 1);
    assert_relative_eq!(profile.average_mastery, 50.0);
}

/// Test 7: JSON snapshot carries state into a fresh engine.
#[test]
fn snapshot_restores_state() {
    let (engine, _) = setup();
    review(&engine, "q1", AttemptOutcome::correct().with_emotion("excited"));

    let json = export_json(&engine.export_snapshot(None).unwrap()).unwrap();
    let snapshot = import_json(&json).unwrap();

    let (restored, _) = setup();
    restored.import_snapshot(&snapshot).unwrap();
    let a = engine.schedule("ann", "q1").unwrap().unwrap();
    let b = restored.schedule("ann", "q1").unwrap().unwrap();
    assert_eq!(a.quality_history, b.quality_history);
    assert_eq!(a.emotion_history, b.emotion_history);
    assert_eq!(a.next_review_at, b.next_review_at);
    assert!(restored.mastery("ann", "algebra").unwrap().is_some());
}

/// Test 8: bad input is rejected before anything is stored.
#[test]
fn invalid_input_is_atomic() {
    let (engine, _) = setup();
    let err = engine
        .score_quality(&AttemptOutcome::correct().with_confidence(1.5))
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));

    let err = engine
        .record_attempt("ann", "q1", &Review::new(2.0, 0.0).with_response_time(-3.0))
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
    assert!(engine.schedule("ann", "q1").unwrap().is_none());
}
