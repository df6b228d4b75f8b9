/// Easiness factor assigned to a freshly created schedule record.
pub const DEFAULT_EASINESS: f64 = 2.5;

/// Lower bound on the easiness factor. Items at the floor are "hard to retain".
pub const MIN_EASINESS: f64 = 1.3;

/// Upper bound applied only by the multiplicative strategy.
pub const MAX_EASINESS_MULTIPLICATIVE: f64 = 3.0;

/// Interval assigned on creation, on failure, and on the first success.
pub const INITIAL_INTERVAL_DAYS: i64 = 1;

/// Interval assigned on the second consecutive success.
pub const SECOND_INTERVAL_DAYS: i64 = 6;

/// Quality at or above this counts as a successful recall (inclusive).
pub const SUCCESS_THRESHOLD: f64 = 3.0;

/// Top of the quality scale.
pub const MAX_QUALITY: f64 = 5.0;

/// Retained quality/emotion history entries per schedule record.
pub const HISTORY_CAPACITY: usize = 10;

/// Base quality for a correct answer before speed and confidence bonuses.
pub const CORRECT_BASE_QUALITY: f64 = 3.0;

/// Mastery score bounds.
pub const MIN_MASTERY: f64 = 0.0;
pub const MAX_MASTERY: f64 = 100.0;

/// Cap on how much of the blended mastery comes from the fresh ratio.
pub const MAX_RECENT_WEIGHT: f64 = 0.7;

/// Attempt count at which the fresh ratio would reach full weight (before the cap).
pub const RECENT_WEIGHT_ATTEMPTS: f64 = 10.0;

/// Default number of due items returned when the caller gives no limit.
pub const DEFAULT_DUE_LIMIT: usize = 20;

/// Window for "recent activity" in revision stats.
pub const RECENT_ACTIVITY_DAYS: i64 = 7;

/// Multiplicative strategy: look-back window and sample size for the emotion ratio.
pub const EMOTION_WINDOW_HOURS: i64 = 2;
pub const EMOTION_SAMPLE_SIZE: usize = 5;

/// Profile thresholds on mastery score.
pub const STRENGTH_THRESHOLD: f64 = 80.0;
pub const WEAKNESS_THRESHOLD: f64 = 40.0;
pub const IMPROVING_STREAK: u32 = 2;
