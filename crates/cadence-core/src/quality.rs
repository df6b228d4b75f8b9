//! Attempt outcome → canonical 0–5 quality score plus an easiness nudge.
//!
//! Correctness sets the floor, latency and self-reported confidence add to it.
//! The emotion hint never touches quality; it only shifts the easiness factor
//! before the SM-2 update.

use serde::{Deserialize, Serialize};

use crate::constants::{CORRECT_BASE_QUALITY, MAX_QUALITY};
use crate::error::{EngineError, Result};

/// Raw result of one attempt, as reported by the host.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AttemptOutcome {
    pub correct: bool,
    /// Seconds taken to answer. `None` means unknown: no speed bonus or penalty.
    #[serde(default)]
    pub response_time_seconds: Option<f64>,
    /// Self-reported confidence in `[0, 1]`. Defaults to 1.0.
    #[serde(default)]
    pub confidence: Option<f64>,
    /// A quality already on the 0–5 scale. Bypasses derivation when present.
    #[serde(default)]
    pub explicit_quality: Option<f64>,
    /// Opaque emotion label produced elsewhere.
    #[serde(default)]
    pub emotion: Option<String>,
}

impl AttemptOutcome {
    pub fn correct() -> Self {
        Self {
            correct: true,
            ..Self::default()
        }
    }

    pub fn incorrect() -> Self {
        Self::default()
    }

    pub fn with_response_time(mut self, seconds: f64) -> Self {
        self.response_time_seconds = Some(seconds);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_explicit_quality(mut self, quality: f64) -> Self {
        self.explicit_quality = Some(quality);
        self
    }

    pub fn with_emotion(mut self, emotion: impl Into<String>) -> Self {
        self.emotion = Some(emotion.into());
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    pub quality: f64,
    pub easiness_delta: f64,
}

/// Score an attempt. Pure; fails only on out-of-range input.
pub fn score_quality(outcome: &AttemptOutcome) -> Result<QualityScore> {
    validate_outcome(outcome)?;

    let easiness_delta = emotion_easiness_delta(outcome.emotion.as_deref());

    if let Some(quality) = outcome.explicit_quality {
        return Ok(QualityScore {
            quality,
            easiness_delta,
        });
    }

    // Wrong answers get no partial credit.
    if !outcome.correct {
        return Ok(QualityScore {
            quality: 0.0,
            easiness_delta,
        });
    }

    let speed = outcome.response_time_seconds.map_or(0.0, speed_bonus);
    let confidence = outcome.confidence.unwrap_or(1.0);
    let quality = (CORRECT_BASE_QUALITY + speed + confidence).clamp(0.0, MAX_QUALITY);

    Ok(QualityScore {
        quality,
        easiness_delta,
    })
}

/// Latency bonus: fast answers earn up to +1, slow ones lose 0.5.
pub fn speed_bonus(response_time_seconds: f64) -> f64 {
    if response_time_seconds < 5.0 {
        1.0
    } else if response_time_seconds < 15.0 {
        0.5
    } else if response_time_seconds < 30.0 {
        0.0
    } else {
        -0.5
    }
}

/// Easiness adjustment for an emotion label. Case-insensitive; unknown → 0.
pub fn emotion_easiness_delta(emotion: Option<&str>) -> f64 {
    let Some(label) = emotion else {
        return 0.0;
    };
    match label.trim().to_ascii_lowercase().as_str() {
        "frustrated" | "confused" | "angry" => -0.1,
        "sad" => -0.05,
        "happy" => 0.05,
        "excited" | "confident" => 0.1,
        _ => 0.0,
    }
}

/// Reject a quality outside `[0, 5]` (or NaN).
pub fn validate_quality(quality: f64) -> Result<()> {
    if !(0.0..=MAX_QUALITY).contains(&quality) {
        return Err(EngineError::invalid(format!(
            "quality must be within [0, 5], got {quality}"
        )));
    }
    Ok(())
}

fn validate_outcome(outcome: &AttemptOutcome) -> Result<()> {
    if let Some(quality) = outcome.explicit_quality {
        validate_quality(quality)?;
    }
    if let Some(confidence) = outcome.confidence
        && !(0.0..=1.0).contains(&confidence)
    {
        return Err(EngineError::invalid(format!(
            "confidence must be within [0, 1], got {confidence}"
        )));
    }
    if let Some(seconds) = outcome.response_time_seconds
        && !(seconds >= 0.0 && seconds.is_finite())
    {
        return Err(EngineError::invalid(format!(
            "response time must be a non-negative number of seconds, got {seconds}"
        )));
    }
    Ok(())
}
