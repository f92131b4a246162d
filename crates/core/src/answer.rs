use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::evaluation::VoiceMetrics;

/// Floor for a measured similarity score.
///
/// A stored score of exactly zero would be indistinguishable from "never
/// measured" in downstream aggregations, so measured-as-zero is represented
/// as this sentinel instead.  Consumers treat it as "near zero", not as a
/// signal.
pub const MIN_SIMILARITY: f64 = 0.01;

/// Knowledge gaps detected in one answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GapReport {
    pub concepts: Vec<String>,
    /// Whether the evaluator is confident the concepts are genuinely missing
    /// (as opposed to merely unmentioned).  Unconfirmed gaps never trigger
    /// follow-ups and never enter cumulative gap sets.
    pub confirmed: bool,
}

impl GapReport {
    pub fn confirmed(concepts: Vec<String>) -> Self {
        Self { concepts, confirmed: true }
    }

    pub fn none() -> Self {
        Self::default()
    }
}

/// One answer to a main or follow-up question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub id: Uuid,
    pub interview_id: Uuid,
    /// Id of either a planned [`crate::Question`] or a
    /// [`crate::FollowUpQuestion`].
    pub question_id: Uuid,
    pub transcript: String,
    pub voice_metrics: Option<VoiceMetrics>,
    /// Semantic similarity against the ideal answer, never below
    /// [`MIN_SIMILARITY`] and never above 1.0.
    pub similarity_score: f64,
    pub gaps: GapReport,
    pub evaluation_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Answer {
    pub fn new(interview_id: Uuid, question_id: Uuid, transcript: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            interview_id,
            question_id,
            transcript: transcript.into(),
            voice_metrics: None,
            similarity_score: MIN_SIMILARITY,
            gaps: GapReport::none(),
            evaluation_id: None,
            created_at: Utc::now(),
        }
    }

    /// Clamp a raw similarity measurement into the representable range.
    pub fn floor_similarity(raw: f64) -> f64 {
        let clamped = raw.clamp(0.0, 1.0);
        if clamped < MIN_SIMILARITY { MIN_SIMILARITY } else { clamped }
    }
}
