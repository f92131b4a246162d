use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Plan-metadata key under which the completion summary is stored.
pub const PLAN_METADATA_SUMMARY_KEY: &str = "completion_summary";

/// Per-main-question roll-up inside the completion summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionSummary {
    pub question_id: Uuid,
    pub prompt: String,
    /// Final score of the main answer, 0..100; zero when never evaluated.
    pub final_score: f64,
    pub followups_asked: u32,
    pub gaps_initial: Vec<String>,
    pub gaps_remaining: Vec<String>,
}

/// How the candidate's confirmed gaps evolved across one question's
/// follow-up run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapProgression {
    pub parent_question_id: Uuid,
    /// Confirmed gaps after the main answer.
    pub initial: Vec<String>,
    /// Gaps from `initial` no longer present after the last follow-up.
    pub filled: Vec<String>,
    /// Confirmed gaps still open after the last follow-up.
    pub remaining: Vec<String>,
}

/// Aggregated result of a finished interview.
///
/// Stored in the aggregate's plan metadata under
/// [`PLAN_METADATA_SUMMARY_KEY`]; an interview is never `COMPLETE` without
/// one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionSummary {
    /// Weighted mean of the two channel averages, 0..100.
    pub overall_score: f64,
    pub theoretical_score_avg: f64,
    pub speaking_score_avg: f64,
    pub total_questions: u32,
    pub total_follow_ups: u32,
    pub question_summaries: Vec<QuestionSummary>,
    pub gap_progression: Vec<GapProgression>,
    pub gaps_filled_total: u32,
    pub gaps_remaining_total: u32,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub study_recommendations: Vec<String>,
    pub technique_tips: Vec<String>,
    pub completed_at: DateTime<Utc>,
}
