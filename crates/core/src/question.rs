use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A planned main question.
///
/// Produced upstream by the question planner and frozen before the interview
/// starts; the engine only ever reads these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,
    pub prompt: String,
    /// Reference answer the semantic channel scores against.
    pub ideal_answer: Option<String>,
    pub difficulty: String,
    pub skill_tags: Vec<String>,
    /// Why the planner picked this question for this candidate.
    pub rationale: Option<String>,
    pub tts_ready: bool,
}

impl Question {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            prompt: prompt.into(),
            ideal_answer: None,
            difficulty: "medium".to_string(),
            skill_tags: Vec::new(),
            rationale: None,
            tts_ready: true,
        }
    }

    pub fn with_ideal_answer(mut self, ideal: impl Into<String>) -> Self {
        self.ideal_answer = Some(ideal.into());
        self
    }
}

/// A follow-up generated during the interview to probe a detected gap.
///
/// Immutable once created; `order_in_sequence` is 1-based within the parent
/// question's follow-up run and never exceeds the per-question cap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowUpQuestion {
    pub id: Uuid,
    pub interview_id: Uuid,
    pub parent_question_id: Uuid,
    pub prompt: String,
    pub order_in_sequence: u8,
    /// The missing concepts that prompted this follow-up.
    pub generated_reason: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl FollowUpQuestion {
    pub fn new(
        interview_id: Uuid,
        parent_question_id: Uuid,
        prompt: impl Into<String>,
        order_in_sequence: u8,
        generated_reason: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            interview_id,
            parent_question_id,
            prompt: prompt.into(),
            order_in_sequence,
            generated_reason,
            created_at: Utc::now(),
        }
    }
}
