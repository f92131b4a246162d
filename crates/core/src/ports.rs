use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::answer::{Answer, GapReport};
use crate::evaluation::{Evaluation, VoiceMetrics};
use crate::interview::Interview;
use crate::question::{FollowUpQuestion, Question};
use crate::summary::GapProgression;

// ── adapter ports ─────────────────────────────────────────────────────────────

/// Failure of an external adapter call, classified by retryability.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PortError {
    #[error("adapter call exceeded its {0:?} deadline")]
    Timeout(Duration),

    /// 5xx-class failures, connection resets, rate limits.  Worth retrying
    /// within the turn deadline.
    #[error("transient adapter failure: {0}")]
    Transient(String),

    /// 4xx-class failures and schema violations.  Retrying cannot help.
    #[error("permanent adapter failure: {0}")]
    Permanent(String),
}

impl PortError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, PortError::Permanent(_))
    }
}

/// Semantic judgement of one answer, as returned by the language model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerAssessment {
    /// 0..100.
    pub raw_score: f64,
    /// 0..1.
    pub completeness: f64,
    /// 0..1.
    pub relevance: f64,
    pub sentiment: String,
    pub reasoning: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub gaps: GapReport,
}

/// Input handed to the recommendation call at completion time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationInput {
    pub theoretical_avg: f64,
    pub speaking_avg: f64,
    pub overall_score: f64,
    pub evaluations: Vec<Evaluation>,
    pub gap_progression: Vec<GapProgression>,
}

/// Personalised recommendations for the completion summary.
///
/// Any key the model omits decodes to an empty list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationSet {
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub study_topics: Vec<String>,
    pub technique_tips: Vec<String>,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Draft a main question for the given skills and difficulty.
    async fn generate_question(
        &self,
        skill_tags: &[String],
        difficulty: &str,
    ) -> Result<String, PortError>;

    /// Score an answer against the question and its ideal answer.
    async fn evaluate_answer(
        &self,
        question: &str,
        ideal_answer: Option<&str>,
        answer: &str,
    ) -> Result<AnswerAssessment, PortError>;

    /// Draft follow-up number `order` (1-based) probing `missing_concepts`.
    async fn generate_followup_question(
        &self,
        parent_question: &str,
        answer_text: &str,
        missing_concepts: &[String],
        order: u8,
    ) -> Result<String, PortError>;

    async fn generate_recommendations(
        &self,
        input: &RecommendationInput,
    ) -> Result<RecommendationSet, PortError>;
}

/// Result of transcribing one spoken answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcription {
    pub text: String,
    pub voice_metrics: Option<VoiceMetrics>,
    pub duration_seconds: f64,
    /// Transcription confidence, 0..1.
    pub confidence: f64,
}

#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// 16 kHz mono baseline; `format` is one of the wire formats accepted by
    /// the protocol layer.
    async fn transcribe(
        &self,
        audio: &[u8],
        format: &str,
        language: &str,
    ) -> Result<Transcription, PortError>;
}

#[async_trait]
pub trait TextToSpeech: Send + Sync {
    /// Render `text` to 16 kHz mono WAV.  `speed` is clamped to [0.5, 2.0]
    /// by implementations.
    async fn synthesize(&self, text: &str, voice: &str, speed: f64) -> Result<Vec<u8>, PortError>;

    async fn available_voices(&self) -> Result<Vec<String>, PortError>;
}

#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    /// Cosine similarity of `candidate` against `reference`, in [0, 1].
    async fn similarity(&self, reference: &str, candidate: &str) -> Result<f64, PortError>;
}

// ── storage port ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: Uuid },

    #[error("{kind} {id} already exists")]
    Duplicate { kind: &'static str, id: Uuid },

    #[error("stale revision for interview {id}: staged {staged}, stored {stored}")]
    StaleRevision { id: Uuid, staged: u64, stored: u64 },

    /// A committed write would violate a domain invariant.  Always a bug in
    /// the caller, surfaced loudly.
    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("journal error: {0}")]
    Journal(String),
}

/// Staged-write handle for one atomic commit.
///
/// Writes staged here become visible all at once on `commit`, or not at all.
/// Dropping the handle without committing discards everything staged.
#[async_trait]
pub trait StoreTx: Send {
    /// Stage the canonical aggregate update.  The commit rejects the batch
    /// with [`StoreError::StaleRevision`] when the staged revision no longer
    /// matches the stored one.
    fn stage_interview(&mut self, interview: Interview);

    /// Stage an answer upsert.  An existing answer for the same
    /// `(interview, question)` pair is replaced together with its
    /// evaluation, so re-answering can never strand an evaluation row.
    fn stage_answer(&mut self, answer: Answer);

    fn stage_evaluation(&mut self, evaluation: Evaluation);

    fn stage_followup(&mut self, followup: FollowUpQuestion);

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Durable storage for interviews and their child records.
///
/// Reads go straight through; every write travels inside a [`StoreTx`]
/// except the two seed-time inserts.
#[async_trait]
pub trait InterviewStore: Send + Sync {
    async fn begin(&self) -> Box<dyn StoreTx>;

    async fn insert_interview(&self, interview: Interview) -> Result<(), StoreError>;
    async fn insert_question(&self, question: Question) -> Result<(), StoreError>;

    async fn interview(&self, id: Uuid) -> Result<Interview, StoreError>;
    async fn question(&self, id: Uuid) -> Result<Question, StoreError>;
    async fn followup(&self, id: Uuid) -> Result<FollowUpQuestion, StoreError>;

    async fn answers_for_interview(&self, interview_id: Uuid) -> Result<Vec<Answer>, StoreError>;
    async fn evaluations_for_interview(
        &self,
        interview_id: Uuid,
    ) -> Result<Vec<Evaluation>, StoreError>;
    /// Follow-ups for one parent, ordered by `order_in_sequence`.
    async fn followups_for_parent(
        &self,
        parent_question_id: Uuid,
    ) -> Result<Vec<FollowUpQuestion>, StoreError>;
}
