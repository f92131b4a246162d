//! Domain model for the interview orchestrator.
//!
//! This crate owns the interview aggregate and its state machine, the
//! immutable answer/evaluation records, the completion summary, and the port
//! traits that every external adapter (LLM, STT, TTS, similarity, storage)
//! implements.  Nothing here performs I/O; all side effects live behind the
//! traits in [`ports`].

pub mod answer;
pub mod error;
pub mod evaluation;
pub mod interview;
pub mod ports;
pub mod question;
pub mod status;
pub mod summary;

pub use answer::{Answer, GapReport, MIN_SIMILARITY};
pub use error::DomainError;
pub use evaluation::{Evaluation, VoiceMetrics};
pub use interview::{Interview, MAX_FOLLOWUPS_PER_QUESTION};
pub use ports::{
    AnswerAssessment, InterviewStore, LanguageModel, PortError, RecommendationInput,
    RecommendationSet, SimilarityIndex, SpeechToText, StoreError, StoreTx, TextToSpeech,
    Transcription,
};
pub use question::{FollowUpQuestion, Question};
pub use status::InterviewStatus;
pub use summary::{CompletionSummary, GapProgression, PLAN_METADATA_SUMMARY_KEY, QuestionSummary};
