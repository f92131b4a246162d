use thiserror::Error;
use uuid::Uuid;

use crate::status::InterviewStatus;

/// Errors raised by the interview aggregate.
///
/// Every variant leaves the aggregate untouched; callers can rely on the
/// value being exactly what it was before the failed call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DomainError {
    #[error("invalid state transition {from} -> {to}")]
    InvalidStateTransition {
        from: InterviewStatus,
        to: InterviewStatus,
    },

    #[error("follow-up limit reached for question {parent_question_id}")]
    MaxFollowupsExceeded { parent_question_id: Uuid },

    #[error("cannot start an interview with an empty question plan")]
    EmptyPlan,

    #[error("question plan cannot change while the interview is {current}")]
    PlanFrozen { current: InterviewStatus },

    #[error("completion summary missing on a COMPLETE interview {interview_id}")]
    SummaryMissing { interview_id: Uuid },

    #[error("plan metadata error: {0}")]
    Metadata(String),
}
