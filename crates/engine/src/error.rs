use std::fmt;

use thiserror::Error;

use viva_core::{DomainError, PortError, StoreError};
use viva_protocol::{AudioError, ErrorBody, ErrorCode};

/// Which external adapter a failure came from.  Drives the outbound error
/// code and the `text_mode` fallback offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterStage {
    SpeechToText,
    TextToSpeech,
    LanguageModel,
    Similarity,
}

impl fmt::Display for AdapterStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AdapterStage::SpeechToText => "speech-to-text",
            AdapterStage::TextToSpeech => "text-to-speech",
            AdapterStage::LanguageModel => "language model",
            AdapterStage::Similarity => "similarity",
        };
        f.write_str(label)
    }
}

/// Everything that can go wrong while handling one inbound frame.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{stage} adapter failed: {source}")]
    Adapter { stage: AdapterStage, source: PortError },

    /// Recommendation failure inside the completion transaction.  Always
    /// surfaced as retryable: the client may resubmit the final answer.
    #[error("completion aborted: {0}")]
    Completion(PortError),

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error("frame rejected: {0}")]
    InvalidFrame(String),

    #[error("turn deadline exceeded")]
    TurnDeadline,
}

impl EngineError {
    pub fn adapter(stage: AdapterStage, source: PortError) -> Self {
        EngineError::Adapter { stage, source }
    }

    /// Whether this error indicates a broken invariant rather than a bad
    /// request or flaky dependency.  These are logged at error level.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            EngineError::Store(StoreError::Integrity(_))
                | EngineError::Domain(DomainError::SummaryMissing { .. })
        )
    }

    /// Translate into the client-facing error frame payload.
    pub fn to_error_body(&self) -> ErrorBody {
        match self {
            EngineError::Domain(err) => ErrorBody::new(
                match err {
                    DomainError::SummaryMissing { .. } => ErrorCode::InternalError,
                    _ => ErrorCode::InvalidState,
                },
                err.to_string(),
                true,
                false,
            ),

            EngineError::Store(StoreError::NotFound { kind, .. }) => ErrorBody::new(
                ErrorCode::NotFound,
                format!("{kind} not found"),
                false,
                false,
            ),
            EngineError::Store(StoreError::Integrity(_)) => ErrorBody::new(
                ErrorCode::InternalError,
                "internal storage inconsistency",
                false,
                false,
            ),
            EngineError::Store(_) => ErrorBody::new(
                ErrorCode::InternalError,
                "storage conflict, please retry",
                true,
                true,
            ),

            EngineError::Adapter { stage, source } => {
                // Transient and timed-out calls stay retryable; a permanent
                // rejection is not recoverable for this operation.
                let retryable = source.is_retryable();
                match stage {
                    AdapterStage::SpeechToText => {
                        let code = if retryable { ErrorCode::SttFailed } else { ErrorCode::InternalError };
                        ErrorBody::new(code, "transcription unavailable", retryable, retryable)
                            .with_fallback("text_mode")
                    }
                    AdapterStage::TextToSpeech => {
                        let code = if retryable { ErrorCode::TtsFailed } else { ErrorCode::InternalError };
                        ErrorBody::new(code, "speech synthesis unavailable", retryable, retryable)
                            .with_fallback("text_mode")
                    }
                    AdapterStage::LanguageModel | AdapterStage::Similarity => ErrorBody::new(
                        ErrorCode::InternalError,
                        "evaluation backend unavailable",
                        retryable,
                        retryable,
                    ),
                }
            }

            EngineError::Completion(_) => ErrorBody::new(
                ErrorCode::InternalError,
                "could not finalise the interview, please retry",
                true,
                true,
            ),

            EngineError::Audio(err) => ErrorBody::new(
                ErrorCode::AudioFormatUnsupported,
                err.to_string(),
                false,
                false,
            ),

            EngineError::InvalidFrame(message) => {
                ErrorBody::new(ErrorCode::InvalidMessage, message.clone(), false, false)
            }

            EngineError::TurnDeadline => ErrorBody::new(
                ErrorCode::Timeout,
                "the turn took too long, please resend your answer",
                true,
                true,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;
    use viva_core::InterviewStatus;

    #[test]
    fn invalid_state_maps_to_a_non_retryable_state_error() {
        let err = EngineError::Domain(DomainError::InvalidStateTransition {
            from: InterviewStatus::Idle,
            to: InterviewStatus::Evaluating,
        });
        let body = err.to_error_body();
        assert_eq!(body.code, ErrorCode::InvalidState);
        assert!(body.recoverable);
        assert!(!body.retry_available);
    }

    #[test]
    fn retryable_stt_failure_offers_text_mode() {
        let err = EngineError::adapter(
            AdapterStage::SpeechToText,
            PortError::Transient("down".to_string()),
        );
        let body = err.to_error_body();
        assert_eq!(body.code, ErrorCode::SttFailed);
        assert!(body.retry_available);
        assert_eq!(body.fallback_option.as_deref(), Some("text_mode"));
    }

    #[test]
    fn permanent_stt_failure_degrades_to_internal_error_with_fallback() {
        let err = EngineError::adapter(
            AdapterStage::SpeechToText,
            PortError::Permanent("bad codec".to_string()),
        );
        let body = err.to_error_body();
        assert_eq!(body.code, ErrorCode::InternalError);
        assert!(!body.recoverable);
        assert!(!body.retry_available);
        assert_eq!(body.fallback_option.as_deref(), Some("text_mode"));
    }

    #[test]
    fn completion_failures_are_always_retryable() {
        let err = EngineError::Completion(PortError::Permanent("schema refused".to_string()));
        let body = err.to_error_body();
        assert_eq!(body.code, ErrorCode::InternalError);
        assert!(body.recoverable);
        assert!(body.retry_available);
    }

    #[test]
    fn integrity_errors_are_flagged() {
        assert!(EngineError::Store(StoreError::Integrity("x".to_string())).is_integrity());
        assert!(EngineError::Domain(DomainError::SummaryMissing { interview_id: Uuid::new_v4() })
            .is_integrity());
        assert!(!EngineError::TurnDeadline.is_integrity());
    }
}
