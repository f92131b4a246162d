use serde::{Deserialize, Serialize};

/// Stable machine codes carried by outbound `error` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Malformed frame, unknown type, or a payload that fails validation.
    InvalidMessage,
    /// Operation incompatible with the aggregate's current status.
    InvalidState,
    /// Unsupported codec, sample rate, or chunk-ordering violation.
    AudioFormatUnsupported,
    SttFailed,
    TtsFailed,
    /// Whole-turn or adapter hard timeout; retryable.
    Timeout,
    InternalError,
    NotFound,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidMessage => "INVALID_MESSAGE",
            ErrorCode::InvalidState => "INVALID_STATE",
            ErrorCode::AudioFormatUnsupported => "AUDIO_FORMAT_UNSUPPORTED",
            ErrorCode::SttFailed => "STT_FAILED",
            ErrorCode::TtsFailed => "TTS_FAILED",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::NotFound => "NOT_FOUND",
        }
    }
}

/// Payload of an outbound `error` frame.
///
/// Never carries stack traces, adapter URLs, or internal identifiers; the
/// message is written for the candidate-facing client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    pub recoverable: bool,
    pub retry_available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_option: Option<String>,
}

impl ErrorBody {
    pub fn new(
        code: ErrorCode,
        message: impl Into<String>,
        recoverable: bool,
        retry_available: bool,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            recoverable,
            retry_available,
            fallback_option: None,
        }
    }

    pub fn with_fallback(mut self, option: impl Into<String>) -> Self {
        self.fallback_option = Some(option.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_serialize_to_screaming_snake_case() {
        assert_eq!(serde_json::to_string(&ErrorCode::SttFailed).unwrap(), "\"STT_FAILED\"");
        assert_eq!(
            serde_json::to_string(&ErrorCode::AudioFormatUnsupported).unwrap(),
            "\"AUDIO_FORMAT_UNSUPPORTED\""
        );
        for code in [
            ErrorCode::InvalidMessage,
            ErrorCode::InvalidState,
            ErrorCode::AudioFormatUnsupported,
            ErrorCode::SttFailed,
            ErrorCode::TtsFailed,
            ErrorCode::Timeout,
            ErrorCode::InternalError,
            ErrorCode::NotFound,
        ] {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.as_str()));
        }
    }

    #[test]
    fn fallback_is_omitted_when_absent() {
        let body = ErrorBody::new(ErrorCode::Timeout, "turn deadline exceeded", true, true);
        let json = serde_json::to_string(&body).unwrap();
        assert!(!json.contains("fallback_option"));

        let with = body.with_fallback("text_mode");
        let json = serde_json::to_string(&with).unwrap();
        assert!(json.contains("\"fallback_option\":\"text_mode\""));
    }
}
