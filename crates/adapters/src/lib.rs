//! Concrete implementations of the external ports: HTTP clients for the
//! language model, speech-to-text, text-to-speech and embedding services,
//! plus deterministic mocks selected by `use_mock_adapters`.

pub mod llm;
pub mod mock;
pub mod similarity;
pub mod stt;
pub mod tts;

pub use llm::HttpLanguageModel;
pub use mock::{MockLanguageModel, MockSimilarity, MockSpeechToText, MockTextToSpeech};
pub use similarity::EmbeddingSimilarity;
pub use stt::HttpSpeechToText;
pub use tts::HttpTextToSpeech;

use viva_core::PortError;

/// Classify a transport-level failure.  Connection problems and timeouts
/// are worth retrying; anything the server definitively rejected is not.
pub(crate) fn classify_transport(err: reqwest::Error) -> PortError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        PortError::Transient(err.to_string())
    } else {
        PortError::Permanent(err.to_string())
    }
}

/// Classify an HTTP status that was not a success.
pub(crate) fn classify_status(status: reqwest::StatusCode, body: &str) -> PortError {
    let summary = format!("{status}: {}", body.chars().take(200).collect::<String>());
    if status.is_server_error() || status.as_u16() == 429 {
        PortError::Transient(summary)
    } else {
        PortError::Permanent(summary)
    }
}
