use serde::{Deserialize, Serialize};
use uuid::Uuid;

use viva_core::{CompletionSummary, GapReport, VoiceMetrics};

use crate::audio::AudioFormat;
use crate::error::ErrorBody;

/// Round to one decimal place.  Applied to scores only when they cross the
/// message boundary; stored values keep full double precision.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Frames the client sends to the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    /// Client is ready; triggers the first `question` frame.
    StartSession {},

    TextAnswer {
        question_id: Uuid,
        answer_text: String,
    },

    /// One streamed audio chunk.  The final chunk triggers transcription
    /// and evaluation.  `format` is validated by [`AudioFormat::parse`] so
    /// an unsupported codec maps to its own error code instead of a generic
    /// decode failure.
    AudioChunk {
        question_id: Uuid,
        chunk_index: u32,
        is_final: bool,
        format: String,
        #[serde(default)]
        audio_data: String,
    },

    /// Ask for the current question again (e.g. when audio was not wanted).
    GetNextQuestion {},

    /// Re-issue the last failed operation.
    RequestRetry {
        #[serde(default)]
        of: Option<String>,
    },

    Cancel {},
}

/// Voice measurements streamed back during an audio turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceMetricsFrame {
    pub intonation: f64,
    pub fluency: f64,
    pub confidence: f64,
    pub speaking_rate_wpm: u32,
    pub real_time: bool,
}

impl VoiceMetricsFrame {
    pub fn from_metrics(metrics: &VoiceMetrics, real_time: bool) -> Self {
        Self {
            intonation: metrics.intonation_score,
            fluency: metrics.fluency_score,
            confidence: metrics.confidence_score,
            speaking_rate_wpm: metrics.speaking_rate_wpm,
            real_time,
        }
    }
}

/// Frames the orchestrator sends to the client.
///
/// Within a turn the order is fixed: transcription and voice metrics (audio
/// turns only), then the evaluation, then whichever of follow-up /
/// question / completion the turn produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    /// Emitted once on connect, before the client starts the session.
    SessionReady {
        interview_id: Uuid,
        status: String,
        total_questions: u32,
    },

    Question {
        question_id: Uuid,
        text: String,
        /// Zero-based position in the plan.
        index: u32,
        total: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        audio_data: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        audio_format: Option<AudioFormat>,
    },

    FollowUpQuestion {
        question_id: Uuid,
        parent_question_id: Uuid,
        text: String,
        generated_reason: String,
        order_in_sequence: u8,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        audio_data: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        audio_format: Option<AudioFormat>,
    },

    Transcription {
        text: String,
        is_final: bool,
        confidence: f64,
    },

    VoiceMetrics(VoiceMetricsFrame),

    Evaluation {
        answer_id: Uuid,
        /// Final score, rounded to one decimal.
        score: f64,
        feedback: String,
        strengths: Vec<String>,
        weaknesses: Vec<String>,
        similarity_score: f64,
        gaps: GapReport,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        voice_metrics: Option<VoiceMetrics>,
    },

    InterviewComplete {
        summary: CompletionSummary,
    },

    Error(ErrorBody),
}

impl Outbound {
    pub fn error(body: ErrorBody) -> Self {
        Outbound::Error(body)
    }

    /// Frame label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Outbound::SessionReady { .. } => "session_ready",
            Outbound::Question { .. } => "question",
            Outbound::FollowUpQuestion { .. } => "follow_up_question",
            Outbound::Transcription { .. } => "transcription",
            Outbound::VoiceMetrics(_) => "voice_metrics",
            Outbound::Evaluation { .. } => "evaluation",
            Outbound::InterviewComplete { .. } => "interview_complete",
            Outbound::Error(_) => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn inbound_frames_round_trip() {
        let frames = vec![
            Inbound::StartSession {},
            Inbound::TextAnswer {
                question_id: Uuid::new_v4(),
                answer_text: "b-trees keep pages balanced".to_string(),
            },
            Inbound::AudioChunk {
                question_id: Uuid::new_v4(),
                chunk_index: 2,
                is_final: true,
                format: "webm".to_string(),
                audio_data: "aGVsbG8=".to_string(),
            },
            Inbound::GetNextQuestion {},
            Inbound::RequestRetry { of: Some("frame-17".to_string()) },
            Inbound::Cancel {},
        ];
        for frame in frames {
            let json = serde_json::to_string(&frame).unwrap();
            let back: Inbound = serde_json::from_str(&json).unwrap();
            assert_eq!(back, frame, "round trip failed for {json}");
        }
    }

    #[test]
    fn outbound_frames_round_trip() {
        let frames = vec![
            Outbound::SessionReady {
                interview_id: Uuid::new_v4(),
                status: "IDLE".to_string(),
                total_questions: 4,
            },
            Outbound::Question {
                question_id: Uuid::new_v4(),
                text: "Explain a B-tree.".to_string(),
                index: 0,
                total: 4,
                audio_data: Some("UklGRg==".to_string()),
                audio_format: Some(AudioFormat::Wav),
            },
            Outbound::FollowUpQuestion {
                question_id: Uuid::new_v4(),
                parent_question_id: Uuid::new_v4(),
                text: "How does page splitting work?".to_string(),
                generated_reason: "missing: page splits".to_string(),
                order_in_sequence: 1,
                audio_data: None,
                audio_format: None,
            },
            Outbound::Transcription {
                text: "so a b-tree is".to_string(),
                is_final: false,
                confidence: 0.87,
            },
            Outbound::Evaluation {
                answer_id: Uuid::new_v4(),
                score: 72.5,
                feedback: "solid but shallow".to_string(),
                strengths: vec!["terminology".to_string()],
                weaknesses: vec!["no complexity analysis".to_string()],
                similarity_score: 0.61,
                gaps: GapReport::confirmed(vec!["rebalancing".to_string()]),
                voice_metrics: None,
            },
            Outbound::Error(
                ErrorBody::new(ErrorCode::SttFailed, "transcription unavailable", true, true)
                    .with_fallback("text_mode"),
            ),
        ];
        for frame in frames {
            let json = serde_json::to_string(&frame).unwrap();
            let back: Outbound = serde_json::from_str(&json).unwrap();
            assert_eq!(back, frame, "round trip failed for {json}");
        }
    }

    #[test]
    fn type_tags_are_snake_case() {
        let json = serde_json::to_string(&Inbound::StartSession {}).unwrap();
        assert_eq!(json, r#"{"type":"start_session"}"#);

        let json = serde_json::to_string(&Outbound::Transcription {
            text: "x".to_string(),
            is_final: true,
            confidence: 1.0,
        })
        .unwrap();
        assert!(json.starts_with(r#"{"type":"transcription""#), "got {json}");
    }

    #[test]
    fn unknown_inbound_type_fails_to_decode() {
        let err = serde_json::from_str::<Inbound>(r#"{"type":"reboot"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn rounding_only_touches_one_decimal() {
        assert_eq!(round1(72.44), 72.4);
        assert_eq!(round1(72.46), 72.5);
        assert_eq!(round1(0.0), 0.0);
        assert_eq!(round1(100.0), 100.0);
    }
}
