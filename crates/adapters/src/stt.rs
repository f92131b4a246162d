use async_trait::async_trait;
use serde::Deserialize;

use viva_core::{PortError, SpeechToText, Transcription, VoiceMetrics};

use crate::{classify_status, classify_transport};

/// Speech-to-text over a transcription HTTP service.
///
/// Audio bytes go up as the request body; the service answers with the
/// transcript, optional per-channel voice scores, and the clip duration.
#[derive(Debug, Clone)]
pub struct HttpSpeechToText {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    text: String,
    #[serde(default)]
    duration_seconds: f64,
    #[serde(default = "default_confidence")]
    confidence: f64,
    #[serde(default)]
    voice_metrics: Option<VoiceMetricsResponse>,
}

#[derive(Debug, Deserialize)]
struct VoiceMetricsResponse {
    intonation_score: f64,
    fluency_score: f64,
    confidence_score: f64,
    #[serde(default)]
    speaking_rate_wpm: u32,
}

fn default_confidence() -> f64 {
    1.0
}

impl HttpSpeechToText {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl SpeechToText for HttpSpeechToText {
    async fn transcribe(
        &self,
        audio: &[u8],
        format: &str,
        language: &str,
    ) -> Result<Transcription, PortError> {
        let endpoint = format!(
            "{}/v1/transcribe?format={format}&language={language}",
            self.base_url.trim_end_matches('/'),
        );
        let response = self
            .client
            .post(endpoint)
            .header("content-type", "application/octet-stream")
            .body(audio.to_vec())
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        let body = response.text().await.map_err(classify_transport)?;
        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        let parsed: TranscribeResponse = serde_json::from_str(&body)
            .map_err(|err| PortError::Permanent(format!("transcription schema: {err}")))?;
        if parsed.text.trim().is_empty() {
            return Err(PortError::Permanent("empty transcription".to_string()));
        }

        let duration = parsed.duration_seconds;
        Ok(Transcription {
            text: parsed.text,
            voice_metrics: parsed.voice_metrics.map(|vm| {
                VoiceMetrics::new(
                    vm.intonation_score,
                    vm.fluency_score,
                    vm.confidence_score,
                    vm.speaking_rate_wpm,
                    duration,
                )
            }),
            duration_seconds: duration,
            confidence: parsed.confidence.clamp(0.0, 1.0),
        })
    }
}
