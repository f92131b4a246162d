use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::debug;

use viva_core::{PortError, TextToSpeech};

use crate::{classify_status, classify_transport};

/// Text-to-speech over a synthesis HTTP service, returning 16 kHz mono WAV.
///
/// Renders are cached by `(text, voice, speed)`: question prompts repeat
/// across retries and `get_next_question` requests, and the synthesis call
/// is the slowest adapter after the LLM.
pub struct HttpTextToSpeech {
    client: reqwest::Client,
    base_url: String,
    cache: Mutex<HashMap<CacheKey, Vec<u8>>>,
}

type CacheKey = (String, String, u16);

fn speed_key(speed: f64) -> u16 {
    (speed.clamp(0.5, 2.0) * 100.0).round() as u16
}

impl HttpTextToSpeech {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl TextToSpeech for HttpTextToSpeech {
    async fn synthesize(&self, text: &str, voice: &str, speed: f64) -> Result<Vec<u8>, PortError> {
        let speed = speed.clamp(0.5, 2.0);
        let key = (text.to_string(), voice.to_string(), speed_key(speed));
        if let Some(hit) = self.cache.lock().await.get(&key) {
            debug!(voice, len = hit.len(), "tts cache hit");
            return Ok(hit.clone());
        }

        let endpoint = format!("{}/v1/synthesize", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(endpoint)
            .json(&json!({"text": text, "voice": voice, "speed": speed}))
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }
        let bytes = response.bytes().await.map_err(classify_transport)?.to_vec();
        if bytes.is_empty() {
            return Err(PortError::Permanent("synthesis returned no audio".to_string()));
        }

        self.cache.lock().await.insert(key, bytes.clone());
        Ok(bytes)
    }

    async fn available_voices(&self) -> Result<Vec<String>, PortError> {
        let endpoint = format!("{}/v1/voices", self.base_url.trim_end_matches('/'));
        let response = self.client.get(endpoint).send().await.map_err(classify_transport)?;
        let status = response.status();
        let body = response.text().await.map_err(classify_transport)?;
        if !status.is_success() {
            return Err(classify_status(status, &body));
        }
        serde_json::from_str(&body)
            .map_err(|err| PortError::Permanent(format!("voices schema: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::speed_key;

    #[test]
    fn speed_is_clamped_into_the_supported_band() {
        assert_eq!(speed_key(0.1), 50);
        assert_eq!(speed_key(1.0), 100);
        assert_eq!(speed_key(3.7), 200);
    }
}
