use async_trait::async_trait;
use serde_json::json;

use viva_core::{PortError, SimilarityIndex};

use crate::{classify_status, classify_transport};

/// Semantic similarity via an embeddings endpoint plus local cosine.
///
/// Both texts are embedded with the same model; the score is the cosine of
/// the two vectors clamped into [0, 1].
#[derive(Debug, Clone)]
pub struct EmbeddingSimilarity {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl EmbeddingSimilarity {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
        }
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, PortError> {
        let endpoint = format!("{}/api/embeddings", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(endpoint)
            .json(&json!({"model": self.model, "prompt": text}))
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        let body = response.text().await.map_err(classify_transport)?;
        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        let body: serde_json::Value = serde_json::from_str(&body)
            .map_err(|err| PortError::Permanent(format!("embedding schema: {err}")))?;
        let vector = body
            .get("embedding")
            .and_then(|value| value.as_array())
            .ok_or_else(|| PortError::Permanent("embedding response missing vector".to_string()))?;
        Ok(vector
            .iter()
            .filter_map(|value| value.as_f64())
            .map(|value| value as f32)
            .collect())
    }
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    (f64::from(dot) / (f64::from(mag_a) * f64::from(mag_b))).clamp(0.0, 1.0)
}

#[async_trait]
impl SimilarityIndex for EmbeddingSimilarity {
    async fn similarity(&self, reference: &str, candidate: &str) -> Result<f64, PortError> {
        let (reference, candidate) =
            tokio::try_join!(self.embed(reference), self.embed(candidate))?;
        Ok(cosine_similarity(&reference, &candidate))
    }
}

#[cfg(test)]
mod tests {
    use super::cosine_similarity;

    #[test]
    fn identical_vectors_score_one() {
        let v = [0.5f32, 0.25, 0.1];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_score_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn opposite_vectors_clamp_to_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]), 0.0);
    }

    #[test]
    fn mismatched_or_empty_vectors_score_zero() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }
}
