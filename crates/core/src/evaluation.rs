use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Acoustic measurements extracted from a spoken answer.
///
/// Component scores are normalised to [0, 1] by the STT adapter; the engine
/// treats them as opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceMetrics {
    pub intonation_score: f64,
    pub fluency_score: f64,
    pub confidence_score: f64,
    pub speaking_rate_wpm: u32,
    pub duration_seconds: f64,
}

impl VoiceMetrics {
    pub fn new(
        intonation_score: f64,
        fluency_score: f64,
        confidence_score: f64,
        speaking_rate_wpm: u32,
        duration_seconds: f64,
    ) -> Self {
        Self {
            intonation_score: intonation_score.clamp(0.0, 1.0),
            fluency_score: fluency_score.clamp(0.0, 1.0),
            confidence_score: confidence_score.clamp(0.0, 1.0),
            speaking_rate_wpm,
            duration_seconds: duration_seconds.max(0.0),
        }
    }

    /// Speaking-channel score on the 0..100 scale: the mean of the three
    /// component scores scaled by 100.
    pub fn speaking_score(&self) -> f64 {
        (self.intonation_score + self.fluency_score + self.confidence_score) / 3.0 * 100.0
    }
}

/// Immutable record of one answer's dual-channel scoring.
///
/// Created by the answer pipeline, persisted once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub id: Uuid,
    pub answer_id: Uuid,
    pub question_id: Uuid,
    pub interview_id: Uuid,
    /// Semantic score straight from the language model, 0..100.
    pub raw_score: f64,
    /// Weighted combination of the semantic and speaking channels, 0..100.
    pub final_score: f64,
    pub completeness: f64,
    pub relevance: f64,
    pub sentiment: String,
    pub reasoning: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub voice_metrics: Option<VoiceMetrics>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speaking_score_is_the_scaled_component_mean() {
        let metrics = VoiceMetrics::new(0.9, 0.6, 0.6, 140, 32.0);
        assert!((metrics.speaking_score() - 70.0).abs() < 1e-9);
    }

    #[test]
    fn components_are_clamped_to_unit_range() {
        let metrics = VoiceMetrics::new(1.8, -0.2, 0.5, 120, -3.0);
        assert_eq!(metrics.intonation_score, 1.0);
        assert_eq!(metrics.fluency_score, 0.0);
        assert_eq!(metrics.duration_seconds, 0.0);
    }
}
