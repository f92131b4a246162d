//! Deterministic adapters for development and tests.
//!
//! Each mock answers from a scripted queue when one is loaded and falls back
//! to a deterministic derivation otherwise, so `use_mock_adapters` gives a
//! fully drivable system with no external services.  Failure-injection
//! counters let tests exercise the retry and rollback paths.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;

use viva_core::{
    AnswerAssessment, GapReport, LanguageModel, PortError, RecommendationInput, RecommendationSet,
    SimilarityIndex, SpeechToText, TextToSpeech, Transcription, VoiceMetrics,
};

fn take_failure(counter: &AtomicU32, what: &str) -> Result<(), PortError> {
    // Decrement-if-positive; races are irrelevant for test counters.
    let remaining = counter.load(Ordering::SeqCst);
    if remaining > 0 {
        counter.store(remaining - 1, Ordering::SeqCst);
        return Err(PortError::Transient(format!("{what} backend unavailable")));
    }
    Ok(())
}

// ── language model ────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MockLanguageModel {
    assessments: Mutex<VecDeque<AnswerAssessment>>,
    recommendations: Mutex<Option<RecommendationSet>>,
    fail_evaluations: AtomicU32,
    fail_recommendations: AtomicU32,
    recommendations_always_fail: AtomicBool,
}

impl MockLanguageModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a canned assessment; consumed in FIFO order by
    /// `evaluate_answer`.
    pub fn push_assessment(&self, assessment: AnswerAssessment) {
        self.assessments.lock().unwrap().push_back(assessment);
    }

    pub fn set_recommendations(&self, set: RecommendationSet) {
        *self.recommendations.lock().unwrap() = Some(set);
    }

    /// Make the next `count` evaluation calls fail transiently.
    pub fn fail_next_evaluations(&self, count: u32) {
        self.fail_evaluations.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` recommendation calls fail transiently.
    pub fn fail_next_recommendations(&self, count: u32) {
        self.fail_recommendations.store(count, Ordering::SeqCst);
    }

    /// Make every recommendation call fail permanently.
    pub fn fail_recommendations_permanently(&self) {
        self.recommendations_always_fail.store(true, Ordering::SeqCst);
    }

    fn derived_assessment(answer: &str) -> AnswerAssessment {
        // Longer answers score better; keyword-free determinism keeps dev
        // sessions reproducible.
        let words = answer.split_whitespace().count() as f64;
        let raw_score = (30.0 + words * 2.5).min(92.0);
        AnswerAssessment {
            raw_score,
            completeness: (raw_score / 100.0).clamp(0.0, 1.0),
            relevance: 0.8,
            sentiment: "neutral".to_string(),
            reasoning: format!("answer covered {words:.0} words of material"),
            strengths: vec!["clear phrasing".to_string()],
            weaknesses: if raw_score < 60.0 {
                vec!["answer is thin".to_string()]
            } else {
                Vec::new()
            },
            gaps: GapReport::none(),
        }
    }
}

#[async_trait]
impl LanguageModel for MockLanguageModel {
    async fn generate_question(
        &self,
        skill_tags: &[String],
        difficulty: &str,
    ) -> Result<String, PortError> {
        Ok(format!(
            "Describe, at {difficulty} depth, how you would apply {} in production.",
            skill_tags.join(" and "),
        ))
    }

    async fn evaluate_answer(
        &self,
        _question: &str,
        _ideal_answer: Option<&str>,
        answer: &str,
    ) -> Result<AnswerAssessment, PortError> {
        take_failure(&self.fail_evaluations, "evaluation")?;
        if let Some(scripted) = self.assessments.lock().unwrap().pop_front() {
            return Ok(scripted);
        }
        Ok(Self::derived_assessment(answer))
    }

    async fn generate_followup_question(
        &self,
        _parent_question: &str,
        _answer_text: &str,
        missing_concepts: &[String],
        order: u8,
    ) -> Result<String, PortError> {
        Ok(format!(
            "Follow-up {order}: your answer did not cover {}. How does it work?",
            missing_concepts.join(", "),
        ))
    }

    async fn generate_recommendations(
        &self,
        input: &RecommendationInput,
    ) -> Result<RecommendationSet, PortError> {
        if self.recommendations_always_fail.load(Ordering::SeqCst) {
            return Err(PortError::Permanent("recommendation backend rejected the request".to_string()));
        }
        take_failure(&self.fail_recommendations, "recommendation")?;
        if let Some(scripted) = self.recommendations.lock().unwrap().clone() {
            return Ok(scripted);
        }

        let mut strengths: BTreeSet<String> = BTreeSet::new();
        let mut weaknesses: BTreeSet<String> = BTreeSet::new();
        for evaluation in &input.evaluations {
            strengths.extend(evaluation.strengths.iter().cloned());
            weaknesses.extend(evaluation.weaknesses.iter().cloned());
        }
        let study_topics: Vec<String> = input
            .gap_progression
            .iter()
            .flat_map(|progression| progression.remaining.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        Ok(RecommendationSet {
            strengths: strengths.into_iter().collect(),
            weaknesses: weaknesses.into_iter().collect(),
            study_topics,
            technique_tips: vec!["pause before answering to structure your response".to_string()],
        })
    }
}

// ── speech to text ────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MockSpeechToText {
    transcriptions: Mutex<VecDeque<Transcription>>,
    fail_next: AtomicU32,
}

impl MockSpeechToText {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_transcription(&self, transcription: Transcription) {
        self.transcriptions.lock().unwrap().push_back(transcription);
    }

    /// Make the next `count` transcription calls fail transiently.
    pub fn fail_next(&self, count: u32) {
        self.fail_next.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl SpeechToText for MockSpeechToText {
    async fn transcribe(
        &self,
        audio: &[u8],
        _format: &str,
        _language: &str,
    ) -> Result<Transcription, PortError> {
        take_failure(&self.fail_next, "transcription")?;
        if let Some(scripted) = self.transcriptions.lock().unwrap().pop_front() {
            return Ok(scripted);
        }

        // 16 kHz mono, 16-bit: 32000 bytes per second.
        let duration = audio.len() as f64 / 32_000.0;
        Ok(Transcription {
            text: format!("spoken answer of roughly {:.1} seconds", duration.max(0.1)),
            voice_metrics: Some(VoiceMetrics::new(0.7, 0.75, 0.8, 140, duration)),
            duration_seconds: duration,
            confidence: 0.9,
        })
    }
}

// ── text to speech ────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MockTextToSpeech {
    fail_next: AtomicU32,
}

/// Minimal valid 16 kHz mono 16-bit WAV: header plus 50 ms of silence.
fn wav_stub() -> Vec<u8> {
    const SAMPLES: usize = 800;
    let data_len = (SAMPLES * 2) as u32;
    let mut bytes = Vec::with_capacity(44 + SAMPLES * 2);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVEfmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
    bytes.extend_from_slice(&1u16.to_le_bytes()); // mono
    bytes.extend_from_slice(&16_000u32.to_le_bytes());
    bytes.extend_from_slice(&32_000u32.to_le_bytes());
    bytes.extend_from_slice(&2u16.to_le_bytes());
    bytes.extend_from_slice(&16u16.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    bytes.resize(44 + SAMPLES * 2, 0);
    bytes
}

impl MockTextToSpeech {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, count: u32) {
        self.fail_next.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl TextToSpeech for MockTextToSpeech {
    async fn synthesize(&self, _text: &str, _voice: &str, _speed: f64) -> Result<Vec<u8>, PortError> {
        take_failure(&self.fail_next, "synthesis")?;
        Ok(wav_stub())
    }

    async fn available_voices(&self) -> Result<Vec<String>, PortError> {
        Ok(vec!["default".to_string(), "clara".to_string()])
    }
}

// ── similarity ────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MockSimilarity {
    scores: Mutex<VecDeque<f64>>,
}

impl MockSimilarity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_score(&self, score: f64) {
        self.scores.lock().unwrap().push_back(score);
    }

    /// Token-set overlap, a crude stand-in for embedding cosine.
    fn jaccard(reference: &str, candidate: &str) -> f64 {
        let normalize = |text: &str| -> BTreeSet<String> {
            text.split_whitespace()
                .map(|word| {
                    word.trim_matches(|c: char| !c.is_alphanumeric())
                        .to_lowercase()
                })
                .filter(|word| !word.is_empty())
                .collect()
        };
        let reference = normalize(reference);
        let candidate = normalize(candidate);
        if reference.is_empty() || candidate.is_empty() {
            return 0.0;
        }
        let intersection = reference.intersection(&candidate).count() as f64;
        let union = reference.union(&candidate).count() as f64;
        intersection / union
    }
}

#[async_trait]
impl SimilarityIndex for MockSimilarity {
    async fn similarity(&self, reference: &str, candidate: &str) -> Result<f64, PortError> {
        if let Some(scripted) = self.scores.lock().unwrap().pop_front() {
            return Ok(scripted);
        }
        Ok(Self::jaccard(reference, candidate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_assessments_are_consumed_in_order() {
        let llm = MockLanguageModel::new();
        let mut first = MockLanguageModel::derived_assessment("x");
        first.raw_score = 11.0;
        let mut second = MockLanguageModel::derived_assessment("x");
        second.raw_score = 22.0;
        llm.push_assessment(first);
        llm.push_assessment(second);

        let a = llm.evaluate_answer("q", None, "a").await.unwrap();
        let b = llm.evaluate_answer("q", None, "a").await.unwrap();
        assert_eq!(a.raw_score, 11.0);
        assert_eq!(b.raw_score, 22.0);
    }

    #[tokio::test]
    async fn failure_injection_counts_down() {
        let stt = MockSpeechToText::new();
        stt.fail_next(2);
        assert!(stt.transcribe(b"audio", "wav", "en").await.is_err());
        assert!(stt.transcribe(b"audio", "wav", "en").await.is_err());
        assert!(stt.transcribe(b"audio", "wav", "en").await.is_ok());
    }

    #[tokio::test]
    async fn jaccard_rewards_overlap() {
        let similarity = MockSimilarity::new();
        let same = similarity.similarity("b-tree pages", "b-tree pages").await.unwrap();
        let none = similarity.similarity("b-tree pages", "tcp handshake").await.unwrap();
        assert!(same > 0.99);
        assert_eq!(none, 0.0);
    }

    #[test]
    fn wav_stub_declares_16khz_mono() {
        let wav = wav_stub();
        assert_eq!(&wav[..4], b"RIFF");
        assert_eq!(u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]), 16_000);
        assert_eq!(u16::from_le_bytes([wav[22], wav[23]]), 1);
    }
}
