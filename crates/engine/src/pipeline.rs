//! Dual-channel answer evaluation.
//!
//! The semantic channel (LLM assessment + similarity search) and the
//! speaking channel (voice metrics) are independent; the two semantic calls
//! are dispatched concurrently and joined before anything is built.  Failure
//! of either semantic call fails the whole pipeline; no partial evaluation
//! is ever returned.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use viva_config::AppConfig;
use viva_core::{Answer, Evaluation, LanguageModel, SimilarityIndex, VoiceMetrics};

use crate::error::{AdapterStage, EngineError};
use crate::retry::with_retries;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub theoretical_weight: f64,
    pub speaking_weight: f64,
    pub llm_timeout: Duration,
    pub vector_timeout: Duration,
}

impl From<&AppConfig> for PipelineSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            theoretical_weight: config.scoring.theoretical_weight,
            speaking_weight: config.scoring.speaking_weight,
            llm_timeout: Duration::from_secs(config.timeouts.llm_seconds),
            vector_timeout: Duration::from_secs(config.timeouts.vector_seconds),
        }
    }
}

/// The answer being evaluated, already transcribed.
#[derive(Debug, Clone)]
pub struct AnswerInput {
    pub interview_id: Uuid,
    pub question_id: Uuid,
    pub prompt: String,
    pub ideal_answer: Option<String>,
    pub transcript: String,
    pub voice_metrics: Option<VoiceMetrics>,
}

/// A matched answer/evaluation pair ready to persist in one transaction.
#[derive(Debug, Clone)]
pub struct EvaluatedAnswer {
    pub answer: Answer,
    pub evaluation: Evaluation,
}

pub async fn evaluate(
    llm: &Arc<dyn LanguageModel>,
    similarity: &Arc<dyn SimilarityIndex>,
    settings: &PipelineSettings,
    input: AnswerInput,
) -> Result<EvaluatedAnswer, EngineError> {
    let reference = input.ideal_answer.as_deref().unwrap_or(&input.prompt);

    let assessment_call = with_retries("llm evaluation", settings.llm_timeout, || {
        llm.evaluate_answer(&input.prompt, input.ideal_answer.as_deref(), &input.transcript)
    });
    let similarity_call = with_retries("similarity", settings.vector_timeout, || {
        similarity.similarity(reference, &input.transcript)
    });

    let (assessment, raw_similarity) = tokio::join!(assessment_call, similarity_call);
    let assessment = assessment
        .map_err(|source| EngineError::adapter(AdapterStage::LanguageModel, source))?;
    let raw_similarity =
        raw_similarity.map_err(|source| EngineError::adapter(AdapterStage::Similarity, source))?;

    let theoretical_score = assessment.raw_score.clamp(0.0, 100.0);
    let speaking_score = input.voice_metrics.as_ref().map(VoiceMetrics::speaking_score);
    let final_score = match speaking_score {
        Some(speaking) => {
            settings.theoretical_weight * theoretical_score + settings.speaking_weight * speaking
        }
        None => theoretical_score,
    }
    .clamp(0.0, 100.0);

    let mut answer = Answer::new(input.interview_id, input.question_id, input.transcript);
    answer.voice_metrics = input.voice_metrics.clone();
    answer.similarity_score = Answer::floor_similarity(raw_similarity);
    answer.gaps = assessment.gaps.clone();

    let evaluation = Evaluation {
        id: Uuid::new_v4(),
        answer_id: answer.id,
        question_id: input.question_id,
        interview_id: input.interview_id,
        raw_score: theoretical_score,
        final_score,
        completeness: assessment.completeness.clamp(0.0, 1.0),
        relevance: assessment.relevance.clamp(0.0, 1.0),
        sentiment: assessment.sentiment,
        reasoning: assessment.reasoning,
        strengths: assessment.strengths,
        weaknesses: assessment.weaknesses,
        voice_metrics: input.voice_metrics,
        created_at: Utc::now(),
    };
    answer.evaluation_id = Some(evaluation.id);

    Ok(EvaluatedAnswer { answer, evaluation })
}
