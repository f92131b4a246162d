//! Atomic interview finalisation.
//!
//! The recommendation call runs first, outside any transaction; only with
//! its result in hand does the engine open the commit that writes the
//! summary and flips the aggregate to `COMPLETE`.  Any failure leaves the
//! aggregate in `EVALUATING`, and re-running completion on an
//! already-complete interview returns the stored summary untouched.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info};
use uuid::Uuid;

use viva_config::AppConfig;
use viva_core::{
    Answer, CompletionSummary, DomainError, Evaluation, GapProgression, InterviewStatus,
    InterviewStore, LanguageModel, QuestionSummary, RecommendationInput, StoreTx as _,
    VoiceMetrics,
};

use crate::error::EngineError;
use crate::retry::with_retries;

#[derive(Debug, Clone)]
pub struct CompletionSettings {
    pub theoretical_weight: f64,
    pub speaking_weight: f64,
    pub speaking_default_when_absent: f64,
    pub recommendation_timeout: Duration,
}

impl From<&AppConfig> for CompletionSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            theoretical_weight: config.scoring.theoretical_weight,
            speaking_weight: config.scoring.speaking_weight,
            speaking_default_when_absent: config.scoring.speaking_default_when_absent,
            recommendation_timeout: Duration::from_secs(config.timeouts.llm_summary_seconds),
        }
    }
}

/// Outcome of a completion request.
#[derive(Debug)]
pub struct CompletionOutcome {
    pub summary: CompletionSummary,
    /// True when the interview was already `COMPLETE` and the stored summary
    /// was returned without recomputation.
    pub already_complete: bool,
}

pub async fn run(
    store: &Arc<dyn InterviewStore>,
    llm: &Arc<dyn LanguageModel>,
    settings: &CompletionSettings,
    interview_id: Uuid,
) -> Result<CompletionOutcome, EngineError> {
    let mut interview = store.interview(interview_id).await?;

    if interview.status == InterviewStatus::Complete {
        return match interview.completion_summary() {
            Some(summary) => Ok(CompletionOutcome { summary, already_complete: true }),
            None => {
                error!(%interview_id, "COMPLETE interview has no completion summary");
                Err(EngineError::Domain(DomainError::SummaryMissing { interview_id }))
            }
        };
    }
    if interview.status != InterviewStatus::Evaluating {
        return Err(EngineError::Domain(DomainError::InvalidStateTransition {
            from: interview.status,
            to: InterviewStatus::Complete,
        }));
    }

    let answers = store.answers_for_interview(interview_id).await?;
    let evaluations = store.evaluations_for_interview(interview_id).await?;
    let evaluation_by_answer: HashMap<Uuid, &Evaluation> =
        evaluations.iter().map(|evaluation| (evaluation.answer_id, evaluation)).collect();

    // ── aggregate metrics over evaluated answers ─────────────────────────────
    let evaluated: Vec<&Answer> = answers
        .iter()
        .filter(|answer| evaluation_by_answer.contains_key(&answer.id))
        .collect();

    let (theoretical_avg, speaking_avg, overall_score) = if evaluated.is_empty() {
        (0.0, 0.0, 0.0)
    } else {
        let theoretical_avg = evaluated
            .iter()
            .map(|answer| evaluation_by_answer[&answer.id].final_score)
            .sum::<f64>()
            / evaluated.len() as f64;

        let speaking_scores: Vec<f64> = evaluated
            .iter()
            .filter_map(|answer| answer.voice_metrics.as_ref())
            .map(VoiceMetrics::speaking_score)
            .collect();
        let speaking_avg = if speaking_scores.is_empty() {
            settings.speaking_default_when_absent
        } else {
            speaking_scores.iter().sum::<f64>() / speaking_scores.len() as f64
        };

        let overall =
            settings.theoretical_weight * theoretical_avg + settings.speaking_weight * speaking_avg;
        (theoretical_avg, speaking_avg, overall)
    };

    // ── per-question roll-ups and gap progression ────────────────────────────
    let answer_for = |question_id: Uuid| answers.iter().find(|a| a.question_id == question_id);

    let mut question_summaries = Vec::with_capacity(interview.question_ids.len());
    let mut gap_progression = Vec::new();
    let mut gaps_filled_total = 0u32;
    let mut gaps_remaining_total = 0u32;

    for &question_id in &interview.question_ids {
        let question = store.question(question_id).await?;
        let followups: Vec<_> = store
            .followups_for_parent(question_id)
            .await?
            .into_iter()
            .filter(|followup| followup.interview_id == interview_id)
            .collect();

        let main_answer = answer_for(question_id);
        let initial: Vec<String> = main_answer
            .filter(|answer| answer.gaps.confirmed)
            .map(|answer| answer.gaps.concepts.clone())
            .unwrap_or_default();

        let last_followup_answer = followups
            .iter()
            .rev()
            .find_map(|followup| answer_for(followup.id));
        let remaining: Vec<String> = match last_followup_answer {
            Some(answer) if answer.gaps.confirmed => answer.gaps.concepts.clone(),
            Some(_) => Vec::new(),
            // No follow-up was answered, so the initial gaps stand.
            None => initial.clone(),
        };
        let filled: Vec<String> = initial
            .iter()
            .filter(|concept| !remaining.contains(concept))
            .cloned()
            .collect();

        gaps_filled_total += filled.len() as u32;
        gaps_remaining_total += remaining.len() as u32;

        let final_score = main_answer
            .and_then(|answer| evaluation_by_answer.get(&answer.id))
            .map(|evaluation| evaluation.final_score)
            .unwrap_or(0.0);

        question_summaries.push(QuestionSummary {
            question_id,
            prompt: question.prompt,
            final_score,
            followups_asked: followups.len() as u32,
            gaps_initial: initial.clone(),
            gaps_remaining: remaining.clone(),
        });
        if !initial.is_empty() || !remaining.is_empty() {
            gap_progression.push(GapProgression {
                parent_question_id: question_id,
                initial,
                filled,
                remaining,
            });
        }
    }

    // ── recommendations, strictly outside the commit ─────────────────────────
    let recommendation_input = RecommendationInput {
        theoretical_avg,
        speaking_avg,
        overall_score,
        evaluations: evaluations.clone(),
        gap_progression: gap_progression.clone(),
    };
    let recommendations = with_retries(
        "interview recommendations",
        settings.recommendation_timeout,
        || llm.generate_recommendations(&recommendation_input),
    )
    .await
    .map_err(EngineError::Completion)?;

    let summary = CompletionSummary {
        overall_score,
        theoretical_score_avg: theoretical_avg,
        speaking_score_avg: speaking_avg,
        total_questions: interview.question_ids.len() as u32,
        total_follow_ups: interview.followup_ids.len() as u32,
        question_summaries,
        gap_progression,
        gaps_filled_total,
        gaps_remaining_total,
        strengths: recommendations.strengths,
        weaknesses: recommendations.weaknesses,
        study_recommendations: recommendations.study_topics,
        technique_tips: recommendations.technique_tips,
        completed_at: Utc::now(),
    };

    interview.set_completion_summary(&summary)?;
    interview.proceed_to_next_question()?;

    let mut tx = store.begin().await;
    tx.stage_interview(interview);
    tx.commit().await?;

    info!(%interview_id, overall = summary.overall_score, "interview completed");
    Ok(CompletionOutcome { summary, already_complete: false })
}

#[cfg(test)]
mod tests {
    use super::*;
    use viva_adapters::MockLanguageModel;
    use viva_core::{GapReport, Interview, Question, StoreError};
    use viva_store::MemoryStore;

    struct Fixture {
        store: Arc<dyn InterviewStore>,
        llm: Arc<MockLanguageModel>,
        llm_port: Arc<dyn LanguageModel>,
        interview: Interview,
    }

    fn settings() -> CompletionSettings {
        CompletionSettings {
            theoretical_weight: 0.7,
            speaking_weight: 0.3,
            speaking_default_when_absent: 50.0,
            recommendation_timeout: Duration::from_secs(1),
        }
    }

    async fn fixture(question_count: usize) -> Fixture {
        let store: Arc<dyn InterviewStore> = Arc::new(MemoryStore::new());
        let llm = Arc::new(MockLanguageModel::new());
        let llm_port: Arc<dyn LanguageModel> = llm.clone();

        let mut interview = Interview::new(Uuid::new_v4());
        let mut plan = Vec::new();
        for i in 0..question_count {
            let question = Question::new(format!("question {i}"));
            plan.push(question.id);
            store.insert_question(question).await.unwrap();
        }
        interview.assign_plan(plan).unwrap();
        interview.mark_ready(Uuid::new_v4()).unwrap();
        interview.start().unwrap();
        store.insert_interview(interview.clone()).await.unwrap();

        Fixture { store, llm, llm_port, interview }
    }

    /// Answer every planned question with the given score, persist the pair,
    /// and leave the aggregate in `EVALUATING` on the last one.
    async fn answer_all(fx: &mut Fixture, score: f64, gaps: GapReport) {
        let question_ids = fx.interview.question_ids.clone();
        for (i, question_id) in question_ids.iter().enumerate() {
            fx.interview.begin_evaluation().unwrap();

            let mut answer = Answer::new(fx.interview.id, *question_id, "text answer");
            answer.similarity_score = 0.9;
            answer.gaps = gaps.clone();
            let evaluation = Evaluation {
                id: Uuid::new_v4(),
                answer_id: answer.id,
                question_id: *question_id,
                interview_id: fx.interview.id,
                raw_score: score,
                final_score: score,
                completeness: 0.8,
                relevance: 0.9,
                sentiment: "neutral".to_string(),
                reasoning: "ok".to_string(),
                strengths: vec![],
                weaknesses: vec![],
                voice_metrics: None,
                created_at: Utc::now(),
            };
            answer.evaluation_id = Some(evaluation.id);

            let mut tx = fx.store.begin().await;
            tx.stage_answer(answer);
            tx.stage_evaluation(evaluation);
            tx.commit().await.unwrap();

            if i + 1 < question_ids.len() {
                fx.interview.proceed_to_next_question().unwrap();
            }
        }
        let mut tx = fx.store.begin().await;
        tx.stage_interview(fx.interview.clone());
        tx.commit().await.unwrap();
        fx.interview.revision += 1;
    }

    #[tokio::test]
    async fn text_only_interviews_use_the_neutral_speaking_default() {
        let mut fx = fixture(2).await;
        answer_all(&mut fx, 80.0, GapReport::none()).await;

        let outcome = run(&fx.store, &fx.llm_port, &settings(), fx.interview.id)
            .await
            .unwrap();
        let summary = outcome.summary;
        assert!(!outcome.already_complete);
        assert_eq!(summary.speaking_score_avg, 50.0);
        assert_eq!(summary.theoretical_score_avg, 80.0);
        let expected = 0.7 * 80.0 + 0.3 * 50.0;
        assert!((summary.overall_score - expected).abs() < 1e-6);
        assert_eq!(summary.total_questions, 2);
        assert_eq!(summary.total_follow_ups, 0);

        let stored = fx.store.interview(fx.interview.id).await.unwrap();
        assert_eq!(stored.status, InterviewStatus::Complete);
        assert_eq!(stored.completion_summary(), Some(summary));
    }

    #[tokio::test(start_paused = true)]
    async fn recommendation_failure_rolls_everything_back() {
        let mut fx = fixture(1).await;
        answer_all(&mut fx, 75.0, GapReport::none()).await;
        fx.llm.fail_recommendations_permanently();

        let err = run(&fx.store, &fx.llm_port, &settings(), fx.interview.id)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Completion(_)));

        let stored = fx.store.interview(fx.interview.id).await.unwrap();
        assert_eq!(stored.status, InterviewStatus::Evaluating, "no partial completion");
        assert!(stored.completion_summary().is_none());
    }

    #[tokio::test]
    async fn completion_is_idempotent_for_complete_interviews() {
        let mut fx = fixture(1).await;
        answer_all(&mut fx, 60.0, GapReport::none()).await;

        let first = run(&fx.store, &fx.llm_port, &settings(), fx.interview.id)
            .await
            .unwrap();
        let revision_after_first = fx.store.interview(fx.interview.id).await.unwrap().revision;

        let second = run(&fx.store, &fx.llm_port, &settings(), fx.interview.id)
            .await
            .unwrap();
        assert!(second.already_complete);
        assert_eq!(second.summary, first.summary, "stored summary returned unchanged");

        let revision_after_second = fx.store.interview(fx.interview.id).await.unwrap().revision;
        assert_eq!(revision_after_first, revision_after_second, "no extra writes");
    }

    #[tokio::test]
    async fn completion_requires_evaluating() {
        let fx = fixture(1).await;
        // Aggregate is QUESTIONING: no answer has arrived.
        let err = run(&fx.store, &fx.llm_port, &settings(), fx.interview.id)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Domain(DomainError::InvalidStateTransition { .. })
        ));
    }

    #[tokio::test]
    async fn unanswered_interviews_complete_with_zero_scores() {
        let mut fx = fixture(1).await;
        // Move to EVALUATING without persisting any answer.
        fx.interview.begin_evaluation().unwrap();
        let mut tx = fx.store.begin().await;
        tx.stage_interview(fx.interview.clone());
        tx.commit().await.unwrap();

        let outcome = run(&fx.store, &fx.llm_port, &settings(), fx.interview.id)
            .await
            .unwrap();
        assert_eq!(outcome.summary.overall_score, 0.0);
        assert_eq!(outcome.summary.theoretical_score_avg, 0.0);
        assert_eq!(outcome.summary.speaking_score_avg, 0.0);
    }

    #[tokio::test]
    async fn missing_interview_is_a_not_found_error() {
        let fx = fixture(1).await;
        let err = run(&fx.store, &fx.llm_port, &settings(), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Store(StoreError::NotFound { .. })));
    }
}
