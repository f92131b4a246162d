//! Per-session coordinator.
//!
//! One orchestrator is bound to one live session and holds no interview
//! state of its own: the aggregate is re-loaded from storage for every
//! inbound frame and mutated only through its own transition API.  Inbound
//! frames are handled strictly one at a time; every outbound frame of a turn
//! is enqueued before the caller reads the next inbound frame, which is what
//! gives the per-session ordering guarantee.

use std::time::Duration;

use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use viva_config::AppConfig;
use viva_core::{
    Answer, DomainError, FollowUpQuestion, InterviewStatus, InterviewStore, LanguageModel,
    SimilarityIndex, SpeechToText, StoreTx as _, TextToSpeech,
};
use viva_protocol::{
    AudioAssembler, AudioFormat, Inbound, Outbound, VoiceMetricsFrame, encode_audio, round1,
};

use crate::completion::{self, CompletionSettings};
use crate::error::{AdapterStage, EngineError};
use crate::followup::{self, FollowUpPolicy};
use crate::pipeline::{self, AnswerInput, PipelineSettings};
use crate::retry::with_retries;

/// The external collaborators one session needs.
#[derive(Clone)]
pub struct Ports {
    pub store: Arc<dyn InterviewStore>,
    pub llm: Arc<dyn LanguageModel>,
    pub stt: Arc<dyn SpeechToText>,
    pub tts: Arc<dyn TextToSpeech>,
    pub similarity: Arc<dyn SimilarityIndex>,
}

/// Whether the session should keep reading frames after a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionFlow {
    Continue,
    Closed,
}

/// The answer input of one turn, kept only so `request_retry` can replay it.
#[derive(Debug, Clone)]
enum AnswerPayload {
    Text {
        question_id: Uuid,
        text: String,
    },
    Audio {
        question_id: Uuid,
        bytes: Vec<u8>,
        format: AudioFormat,
    },
}

impl AnswerPayload {
    fn question_id(&self) -> Uuid {
        match self {
            AnswerPayload::Text { question_id, .. } => *question_id,
            AnswerPayload::Audio { question_id, .. } => *question_id,
        }
    }
}

pub struct SessionOrchestrator {
    interview_id: Uuid,
    ports: Ports,
    config: AppConfig,
    outbound: tokio::sync::mpsc::Sender<Outbound>,
    audio: AudioAssembler,
    pending_retry: Option<AnswerPayload>,
}

impl SessionOrchestrator {
    pub fn new(
        interview_id: Uuid,
        ports: Ports,
        config: AppConfig,
        outbound: tokio::sync::mpsc::Sender<Outbound>,
    ) -> Self {
        Self {
            interview_id,
            ports,
            config,
            outbound,
            audio: AudioAssembler::new(),
            pending_retry: None,
        }
    }

    /// Greet a freshly connected client with the session snapshot.
    pub async fn announce(&mut self) -> SessionFlow {
        match self.ports.store.interview(self.interview_id).await {
            Ok(interview) => {
                self.emit(Outbound::SessionReady {
                    interview_id: interview.id,
                    status: interview.status.to_string(),
                    total_questions: interview.question_ids.len() as u32,
                })
                .await;
                SessionFlow::Continue
            }
            Err(err) => {
                let err = EngineError::from(err);
                self.emit(Outbound::Error(err.to_error_body())).await;
                SessionFlow::Closed
            }
        }
    }

    /// Handle one inbound text frame.  Never panics and never lets an error
    /// escape unmapped: failures become typed `error` frames.
    pub async fn on_frame(&mut self, frame: Inbound) -> SessionFlow {
        let result = self.dispatch(frame).await;
        self.resolve(result).await
    }

    /// Handle one raw binary frame: an audio continuation chunk.
    pub async fn on_binary(&mut self, bytes: &[u8]) -> SessionFlow {
        let result = self
            .audio
            .push_binary(bytes)
            .map(|()| SessionFlow::Continue)
            .map_err(EngineError::from);
        self.resolve(result).await
    }

    async fn dispatch(&mut self, frame: Inbound) -> Result<SessionFlow, EngineError> {
        match frame {
            Inbound::StartSession {} => self.start_session().await,
            Inbound::TextAnswer { question_id, answer_text } => {
                self.answer_turn(AnswerPayload::Text { question_id, text: answer_text })
                    .await
            }
            Inbound::AudioChunk { question_id, chunk_index, is_final, format, audio_data } => {
                let format = AudioFormat::parse(&format)?;
                self.audio.push_chunk(question_id, chunk_index, format, &audio_data)?;
                if !is_final {
                    return Ok(SessionFlow::Continue);
                }
                let assembled = self.audio.finish()?;
                self.answer_turn(AnswerPayload::Audio {
                    question_id: assembled.question_id,
                    bytes: assembled.bytes,
                    format: assembled.format,
                })
                .await
            }
            Inbound::GetNextQuestion {} => self.resend_current_question().await,
            Inbound::RequestRetry { .. } => match self.pending_retry.clone() {
                Some(payload) => {
                    debug!(question = %payload.question_id(), "replaying last answer on request_retry");
                    self.answer_turn(payload).await
                }
                None => Err(EngineError::InvalidFrame("nothing to retry".to_string())),
            },
            Inbound::Cancel {} => self.cancel().await,
        }
    }

    async fn resolve(&mut self, result: Result<SessionFlow, EngineError>) -> SessionFlow {
        match result {
            Ok(flow) => flow,
            Err(err) => {
                if err.is_integrity() {
                    error!(interview = %self.interview_id, %err, "invariant violation");
                } else {
                    warn!(interview = %self.interview_id, %err, "turn failed");
                }
                self.emit(Outbound::Error(err.to_error_body())).await;
                SessionFlow::Continue
            }
        }
    }

    // ── session operations ───────────────────────────────────────────────────

    async fn start_session(&mut self) -> Result<SessionFlow, EngineError> {
        let mut interview = self.ports.store.interview(self.interview_id).await?;
        interview.start()?;
        self.persist_interview(&mut interview).await?;

        let question_id = interview
            .current_main_question_id()
            .ok_or_else(|| EngineError::InvalidFrame("question plan is empty".to_string()))?;
        let question = self.ports.store.question(question_id).await?;
        let audio = if question.tts_ready {
            self.render_speech(&question.prompt).await
        } else {
            None
        };
        info!(interview = %self.interview_id, "session started");
        self.emit(Outbound::Question {
            question_id,
            text: question.prompt,
            index: interview.current_question_index as u32,
            total: interview.question_ids.len() as u32,
            audio_data: audio.as_ref().map(|(b64, _)| b64.clone()),
            audio_format: audio.map(|(_, format)| format),
        })
        .await;
        Ok(SessionFlow::Continue)
    }

    async fn answer_turn(&mut self, payload: AnswerPayload) -> Result<SessionFlow, EngineError> {
        self.pending_retry = Some(payload.clone());
        let deadline = Duration::from_secs(self.config.timeouts.turn_deadline_seconds);
        match tokio::time::timeout(deadline, self.answer_turn_inner(payload)).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::TurnDeadline),
        }
    }

    async fn answer_turn_inner(
        &mut self,
        payload: AnswerPayload,
    ) -> Result<SessionFlow, EngineError> {
        let mut interview = self.ports.store.interview(self.interview_id).await?;
        let question_id = payload.question_id();

        // An answer is acceptable while a question is pending, and while
        // EVALUATING only as an idempotent retry of the question already
        // being evaluated (e.g. after a turn timeout).
        let status = interview.status;
        let expected = match status {
            InterviewStatus::Questioning => interview.current_main_question_id(),
            InterviewStatus::FollowUp | InterviewStatus::Evaluating => interview
                .last_followup_id()
                .or_else(|| interview.current_main_question_id()),
            _ => {
                return Err(EngineError::Domain(DomainError::InvalidStateTransition {
                    from: status,
                    to: InterviewStatus::Evaluating,
                }));
            }
        };
        if expected != Some(question_id) {
            return Err(EngineError::InvalidFrame(format!(
                "answer targets question {question_id}, which is not the current question"
            )));
        }

        let parent_id = match interview.current_parent_question_id {
            Some(parent) if interview.last_followup_id() == Some(question_id) => parent,
            _ => question_id,
        };
        let answered_followup = parent_id != question_id;

        // Transcription happens before the aggregate moves: an STT outage
        // must leave the question still answerable.
        let (transcript, voice_metrics) = match &payload {
            AnswerPayload::Text { text, .. } => (text.clone(), None),
            AnswerPayload::Audio { bytes, format, .. } => {
                let stt_timeout = Duration::from_secs(self.config.timeouts.stt_seconds);
                let language = self.config.adapters.stt_language.clone();
                let transcription = with_retries("stt", stt_timeout, || {
                    self.ports.stt.transcribe(bytes, format.as_str(), &language)
                })
                .await
                .map_err(|source| EngineError::adapter(AdapterStage::SpeechToText, source))?;

                self.emit(Outbound::Transcription {
                    text: transcription.text.clone(),
                    is_final: true,
                    confidence: transcription.confidence,
                })
                .await;
                if let Some(ref metrics) = transcription.voice_metrics {
                    self.emit(Outbound::VoiceMetrics(VoiceMetricsFrame::from_metrics(
                        metrics, false,
                    )))
                    .await;
                }
                (transcription.text, transcription.voice_metrics)
            }
        };

        if status != InterviewStatus::Evaluating {
            if answered_followup {
                interview.answer_followup()?;
            } else {
                interview.begin_evaluation()?;
            }
            self.persist_interview(&mut interview).await?;
        }

        let (prompt, ideal_answer, parent_prompt) = if answered_followup {
            let followup = self.ports.store.followup(question_id).await?;
            let parent = self.ports.store.question(parent_id).await?;
            (followup.prompt, parent.ideal_answer, parent.prompt)
        } else {
            let question = self.ports.store.question(question_id).await?;
            (question.prompt.clone(), question.ideal_answer, question.prompt)
        };

        let settings = PipelineSettings::from(&self.config);
        let evaluated = pipeline::evaluate(
            &self.ports.llm,
            &self.ports.similarity,
            &settings,
            AnswerInput {
                interview_id: self.interview_id,
                question_id,
                prompt,
                ideal_answer,
                transcript,
                voice_metrics,
            },
        )
        .await?;

        // Durable before the evaluation frame goes out.
        let mut tx = self.ports.store.begin().await;
        tx.stage_answer(evaluated.answer.clone());
        tx.stage_evaluation(evaluated.evaluation.clone());
        tx.commit().await?;

        self.emit(Outbound::Evaluation {
            answer_id: evaluated.answer.id,
            score: round1(evaluated.evaluation.final_score),
            feedback: evaluated.evaluation.reasoning.clone(),
            strengths: evaluated.evaluation.strengths.clone(),
            weaknesses: evaluated.evaluation.weaknesses.clone(),
            similarity_score: evaluated.answer.similarity_score,
            gaps: evaluated.answer.gaps.clone(),
            voice_metrics: evaluated.answer.voice_metrics.clone(),
        })
        .await;

        // Decide on a follow-up from durable state only.
        let policy = FollowUpPolicy::from(&self.config);
        let all_answers = self.ports.store.answers_for_interview(self.interview_id).await?;
        let parent_followups: Vec<FollowUpQuestion> = self
            .ports
            .store
            .followups_for_parent(parent_id)
            .await?
            .into_iter()
            .filter(|followup| followup.interview_id == self.interview_id)
            .collect();

        let mut prior: Vec<Answer> = Vec::new();
        if answered_followup {
            if let Some(main) = all_answers.iter().find(|a| a.question_id == parent_id) {
                prior.push(main.clone());
            }
        }
        for followup in &parent_followups {
            if followup.id == question_id {
                continue;
            }
            if let Some(answer) = all_answers.iter().find(|a| a.question_id == followup.id) {
                prior.push(answer.clone());
            }
        }

        let decision = followup::decide(&interview, parent_id, &evaluated.answer, &prior, &policy);
        debug!(
            interview = %self.interview_id,
            needs_followup = decision.needs_followup,
            reason = decision.reason,
            "follow-up decision"
        );

        if decision.needs_followup {
            return self
                .ask_followup(interview, parent_id, &parent_prompt, &evaluated.answer, decision)
                .await;
        }

        if interview.has_more_questions() {
            interview.proceed_to_next_question()?;
            self.persist_interview(&mut interview).await?;

            let next_id = interview
                .current_main_question_id()
                .ok_or_else(|| EngineError::InvalidFrame("question plan is empty".to_string()))?;
            let next = self.ports.store.question(next_id).await?;
            let audio = if next.tts_ready {
                self.render_speech(&next.prompt).await
            } else {
                None
            };
            self.emit(Outbound::Question {
                question_id: next_id,
                text: next.prompt,
                index: interview.current_question_index as u32,
                total: interview.question_ids.len() as u32,
                audio_data: audio.as_ref().map(|(b64, _)| b64.clone()),
                audio_format: audio.map(|(_, format)| format),
            })
            .await;
            return Ok(SessionFlow::Continue);
        }

        // Plan exhausted: the completion engine owns the terminal
        // transition, atomically with the summary write.
        let settings = CompletionSettings::from(&self.config);
        let outcome =
            completion::run(&self.ports.store, &self.ports.llm, &settings, self.interview_id)
                .await?;
        self.emit(Outbound::InterviewComplete { summary: outcome.summary }).await;
        Ok(SessionFlow::Closed)
    }

    async fn ask_followup(
        &mut self,
        mut interview: viva_core::Interview,
        parent_id: Uuid,
        parent_prompt: &str,
        latest_answer: &Answer,
        decision: followup::FollowUpDecision,
    ) -> Result<SessionFlow, EngineError> {
        let order = decision.count + 1;
        let llm_timeout = Duration::from_secs(self.config.timeouts.llm_seconds);
        let text = with_retries("followup generation", llm_timeout, || {
            self.ports.llm.generate_followup_question(
                parent_prompt,
                &latest_answer.transcript,
                &decision.cumulative_gaps,
                order,
            )
        })
        .await
        .map_err(|source| EngineError::adapter(AdapterStage::LanguageModel, source))?;

        let followup = FollowUpQuestion::new(
            self.interview_id,
            parent_id,
            text,
            order,
            decision.cumulative_gaps.clone(),
        );
        interview.ask_followup(followup.id, parent_id)?;

        let mut tx = self.ports.store.begin().await;
        tx.stage_followup(followup.clone());
        tx.stage_interview(interview);
        tx.commit().await?;

        let audio = self.render_speech(&followup.prompt).await;
        self.emit(Outbound::FollowUpQuestion {
            question_id: followup.id,
            parent_question_id: parent_id,
            text: followup.prompt.clone(),
            generated_reason: format!("missing concepts: {}", decision.cumulative_gaps.join(", ")),
            order_in_sequence: order,
            audio_data: audio.as_ref().map(|(b64, _)| b64.clone()),
            audio_format: audio.map(|(_, format)| format),
        })
        .await;
        Ok(SessionFlow::Continue)
    }

    async fn resend_current_question(&mut self) -> Result<SessionFlow, EngineError> {
        let interview = self.ports.store.interview(self.interview_id).await?;
        match interview.status {
            InterviewStatus::Questioning => {
                let question_id = interview
                    .current_main_question_id()
                    .ok_or_else(|| EngineError::InvalidFrame("question plan is empty".to_string()))?;
                let question = self.ports.store.question(question_id).await?;
                let audio = if question.tts_ready {
                    self.render_speech(&question.prompt).await
                } else {
                    None
                };
                self.emit(Outbound::Question {
                    question_id,
                    text: question.prompt,
                    index: interview.current_question_index as u32,
                    total: interview.question_ids.len() as u32,
                    audio_data: audio.as_ref().map(|(b64, _)| b64.clone()),
                    audio_format: audio.map(|(_, format)| format),
                })
                .await;
                Ok(SessionFlow::Continue)
            }
            InterviewStatus::FollowUp => {
                let followup_id = interview.last_followup_id().ok_or_else(|| {
                    EngineError::InvalidFrame("no pending follow-up question".to_string())
                })?;
                let followup = self.ports.store.followup(followup_id).await?;
                let audio = self.render_speech(&followup.prompt).await;
                self.emit(Outbound::FollowUpQuestion {
                    question_id: followup.id,
                    parent_question_id: followup.parent_question_id,
                    text: followup.prompt.clone(),
                    generated_reason: format!(
                        "missing concepts: {}",
                        followup.generated_reason.join(", ")
                    ),
                    order_in_sequence: followup.order_in_sequence,
                    audio_data: audio.as_ref().map(|(b64, _)| b64.clone()),
                    audio_format: audio.map(|(_, format)| format),
                })
                .await;
                Ok(SessionFlow::Continue)
            }
            other => Err(EngineError::Domain(DomainError::InvalidStateTransition {
                from: other,
                to: InterviewStatus::Questioning,
            })),
        }
    }

    async fn cancel(&mut self) -> Result<SessionFlow, EngineError> {
        let mut interview = self.ports.store.interview(self.interview_id).await?;
        if interview.status.is_terminal() {
            return Ok(SessionFlow::Closed);
        }
        interview.cancel()?;
        self.persist_interview(&mut interview).await?;
        info!(interview = %self.interview_id, "interview cancelled");
        Ok(SessionFlow::Closed)
    }

    // ── helpers ──────────────────────────────────────────────────────────────

    async fn persist_interview(
        &self,
        interview: &mut viva_core::Interview,
    ) -> Result<(), EngineError> {
        let mut tx = self.ports.store.begin().await;
        tx.stage_interview(interview.clone());
        tx.commit().await?;
        // Mirror the store's revision bump so later writes in this turn are
        // not spuriously stale.
        interview.revision += 1;
        Ok(())
    }

    /// Best-effort speech rendering.  A synthesis outage degrades to a
    /// text-only frame after an explanatory error frame; it never fails the
    /// turn.
    async fn render_speech(&self, text: &str) -> Option<(String, AudioFormat)> {
        let tts_timeout = Duration::from_secs(self.config.timeouts.tts_seconds);
        let voice = self.config.adapters.tts_voice.clone();
        let speed = self.config.adapters.tts_speed;
        match with_retries("tts", tts_timeout, || self.ports.tts.synthesize(text, &voice, speed))
            .await
        {
            Ok(bytes) => Some((encode_audio(&bytes), AudioFormat::Wav)),
            Err(source) => {
                warn!(interview = %self.interview_id, %source, "speech rendering failed");
                let err = EngineError::adapter(AdapterStage::TextToSpeech, source);
                self.emit(Outbound::Error(err.to_error_body())).await;
                None
            }
        }
    }

    async fn emit(&self, frame: Outbound) {
        debug!(interview = %self.interview_id, kind = frame.kind(), "outbound frame");
        if self.outbound.send(frame).await.is_err() {
            warn!(interview = %self.interview_id, "outbound channel closed; frame dropped");
        }
    }
}
