use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;
use crate::status::InterviewStatus;
use crate::summary::{CompletionSummary, PLAN_METADATA_SUMMARY_KEY};

/// Hard domain limit on follow-ups per main question.
///
/// This is an invariant of the aggregate, not a tunable: configuration may
/// lower the effective cap but can never raise it past this value.
pub const MAX_FOLLOWUPS_PER_QUESTION: u8 = 3;

/// The interview aggregate root.
///
/// Sole owner of interview state: every status change goes through the
/// methods below, each of which consults the transition table in
/// [`InterviewStatus::can_transition`] and fails without side effects when
/// the move is illegal.  The orchestrator holds no copy of this state across
/// turns; it re-loads the aggregate from storage for every inbound frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interview {
    pub id: Uuid,
    pub candidate_id: Uuid,
    /// Ordered plan of main question ids, frozen once the interview leaves
    /// `PLANNING`.
    pub question_ids: Vec<Uuid>,
    /// Index into `question_ids` of the main question currently in play.
    pub current_question_index: usize,
    /// Every follow-up asked so far, in ask order, across all parents.
    pub followup_ids: Vec<Uuid>,
    /// Main question currently spawning follow-ups, if any.
    pub current_parent_question_id: Option<Uuid>,
    /// Follow-ups asked for the current parent, 0..=3.
    pub current_followup_count: u8,
    pub status: InterviewStatus,
    /// Free-form metadata written by the upstream planner and, on
    /// completion, the summary engine.
    pub plan_metadata: HashMap<String, serde_json::Value>,
    /// Optimistic-concurrency token, bumped by the store on every committed
    /// update.
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Interview {
    pub fn new(candidate_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            candidate_id,
            question_ids: Vec::new(),
            current_question_index: 0,
            followup_ids: Vec::new(),
            current_parent_question_id: None,
            current_followup_count: 0,
            status: InterviewStatus::Planning,
            plan_metadata: HashMap::new(),
            revision: 0,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// Install the planned question list.  Only legal while `PLANNING`.
    pub fn assign_plan(&mut self, question_ids: Vec<Uuid>) -> Result<(), DomainError> {
        if self.status != InterviewStatus::Planning {
            return Err(DomainError::PlanFrozen { current: self.status });
        }
        self.question_ids = question_ids;
        self.touch();
        Ok(())
    }

    /// `PLANNING -> IDLE`: the upstream planner has produced a usable plan.
    pub fn mark_ready(&mut self, cv_analysis_id: Uuid) -> Result<(), DomainError> {
        self.transition(InterviewStatus::Idle)?;
        self.plan_metadata.insert(
            "cv_analysis_id".to_string(),
            serde_json::Value::String(cv_analysis_id.to_string()),
        );
        Ok(())
    }

    /// `IDLE -> QUESTIONING`: the candidate is present and the first main
    /// question is about to be asked.
    pub fn start(&mut self) -> Result<(), DomainError> {
        if self.status == InterviewStatus::Idle && self.question_ids.is_empty() {
            return Err(DomainError::EmptyPlan);
        }
        self.transition(InterviewStatus::Questioning)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// An answer to the current question (main or follow-up) has arrived.
    pub fn begin_evaluation(&mut self) -> Result<(), DomainError> {
        self.transition(InterviewStatus::Evaluating)
    }

    /// Register a freshly generated follow-up and move to `FOLLOW_UP`.
    ///
    /// Switching to a new parent resets the per-parent counter to one; the
    /// fourth follow-up under the same parent fails with
    /// [`DomainError::MaxFollowupsExceeded`] and leaves the aggregate
    /// unchanged.
    pub fn ask_followup(
        &mut self,
        followup_id: Uuid,
        parent_question_id: Uuid,
    ) -> Result<(), DomainError> {
        if self.status != InterviewStatus::Evaluating {
            return Err(DomainError::InvalidStateTransition {
                from: self.status,
                to: InterviewStatus::FollowUp,
            });
        }
        if self.current_parent_question_id == Some(parent_question_id) {
            if self.current_followup_count >= MAX_FOLLOWUPS_PER_QUESTION {
                return Err(DomainError::MaxFollowupsExceeded { parent_question_id });
            }
            self.current_followup_count += 1;
        } else {
            self.current_parent_question_id = Some(parent_question_id);
            self.current_followup_count = 1;
        }
        self.followup_ids.push(followup_id);
        self.transition(InterviewStatus::FollowUp)
    }

    /// An answer to the pending follow-up has arrived.
    pub fn answer_followup(&mut self) -> Result<(), DomainError> {
        if self.status != InterviewStatus::FollowUp {
            return Err(DomainError::InvalidStateTransition {
                from: self.status,
                to: InterviewStatus::Evaluating,
            });
        }
        self.transition(InterviewStatus::Evaluating)
    }

    /// Leave the current main question behind.
    ///
    /// Resets the follow-up cursor, advances the plan index, and lands in
    /// `QUESTIONING` when questions remain or `COMPLETE` when the plan is
    /// exhausted.
    pub fn proceed_to_next_question(&mut self) -> Result<(), DomainError> {
        if self.status != InterviewStatus::Evaluating {
            return Err(DomainError::InvalidStateTransition {
                from: self.status,
                to: InterviewStatus::Questioning,
            });
        }
        self.current_parent_question_id = None;
        self.current_followup_count = 0;
        self.current_question_index += 1;
        if self.current_question_index < self.question_ids.len() {
            self.transition(InterviewStatus::Questioning)
        } else {
            self.transition(InterviewStatus::Complete)?;
            self.completed_at = Some(Utc::now());
            Ok(())
        }
    }

    /// Abort from any non-terminal status.
    pub fn cancel(&mut self) -> Result<(), DomainError> {
        self.transition(InterviewStatus::Cancelled)
    }

    // ── queries ──────────────────────────────────────────────────────────────

    pub fn current_main_question_id(&self) -> Option<Uuid> {
        self.question_ids.get(self.current_question_index).copied()
    }

    /// Whether another main question exists after the current one.
    pub fn has_more_questions(&self) -> bool {
        self.current_question_index + 1 < self.question_ids.len()
    }

    pub fn can_ask_more_followups(&self) -> bool {
        self.current_followup_count < MAX_FOLLOWUPS_PER_QUESTION
    }

    /// Id of the follow-up the candidate is expected to answer, when the
    /// current parent has an open follow-up run.
    pub fn last_followup_id(&self) -> Option<Uuid> {
        if self.current_parent_question_id.is_some() {
            self.followup_ids.last().copied()
        } else {
            None
        }
    }

    pub fn completion_summary(&self) -> Option<CompletionSummary> {
        let value = self.plan_metadata.get(PLAN_METADATA_SUMMARY_KEY)?;
        serde_json::from_value(value.clone()).ok()
    }

    pub fn set_completion_summary(&mut self, summary: &CompletionSummary) -> Result<(), DomainError> {
        let value =
            serde_json::to_value(summary).map_err(|err| DomainError::Metadata(err.to_string()))?;
        self.plan_metadata
            .insert(PLAN_METADATA_SUMMARY_KEY.to_string(), value);
        self.touch();
        Ok(())
    }

    // ── internals ────────────────────────────────────────────────────────────

    fn transition(&mut self, to: InterviewStatus) -> Result<(), DomainError> {
        if !self.status.can_transition(to) {
            return Err(DomainError::InvalidStateTransition { from: self.status, to });
        }
        self.status = to;
        self.touch();
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
