//! In-process transactional storage for interviews and their child records.
//!
//! A single `RwLock` guards the whole state; writes are staged on a
//! [`StoreTx`] handle and applied all-or-nothing under the write lock after
//! optimistic-concurrency checks.  Every committed batch is appended to an
//! append-only JSONL journal and replayed at startup, so finished interviews
//! survive a restart between turns.

pub mod journal;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use viva_core::{
    Answer, Evaluation, FollowUpQuestion, Interview, InterviewStatus, InterviewStore, Question,
    StoreError, StoreTx, PLAN_METADATA_SUMMARY_KEY,
};

use crate::journal::{Journal, JournalBatch, JournalWrite};

#[derive(Debug, Default)]
struct StoreState {
    interviews: HashMap<Uuid, Interview>,
    questions: HashMap<Uuid, Question>,
    followups: HashMap<Uuid, FollowUpQuestion>,
    answers: HashMap<Uuid, Answer>,
    evaluations: HashMap<Uuid, Evaluation>,
    /// `(interview, question) -> answer` index backing last-write-wins
    /// re-answers.
    answer_by_question: HashMap<(Uuid, Uuid), Uuid>,
}

impl StoreState {
    /// Apply one write.  Infallible by construction: all validation happens
    /// before anything is applied, both on commit and on replay.
    fn apply(&mut self, write: JournalWrite) {
        match write {
            JournalWrite::Interview(interview) => {
                self.interviews.insert(interview.id, interview);
            }
            JournalWrite::Question(question) => {
                self.questions.insert(question.id, question);
            }
            JournalWrite::FollowUp(followup) => {
                self.followups.insert(followup.id, followup);
            }
            JournalWrite::Answer(answer) => {
                let key = (answer.interview_id, answer.question_id);
                if let Some(old_id) = self.answer_by_question.insert(key, answer.id) {
                    if old_id != answer.id {
                        // Re-answer: drop the superseded answer and its
                        // evaluation so no orphan rows remain.
                        self.answers.remove(&old_id);
                        self.evaluations.retain(|_, eval| eval.answer_id != old_id);
                    }
                }
                self.answers.insert(answer.id, answer);
            }
            JournalWrite::Evaluation(evaluation) => {
                self.evaluations.insert(evaluation.id, evaluation);
            }
        }
    }

    /// Canonical write list reproducing this state on replay.
    ///
    /// Superseded answers, replaced evaluations, and intermediate aggregate
    /// revisions have already been resolved in memory, so the snapshot is
    /// the minimal journal for the current state.  Ordering is
    /// deterministic so consecutive compactions of the same state produce
    /// identical files.
    fn snapshot(&self) -> Vec<JournalWrite> {
        let mut writes = Vec::new();

        let mut questions: Vec<_> = self.questions.values().cloned().collect();
        questions.sort_by_key(|question| question.id);
        writes.extend(questions.into_iter().map(JournalWrite::Question));

        let mut interviews: Vec<_> = self.interviews.values().cloned().collect();
        interviews.sort_by_key(|interview| (interview.created_at, interview.id));
        writes.extend(interviews.into_iter().map(JournalWrite::Interview));

        let mut followups: Vec<_> = self.followups.values().cloned().collect();
        followups.sort_by_key(|followup| {
            (followup.parent_question_id, followup.order_in_sequence)
        });
        writes.extend(followups.into_iter().map(JournalWrite::FollowUp));

        let mut answers: Vec<_> = self.answers.values().cloned().collect();
        answers.sort_by_key(|answer| (answer.created_at, answer.id));
        writes.extend(answers.into_iter().map(JournalWrite::Answer));

        let mut evaluations: Vec<_> = self.evaluations.values().cloned().collect();
        evaluations.sort_by_key(|evaluation| (evaluation.created_at, evaluation.id));
        writes.extend(evaluations.into_iter().map(JournalWrite::Evaluation));

        writes
    }
}

/// Shared storage handle.  Cheap to clone; all clones see the same state.
#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<RwLock<StoreState>>,
    journal: Option<Journal>,
}

impl MemoryStore {
    /// Volatile store with no journal.  Used by tests and mock setups.
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
            journal: None,
        }
    }

    /// Durable store: replays the journal at `path`, then appends every
    /// subsequent commit to it.
    ///
    /// A journal that accumulated more than one batch is compacted on open:
    /// the replayed state is rewritten as a single canonical batch via the
    /// atomic tmp+rename path, after a `.bak` snapshot of the old file.
    /// Superseded answers and intermediate aggregate revisions are dropped
    /// in the process, so the file does not grow without bound across
    /// restarts.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let journal = Journal::new(path.as_ref());
        let batches = journal.load()?;
        let batch_count = batches.len();
        let mut state = StoreState::default();
        let mut replayed = 0usize;
        for batch in batches {
            for write in batch.writes {
                state.apply(write);
                replayed += 1;
            }
        }

        if batch_count > 1 {
            journal.backup()?;
            let compacted = JournalBatch::new(state.snapshot());
            journal.rewrite(std::slice::from_ref(&compacted)).await?;
            debug!(
                path = %path.as_ref().display(),
                batches = batch_count,
                writes = compacted.writes.len(),
                "journal compacted"
            );
        }

        debug!(path = %path.as_ref().display(), replayed, "journal replayed");
        Ok(Self {
            state: Arc::new(RwLock::new(state)),
            journal: Some(journal),
        })
    }

    async fn journal_append(&self, batch: &JournalBatch) -> Result<(), StoreError> {
        match &self.journal {
            Some(journal) => journal.append(batch).await,
            None => Ok(()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

struct MemoryTx {
    store: MemoryStore,
    writes: Vec<JournalWrite>,
}

#[async_trait]
impl StoreTx for MemoryTx {
    fn stage_interview(&mut self, interview: Interview) {
        self.writes.push(JournalWrite::Interview(interview));
    }

    fn stage_answer(&mut self, answer: Answer) {
        self.writes.push(JournalWrite::Answer(answer));
    }

    fn stage_evaluation(&mut self, evaluation: Evaluation) {
        self.writes.push(JournalWrite::Evaluation(evaluation));
    }

    fn stage_followup(&mut self, followup: FollowUpQuestion) {
        self.writes.push(JournalWrite::FollowUp(followup));
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTx { store, mut writes } = *self;
        let mut state = store.state.write().await;

        // Validate everything before applying anything.
        for write in &mut writes {
            match write {
                JournalWrite::Interview(staged) => {
                    let stored = state.interviews.get(&staged.id).ok_or(StoreError::NotFound {
                        kind: "interview",
                        id: staged.id,
                    })?;
                    if staged.revision != stored.revision {
                        return Err(StoreError::StaleRevision {
                            id: staged.id,
                            staged: staged.revision,
                            stored: stored.revision,
                        });
                    }
                    if staged.status == InterviewStatus::Complete
                        && !staged.plan_metadata.contains_key(PLAN_METADATA_SUMMARY_KEY)
                    {
                        return Err(StoreError::Integrity(format!(
                            "interview {} committed as COMPLETE without a completion summary",
                            staged.id
                        )));
                    }
                    staged.revision += 1;
                }
                JournalWrite::Answer(answer) => {
                    if !state.interviews.contains_key(&answer.interview_id) {
                        return Err(StoreError::NotFound {
                            kind: "interview",
                            id: answer.interview_id,
                        });
                    }
                }
                JournalWrite::Evaluation(_) | JournalWrite::FollowUp(_) | JournalWrite::Question(_) => {}
            }
        }

        let batch = JournalBatch::new(writes);
        store.journal_append(&batch).await?;
        for write in batch.writes {
            state.apply(write);
        }
        Ok(())
    }
}

#[async_trait]
impl InterviewStore for MemoryStore {
    async fn begin(&self) -> Box<dyn StoreTx> {
        Box::new(MemoryTx {
            store: self.clone(),
            writes: Vec::new(),
        })
    }

    async fn insert_interview(&self, interview: Interview) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.interviews.contains_key(&interview.id) {
            return Err(StoreError::Duplicate { kind: "interview", id: interview.id });
        }
        let batch = JournalBatch::new(vec![JournalWrite::Interview(interview)]);
        self.journal_append(&batch).await?;
        for write in batch.writes {
            state.apply(write);
        }
        Ok(())
    }

    async fn insert_question(&self, question: Question) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.questions.contains_key(&question.id) {
            return Err(StoreError::Duplicate { kind: "question", id: question.id });
        }
        let batch = JournalBatch::new(vec![JournalWrite::Question(question)]);
        self.journal_append(&batch).await?;
        for write in batch.writes {
            state.apply(write);
        }
        Ok(())
    }

    async fn interview(&self, id: Uuid) -> Result<Interview, StoreError> {
        let state = self.state.read().await;
        state
            .interviews
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound { kind: "interview", id })
    }

    async fn question(&self, id: Uuid) -> Result<Question, StoreError> {
        let state = self.state.read().await;
        state
            .questions
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound { kind: "question", id })
    }

    async fn followup(&self, id: Uuid) -> Result<FollowUpQuestion, StoreError> {
        let state = self.state.read().await;
        state
            .followups
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound { kind: "followup", id })
    }

    async fn answers_for_interview(&self, interview_id: Uuid) -> Result<Vec<Answer>, StoreError> {
        let state = self.state.read().await;
        let mut answers: Vec<Answer> = state
            .answers
            .values()
            .filter(|answer| answer.interview_id == interview_id)
            .cloned()
            .collect();
        answers.sort_by_key(|answer| answer.created_at);
        Ok(answers)
    }

    async fn evaluations_for_interview(
        &self,
        interview_id: Uuid,
    ) -> Result<Vec<Evaluation>, StoreError> {
        let state = self.state.read().await;
        let mut evaluations: Vec<Evaluation> = state
            .evaluations
            .values()
            .filter(|evaluation| evaluation.interview_id == interview_id)
            .cloned()
            .collect();
        evaluations.sort_by_key(|evaluation| evaluation.created_at);
        Ok(evaluations)
    }

    async fn followups_for_parent(
        &self,
        parent_question_id: Uuid,
    ) -> Result<Vec<FollowUpQuestion>, StoreError> {
        let state = self.state.read().await;
        let mut followups: Vec<FollowUpQuestion> = state
            .followups
            .values()
            .filter(|followup| followup.parent_question_id == parent_question_id)
            .cloned()
            .collect();
        followups.sort_by_key(|followup| followup.order_in_sequence);
        Ok(followups)
    }
}
