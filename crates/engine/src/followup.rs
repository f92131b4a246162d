//! Break conditions for the adaptive follow-up loop.
//!
//! A pure decision over durable state: nothing here mutates the aggregate or
//! talks to an adapter, so the same inputs always produce the same verdict.

use std::collections::BTreeSet;

use uuid::Uuid;

use viva_config::AppConfig;
use viva_core::{Answer, Interview};

pub const REASON_INTERVIEW_BUDGET: &str = "interview_followup_budget";
pub const REASON_MAX_FOLLOWUPS: &str = "max_followups_reached";
pub const REASON_QUALITY_MET: &str = "quality_threshold_met";
pub const REASON_NO_CONFIRMED_GAPS: &str = "no_confirmed_gaps";
pub const REASON_CONFIRMED_GAPS: &str = "confirmed_gaps_remain";

#[derive(Debug, Clone, PartialEq)]
pub struct FollowUpPolicy {
    pub max_per_question: u8,
    pub max_per_interview: u32,
    pub similarity_threshold: f64,
}

impl From<&AppConfig> for FollowUpPolicy {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_per_question: config.followups.max_per_question,
            max_per_interview: config.followups.max_per_interview,
            similarity_threshold: config.scoring.similarity_quality_threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FollowUpDecision {
    pub needs_followup: bool,
    pub reason: &'static str,
    /// Follow-ups already asked for this parent before the decision.
    pub count: u8,
    /// Union of confirmed gap concepts across the parent's answers,
    /// deterministically ordered.  Empty when no follow-up is needed.
    pub cumulative_gaps: Vec<String>,
}

impl FollowUpDecision {
    fn no(reason: &'static str, count: u8) -> Self {
        Self { needs_followup: false, reason, count, cumulative_gaps: Vec::new() }
    }
}

/// Decide whether `latest` warrants another follow-up under
/// `parent_question_id`.
///
/// `prior_answers_for_parent` holds the parent's earlier answers (the main
/// answer first, then follow-up answers in ask order), excluding `latest`.
/// Rules are evaluated in order; the first match wins.
pub fn decide(
    interview: &Interview,
    parent_question_id: Uuid,
    latest: &Answer,
    prior_answers_for_parent: &[Answer],
    policy: &FollowUpPolicy,
) -> FollowUpDecision {
    let count = if interview.current_parent_question_id == Some(parent_question_id) {
        interview.current_followup_count
    } else {
        0
    };

    if interview.followup_ids.len() as u32 >= policy.max_per_interview {
        return FollowUpDecision::no(REASON_INTERVIEW_BUDGET, count);
    }
    if count >= policy.max_per_question {
        return FollowUpDecision::no(REASON_MAX_FOLLOWUPS, count);
    }
    if latest.similarity_score >= policy.similarity_threshold {
        return FollowUpDecision::no(REASON_QUALITY_MET, count);
    }
    if !latest.gaps.confirmed || latest.gaps.concepts.is_empty() {
        return FollowUpDecision::no(REASON_NO_CONFIRMED_GAPS, count);
    }

    let mut gaps: BTreeSet<String> = BTreeSet::new();
    for answer in prior_answers_for_parent {
        if answer.gaps.confirmed {
            gaps.extend(answer.gaps.concepts.iter().cloned());
        }
    }
    gaps.extend(latest.gaps.concepts.iter().cloned());

    FollowUpDecision {
        needs_followup: true,
        reason: REASON_CONFIRMED_GAPS,
        count,
        cumulative_gaps: gaps.into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use viva_core::GapReport;

    fn policy() -> FollowUpPolicy {
        FollowUpPolicy {
            max_per_question: 3,
            max_per_interview: 15,
            similarity_threshold: 0.8,
        }
    }

    struct Fixture {
        interview: Interview,
        parent: Uuid,
    }

    fn fixture() -> Fixture {
        let mut interview = Interview::new(Uuid::new_v4());
        let parent = Uuid::new_v4();
        interview.assign_plan(vec![parent]).unwrap();
        interview.mark_ready(Uuid::new_v4()).unwrap();
        interview.start().unwrap();
        interview.begin_evaluation().unwrap();
        Fixture { interview, parent }
    }

    fn answer(fixture: &Fixture, similarity: f64, gaps: GapReport) -> Answer {
        let mut answer = Answer::new(fixture.interview.id, fixture.parent, "answer");
        answer.similarity_score = Answer::floor_similarity(similarity);
        answer.gaps = gaps;
        answer
    }

    #[test]
    fn high_similarity_breaks_the_loop() {
        let fx = fixture();
        let latest = answer(&fx, 0.85, GapReport::confirmed(vec!["indexing".into()]));
        let decision = decide(&fx.interview, fx.parent, &latest, &[], &policy());
        assert!(!decision.needs_followup);
        assert_eq!(decision.reason, REASON_QUALITY_MET);
        assert!(decision.cumulative_gaps.is_empty());
    }

    #[test]
    fn threshold_is_inclusive() {
        let fx = fixture();
        let latest = answer(&fx, 0.8, GapReport::confirmed(vec!["indexing".into()]));
        let decision = decide(&fx.interview, fx.parent, &latest, &[], &policy());
        assert_eq!(decision.reason, REASON_QUALITY_MET);
    }

    #[test]
    fn unconfirmed_or_empty_gaps_break_the_loop() {
        let fx = fixture();

        let unconfirmed = answer(
            &fx,
            0.4,
            GapReport { concepts: vec!["indexing".into()], confirmed: false },
        );
        let decision = decide(&fx.interview, fx.parent, &unconfirmed, &[], &policy());
        assert_eq!(decision.reason, REASON_NO_CONFIRMED_GAPS);

        let empty = answer(&fx, 0.4, GapReport { concepts: vec![], confirmed: true });
        let decision = decide(&fx.interview, fx.parent, &empty, &[], &policy());
        assert_eq!(decision.reason, REASON_NO_CONFIRMED_GAPS);
    }

    #[test]
    fn confirmed_gaps_below_threshold_require_a_followup() {
        let fx = fixture();
        let latest = answer(&fx, 0.5, GapReport::confirmed(vec!["indexing".into()]));
        let decision = decide(&fx.interview, fx.parent, &latest, &[], &policy());
        assert!(decision.needs_followup);
        assert_eq!(decision.reason, REASON_CONFIRMED_GAPS);
        assert_eq!(decision.count, 0);
        assert_eq!(decision.cumulative_gaps, vec!["indexing".to_string()]);
    }

    #[test]
    fn per_question_cap_wins_over_everything_else() {
        let mut fx = fixture();
        for _ in 0..3 {
            fx.interview.ask_followup(Uuid::new_v4(), fx.parent).unwrap();
            fx.interview.answer_followup().unwrap();
        }
        let latest = answer(&fx, 0.1, GapReport::confirmed(vec!["indexing".into()]));
        let decision = decide(&fx.interview, fx.parent, &latest, &[], &policy());
        assert!(!decision.needs_followup);
        assert_eq!(decision.reason, REASON_MAX_FOLLOWUPS);
        assert_eq!(decision.count, 3);
    }

    #[test]
    fn interview_budget_short_circuits_first() {
        let mut fx = fixture();
        let mut policy = policy();
        policy.max_per_interview = 1;
        fx.interview.ask_followup(Uuid::new_v4(), fx.parent).unwrap();
        fx.interview.answer_followup().unwrap();

        let latest = answer(&fx, 0.1, GapReport::confirmed(vec!["indexing".into()]));
        let decision = decide(&fx.interview, fx.parent, &latest, &[], &policy);
        assert_eq!(decision.reason, REASON_INTERVIEW_BUDGET);
    }

    #[test]
    fn cumulative_gaps_union_confirmed_concepts_only() {
        let fx = fixture();
        let mut main_answer = answer(&fx, 0.5, GapReport::confirmed(vec!["indexing".into(), "paging".into()]));
        main_answer.question_id = fx.parent;
        let unconfirmed_followup = answer(
            &fx,
            0.5,
            GapReport { concepts: vec!["sharding".into()], confirmed: false },
        );
        let latest = answer(&fx, 0.5, GapReport::confirmed(vec!["paging".into(), "caching".into()]));

        let decision = decide(
            &fx.interview,
            fx.parent,
            &latest,
            &[main_answer, unconfirmed_followup],
            &policy(),
        );
        assert!(decision.needs_followup);
        assert_eq!(
            decision.cumulative_gaps,
            vec!["caching".to_string(), "indexing".to_string(), "paging".to_string()],
            "set union over confirmed gaps, sorted; unconfirmed concepts excluded"
        );
    }
}
