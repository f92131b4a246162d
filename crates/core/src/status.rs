use serde::{Deserialize, Serialize};

/// Lifecycle status of an interview.
///
/// `Complete` and `Cancelled` are terminal; every other status has at least
/// one outgoing transition.  The full transition relation lives in
/// [`InterviewStatus::can_transition`] and is the single authority consulted
/// by the aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InterviewStatus {
    Planning,
    Idle,
    Questioning,
    Evaluating,
    FollowUp,
    Complete,
    Cancelled,
}

impl InterviewStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, InterviewStatus::Complete | InterviewStatus::Cancelled)
    }

    /// Whether a direct transition `self -> to` is legal.
    ///
    /// Self-transitions are not legal; cancellation is reachable from every
    /// non-terminal status.
    pub fn can_transition(self, to: InterviewStatus) -> bool {
        use InterviewStatus::*;
        match (self, to) {
            (Planning, Idle) => true,
            (Idle, Questioning) => true,
            (Questioning, Evaluating) => true,
            (Evaluating, Questioning) => true,
            (Evaluating, FollowUp) => true,
            (Evaluating, Complete) => true,
            (FollowUp, Evaluating) => true,
            (from, Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InterviewStatus::Planning => "PLANNING",
            InterviewStatus::Idle => "IDLE",
            InterviewStatus::Questioning => "QUESTIONING",
            InterviewStatus::Evaluating => "EVALUATING",
            InterviewStatus::FollowUp => "FOLLOW_UP",
            InterviewStatus::Complete => "COMPLETE",
            InterviewStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for InterviewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::InterviewStatus::{self, *};

    const ALL: [InterviewStatus; 7] = [
        Planning,
        Idle,
        Questioning,
        Evaluating,
        FollowUp,
        Complete,
        Cancelled,
    ];

    #[test]
    fn terminal_statuses_have_no_outgoing_edges() {
        for to in ALL {
            assert!(!Complete.can_transition(to), "COMPLETE -> {to} must be illegal");
            assert!(!Cancelled.can_transition(to), "CANCELLED -> {to} must be illegal");
        }
    }

    #[test]
    fn every_non_terminal_status_can_cancel() {
        for from in ALL {
            assert_eq!(
                from.can_transition(Cancelled),
                !from.is_terminal(),
                "cancel edge wrong for {from}"
            );
        }
    }

    #[test]
    fn transition_relation_matches_the_table() {
        let legal = [
            (Planning, Idle),
            (Idle, Questioning),
            (Questioning, Evaluating),
            (Evaluating, Questioning),
            (Evaluating, FollowUp),
            (Evaluating, Complete),
            (FollowUp, Evaluating),
            (Planning, Cancelled),
            (Idle, Cancelled),
            (Questioning, Cancelled),
            (Evaluating, Cancelled),
            (FollowUp, Cancelled),
        ];
        for from in ALL {
            for to in ALL {
                let expected = legal.contains(&(from, to));
                assert_eq!(
                    from.can_transition(to),
                    expected,
                    "{from} -> {to} expected legal={expected}"
                );
            }
        }
    }

    #[test]
    fn serializes_in_screaming_snake_case() {
        let json = serde_json::to_string(&FollowUp).unwrap();
        assert_eq!(json, "\"FOLLOW_UP\"");
        let back: InterviewStatus = serde_json::from_str("\"FOLLOW_UP\"").unwrap();
        assert_eq!(back, FollowUp);
    }
}
