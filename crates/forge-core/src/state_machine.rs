//! Orchestrator run states and their legal transitions

use crate::error::StateMachineError;
use serde::{Deserialize, Serialize};

/// State of one orchestrator run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Request accepted, nothing started
    Idle,
    /// Waiting on the generative backend
    Generating,
    /// Running the policy engine
    PolicyChecking,
    /// Running the compliance validator
    Validating,
    /// Candidate accepted (terminal)
    Accepted,
    /// Attempt budget spent or early exit (terminal)
    Exhausted,
    /// Caller cancelled the request (terminal)
    Cancelled,
}

impl RunState {
    /// Whether no further transitions are possible
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        allowed_transitions(self).is_empty()
    }
}

/// Validates a state transition.
///
/// # Errors
/// `StateMachineError::IllegalTransition` if `to` is not reachable from `from`.
pub fn validate_transition(from: RunState, to: RunState) -> Result<(), StateMachineError> {
    if allowed(from, to) {
        Ok(())
    } else {
        Err(StateMachineError::IllegalTransition { from, to })
    }
}

/// States reachable from `from` in one step
#[must_use]
pub fn allowed_transitions(from: RunState) -> Vec<RunState> {
    use RunState::*;
    match from {
        Idle => vec![Generating, Cancelled],
        Generating => vec![PolicyChecking, Cancelled],
        PolicyChecking => vec![Validating, Generating, Exhausted, Cancelled],
        Validating => vec![Accepted, Generating, Exhausted, Cancelled],
        Accepted | Exhausted | Cancelled => vec![],
    }
}

fn allowed(from: RunState, to: RunState) -> bool {
    allowed_transitions(from).into_iter().any(|s| s == to)
}

#[cfg(test)]
mod tests {
    use super::*;
    use RunState::*;

    #[test]
    fn happy_path_is_legal() {
        for (from, to) in [
            (Idle, Generating),
            (Generating, PolicyChecking),
            (PolicyChecking, Validating),
            (Validating, Accepted),
        ] {
            assert!(validate_transition(from, to).is_ok(), "{from:?} -> {to:?}");
        }
    }

    #[test]
    fn retry_loops_back_to_generating() {
        assert!(validate_transition(Validating, Generating).is_ok());
        assert!(validate_transition(PolicyChecking, Generating).is_ok());
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for state in [Accepted, Exhausted, Cancelled] {
            assert!(state.is_terminal());
            assert_eq!(
                validate_transition(state, Generating),
                Err(StateMachineError::IllegalTransition {
                    from: state,
                    to: Generating
                })
            );
        }
    }

    #[test]
    fn cannot_skip_policy() {
        assert!(validate_transition(Generating, Validating).is_err());
        assert!(validate_transition(Generating, Accepted).is_err());
        assert!(validate_transition(PolicyChecking, Accepted).is_err());
    }

    #[test]
    fn every_live_state_can_be_cancelled() {
        for state in [Idle, Generating, PolicyChecking, Validating] {
            assert!(!state.is_terminal());
            assert!(validate_transition(state, Cancelled).is_ok());
        }
    }
}
