use sequence_core::{CoreError, StepStatus};

use crate::error::Result;

/// Lifecycle of one step inside a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Pending,
    Executing,
    Success,
    Error,
    Skipped,
}

impl StepState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Executing => "executing",
            Self::Success => "success",
            Self::Error => "error",
            Self::Skipped => "skipped",
        }
    }

    /// The reported status, once the step has settled.
    pub fn settled_status(&self) -> Option<StepStatus> {
        match self {
            Self::Success => Some(StepStatus::Success),
            Self::Error => Some(StepStatus::Error),
            Self::Skipped => Some(StepStatus::Skipped),
            Self::Pending | Self::Executing => None,
        }
    }
}

pub struct StepStateMachine;

impl StepStateMachine {
    pub fn validate_transition(from: &StepState, to: &StepState) -> Result<()> {
        let allowed = Self::allowed_transitions(from);

        if allowed.contains(to) {
            Ok(())
        } else {
            Err(CoreError::InvalidStatusTransition {
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
            }
            .into())
        }
    }

    // Error -> Executing is a retry; the final Error only becomes
    // terminal once the engine stops retrying.
    fn allowed_transitions(from: &StepState) -> Vec<StepState> {
        match from {
            StepState::Pending => vec![StepState::Executing, StepState::Skipped],
            StepState::Executing => vec![StepState::Success, StepState::Error],
            StepState::Error => vec![StepState::Executing],
            StepState::Success => vec![],
            StepState::Skipped => vec![],
        }
    }

    pub fn can_transition(from: &StepState, to: &StepState) -> bool {
        Self::validate_transition(from, to).is_ok()
    }
}

/// Tracks a single step and rejects out-of-order transitions.
#[derive(Debug, Clone)]
pub struct StepTracker {
    state: StepState,
}

impl Default for StepTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StepTracker {
    pub fn new() -> Self {
        Self {
            state: StepState::Pending,
        }
    }

    pub fn state(&self) -> StepState {
        self.state
    }

    pub fn transition(&mut self, to: StepState) -> Result<()> {
        StepStateMachine::validate_transition(&self.state, &to)?;
        self.state = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;

    #[test]
    fn test_valid_transitions() {
        assert!(StepStateMachine::can_transition(
            &StepState::Pending,
            &StepState::Executing
        ));
        assert!(StepStateMachine::can_transition(
            &StepState::Pending,
            &StepState::Skipped
        ));
        assert!(StepStateMachine::can_transition(
            &StepState::Executing,
            &StepState::Success
        ));
        assert!(StepStateMachine::can_transition(
            &StepState::Executing,
            &StepState::Error
        ));
    }

    #[test]
    fn test_retry_transition() {
        assert!(StepStateMachine::can_transition(
            &StepState::Error,
            &StepState::Executing
        ));
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!StepStateMachine::can_transition(
            &StepState::Pending,
            &StepState::Success
        ));
        assert!(!StepStateMachine::can_transition(
            &StepState::Success,
            &StepState::Executing
        ));
        assert!(!StepStateMachine::can_transition(
            &StepState::Skipped,
            &StepState::Executing
        ));
        assert!(!StepStateMachine::can_transition(
            &StepState::Executing,
            &StepState::Skipped
        ));
    }

    #[test]
    fn test_tracker_walks_retry_path() {
        let mut tracker = StepTracker::new();
        tracker.transition(StepState::Executing).unwrap();
        tracker.transition(StepState::Error).unwrap();
        tracker.transition(StepState::Executing).unwrap();
        tracker.transition(StepState::Success).unwrap();

        assert_eq!(tracker.state(), StepState::Success);
        assert_eq!(tracker.state().settled_status(), Some(StepStatus::Success));
    }

    #[test]
    fn test_tracker_rejects_and_keeps_state() {
        let mut tracker = StepTracker::new();
        tracker.transition(StepState::Skipped).unwrap();

        let error = tracker.transition(StepState::Executing).unwrap_err();
        assert!(matches!(error, EngineError::InternalFault(_)));
        assert_eq!(tracker.state(), StepState::Skipped);
    }

    #[test]
    fn test_unsettled_states_have_no_status() {
        assert_eq!(StepState::Pending.settled_status(), None);
        assert_eq!(StepState::Executing.settled_status(), None);
    }
}
