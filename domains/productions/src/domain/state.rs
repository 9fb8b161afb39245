//! State machine for pipeline stages
//!
//! Every stage of a production moves through the same four states:
//! - `Pending` (initial)
//! - `InProgress` while its generator runs
//! - `Completed` (terminal-success)
//! - `Failed` (terminal until the caller retries)
//!
//! `Failed -> Pending` via `Retry` is the only backward transition.

pub use tubeflow_common::StateError;

// ============================================================================
// Stage State Machine
// ============================================================================

/// Stage states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageState {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl StageState {
    /// Check if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Check if a generator may be started from this state
    pub fn is_runnable(&self) -> bool {
        matches!(self, Self::Pending | Self::Failed)
    }

    /// Get all valid next states from current state
    pub fn valid_transitions(&self) -> &'static [StageState] {
        match self {
            Self::Pending => &[Self::InProgress],
            Self::InProgress => &[Self::Completed, Self::Failed],
            Self::Completed => &[],
            Self::Failed => &[Self::Pending],
        }
    }
}

impl std::fmt::Display for StageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Events that trigger stage state transitions
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StageEvent {
    /// The engine invokes the stage's generator
    Start,
    /// The generator returned an artifact
    Succeed,
    /// The generator failed, timed out or was interrupted
    Fail,
    /// The caller asked to run a failed stage again
    Retry,
}

impl std::fmt::Display for StageEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::Succeed => write!(f, "succeed"),
            Self::Fail => write!(f, "fail"),
            Self::Retry => write!(f, "retry"),
        }
    }
}

/// Stage state machine
pub struct StageStateMachine;

impl StageStateMachine {
    /// Attempt a state transition
    ///
    /// Returns the new state if the transition is valid, or an error otherwise.
    pub fn transition(current: StageState, event: StageEvent) -> Result<StageState, StateError> {
        if current.is_terminal() {
            return Err(StateError::TerminalState(current.to_string()));
        }

        let next = match (&current, &event) {
            (StageState::Pending, StageEvent::Start) => StageState::InProgress,

            (StageState::InProgress, StageEvent::Succeed) => StageState::Completed,
            (StageState::InProgress, StageEvent::Fail) => StageState::Failed,

            (StageState::Failed, StageEvent::Retry) => StageState::Pending,

            _ => {
                return Err(StateError::InvalidTransition {
                    from: current.to_string(),
                    event: event.to_string(),
                });
            }
        };

        Ok(next)
    }

    /// Check if a transition is valid without performing it
    pub fn can_transition(current: StageState, event: &StageEvent) -> bool {
        Self::transition(current, *event).is_ok()
    }
}

// ============================================================================
// Tests
// ============================================================================
