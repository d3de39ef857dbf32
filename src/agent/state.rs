//! Pipeline state machine
//!
//! Deterministic finite state machine for one query:
//! - Safety: the synthesizer state is unreachable without a completed plan
//! - Liveness: every run ends in Done or Error
//! - Determinism: unique next state per event

use crate::errors::{PipelineError, Result};
use serde::{Deserialize, Serialize};

/// Pipeline execution states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineState {
    /// Session created, no query submitted yet
    Created,

    /// Planner stage in flight
    PlannerRunning,

    /// Validated plan written to session state
    PlannerDone,

    /// Synthesizer stage in flight
    SynthesizerRunning,

    /// Answer written (terminal)
    SynthesizerDone,

    /// A stage failed (terminal)
    Error,
}

/// Events that trigger state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineEvent {
    /// Query submitted
    QuerySubmitted,

    /// Plan validated and stored
    PlanAccepted,

    /// Synthesizer invoked with the stored plan
    SynthesisStarted,

    /// Answer stored
    AnswerWritten,

    /// Any stage failure
    StageFailed,
}

impl PipelineState {
    /// Check if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::SynthesizerDone | PipelineState::Error)
    }

    /// Attempt state transition with validation
    ///
    /// Valid transitions:
    /// 1. Created            → PlannerRunning     (on: QuerySubmitted)
    /// 2. PlannerRunning     → PlannerDone        (on: PlanAccepted)
    /// 3. PlannerDone        → SynthesizerRunning (on: SynthesisStarted)
    /// 4. SynthesizerRunning → SynthesizerDone    (on: AnswerWritten)
    /// 5. any non-terminal   → Error              (on: StageFailed)
    /// 6. terminal states self-loop
    pub fn transition(&self, event: PipelineEvent) -> Result<PipelineState> {
        use PipelineEvent::*;
        use PipelineState::*;

        let next_state = match (self, event) {
            (Created, QuerySubmitted) => PlannerRunning,
            (PlannerRunning, PlanAccepted) => PlannerDone,
            (PlannerDone, SynthesisStarted) => SynthesizerRunning,
            (SynthesizerRunning, AnswerWritten) => SynthesizerDone,

            (Created | PlannerRunning | PlannerDone | SynthesizerRunning, StageFailed) => Error,

            // Terminal states (self-loops)
            (SynthesizerDone, _) => SynthesizerDone,
            (Error, _) => Error,

            (from, event) => {
                return Err(PipelineError::InvalidTransition {
                    from: format!("{:?}", from),
                    to: format!("(via {:?})", event),
                    reason: format!("No valid transition from {:?} on {:?}", from, event),
                });
            }
        };

        Ok(next_state)
    }

    /// Get all valid events from this state
    pub fn valid_events(&self) -> Vec<PipelineEvent> {
        use PipelineEvent::*;
        use PipelineState::*;

        match self {
            Created => vec![QuerySubmitted, StageFailed],
            PlannerRunning => vec![PlanAccepted, StageFailed],
            PlannerDone => vec![SynthesisStarted, StageFailed],
            SynthesizerRunning => vec![AnswerWritten, StageFailed],
            SynthesizerDone | Error => vec![],
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut state = PipelineState::Created;
        for (event, expected) in [
            (PipelineEvent::QuerySubmitted, PipelineState::PlannerRunning),
            (PipelineEvent::PlanAccepted, PipelineState::PlannerDone),
            (PipelineEvent::SynthesisStarted, PipelineState::SynthesizerRunning),
            (PipelineEvent::AnswerWritten, PipelineState::SynthesizerDone),
        ] {
            state = state.transition(event).unwrap();
            assert_eq!(state, expected);
        }
        assert!(state.is_terminal());
    }

    #[test]
    fn test_error_reachable_from_every_non_terminal_state() {
        for state in [
            PipelineState::Created,
            PipelineState::PlannerRunning,
            PipelineState::PlannerDone,
            PipelineState::SynthesizerRunning,
        ] {
            assert!(!state.is_terminal());
            assert_eq!(
                state.transition(PipelineEvent::StageFailed).unwrap(),
                PipelineState::Error
            );
        }
    }

    #[test]
    fn test_synthesis_requires_plan() {
        let result = PipelineState::PlannerRunning.transition(PipelineEvent::SynthesisStarted);
        assert!(matches!(result, Err(PipelineError::InvalidTransition { .. })));

        let result = PipelineState::Created.transition(PipelineEvent::SynthesisStarted);
        assert!(result.is_err());
    }

    #[test]
    fn test_terminal_self_loops() {
        assert_eq!(
            PipelineState::Error.transition(PipelineEvent::PlanAccepted).unwrap(),
            PipelineState::Error
        );
        assert_eq!(
            PipelineState::SynthesizerDone.transition(PipelineEvent::StageFailed).unwrap(),
            PipelineState::SynthesizerDone
        );
    }

    #[test]
    fn test_valid_events_agree_with_transition() {
        for state in [
            PipelineState::Created,
            PipelineState::PlannerRunning,
            PipelineState::PlannerDone,
            PipelineState::SynthesizerRunning,
        ] {
            for event in state.valid_events() {
                assert!(state.transition(event).is_ok());
            }
        }
    }
}
