use std::fmt;

use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

/// Lifecycle phases of a quiz session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Lobby open; participants may join.
    Waiting,
    /// A question is displayed and answers are accepted.
    Question,
    /// The current question's answer and scores are displayed.
    Answer,
    /// Every question has been played; terminal.
    Finished,
}

impl SessionPhase {
    /// Wire name of the phase.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Waiting => "waiting",
            SessionPhase::Question => "question",
            SessionPhase::Answer => "answer",
            SessionPhase::Finished => "finished",
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events that can be applied to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Creator starts the quiz from the lobby.
    Start,
    /// Close the answering window and show the answer.
    Reveal,
    /// Move on to the following question.
    NextQuestion,
    /// The last question has been revealed.
    Finish,
}

impl SessionEvent {
    /// Name of the operation the event stems from, used in error messages.
    pub fn operation(&self) -> &'static str {
        match self {
            SessionEvent::Start => "start quiz",
            SessionEvent::Reveal => "reveal answer",
            SessionEvent::NextQuestion | SessionEvent::Finish => "next question",
        }
    }
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from}")]
pub struct InvalidTransition {
    /// The phase the state machine was in when the invalid event was received.
    pub from: SessionPhase,
    /// The event that cannot be applied from this phase.
    pub event: SessionEvent,
}

/// Per-session state machine; the only authority on which operation may run next.
#[derive(Debug, Clone)]
pub struct SessionStateMachine {
    phase: SessionPhase,
    version: usize,
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Waiting,
            version: 0,
        }
    }
}

impl SessionStateMachine {
    /// Create a new state machine in the waiting phase.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Number of transitions applied so far.
    pub fn version(&self) -> usize {
        self.version
    }

    /// Apply `event`, returning the new phase, or leave the machine untouched
    /// when the event is not valid from the current phase.
    pub fn apply(&mut self, event: SessionEvent) -> Result<SessionPhase, InvalidTransition> {
        let next = self.compute_transition(event)?;
        self.phase = next;
        self.version += 1;
        Ok(next)
    }

    /// Compute a transition from an event if the transition is valid.
    fn compute_transition(&self, event: SessionEvent) -> Result<SessionPhase, InvalidTransition> {
        let next = match (self.phase, event) {
            (SessionPhase::Waiting, SessionEvent::Start) => SessionPhase::Question,
            (SessionPhase::Question, SessionEvent::Reveal) => SessionPhase::Answer,
            (SessionPhase::Answer, SessionEvent::NextQuestion) => SessionPhase::Question,
            (SessionPhase::Answer, SessionEvent::Finish) => SessionPhase::Finished,
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(sm: &mut SessionStateMachine, event: SessionEvent) -> SessionPhase {
        sm.apply(event).unwrap()
    }

    #[test]
    fn initial_state_is_waiting() {
        let sm = SessionStateMachine::new();
        assert_eq!(sm.phase(), SessionPhase::Waiting);
        assert_eq!(sm.version(), 0);
    }

    #[test]
    fn full_happy_path_through_quiz() {
        let mut sm = SessionStateMachine::new();

        assert_eq!(apply(&mut sm, SessionEvent::Start), SessionPhase::Question);
        assert_eq!(apply(&mut sm, SessionEvent::Reveal), SessionPhase::Answer);
        assert_eq!(
            apply(&mut sm, SessionEvent::NextQuestion),
            SessionPhase::Question
        );
        assert_eq!(apply(&mut sm, SessionEvent::Reveal), SessionPhase::Answer);
        assert_eq!(apply(&mut sm, SessionEvent::Finish), SessionPhase::Finished);
        assert_eq!(sm.version(), 5);
    }

    #[test]
    fn reveal_twice_is_rejected() {
        let mut sm = SessionStateMachine::new();
        apply(&mut sm, SessionEvent::Start);
        apply(&mut sm, SessionEvent::Reveal);

        let err = sm.apply(SessionEvent::Reveal).unwrap_err();
        assert_eq!(err.from, SessionPhase::Answer);
        assert_eq!(err.event, SessionEvent::Reveal);
        assert_eq!(sm.phase(), SessionPhase::Answer);
    }

    #[test]
    fn invalid_transition_leaves_version_untouched() {
        let mut sm = SessionStateMachine::new();
        let err = sm.apply(SessionEvent::Reveal).unwrap_err();
        assert_eq!(err.from, SessionPhase::Waiting);
        assert_eq!(sm.version(), 0);
    }

    #[test]
    fn finished_is_terminal() {
        let mut sm = SessionStateMachine::new();
        apply(&mut sm, SessionEvent::Start);
        apply(&mut sm, SessionEvent::Reveal);
        apply(&mut sm, SessionEvent::Finish);

        for event in [
            SessionEvent::Start,
            SessionEvent::Reveal,
            SessionEvent::NextQuestion,
            SessionEvent::Finish,
        ] {
            assert!(sm.apply(event).is_err(), "{event:?} accepted after finish");
        }
    }
}
