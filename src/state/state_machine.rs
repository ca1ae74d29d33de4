use thiserror::Error;

/// High-level phases an exam session can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// The attempt has not been started or resumed yet.
    NotStarted,
    /// The student is answering; countdown and pollers are live.
    InProgress,
    /// A termination trigger won the latch; the attempt is being finalized.
    Submitting(TerminationReason),
    /// The attempt is finalized server-side. Terminal.
    Submitted(TerminationReason),
}

impl SessionPhase {
    /// Termination reason carried by the submitting/submitted phases.
    pub fn termination_reason(&self) -> Option<TerminationReason> {
        match self {
            SessionPhase::NotStarted | SessionPhase::InProgress => None,
            SessionPhase::Submitting(reason) | SessionPhase::Submitted(reason) => Some(*reason),
        }
    }
}

/// What ended the answering phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// The student asked to submit.
    Manual,
    /// The countdown reached zero.
    Timeout,
    /// The room was closed remotely.
    RoomClosed,
}

/// Events that can be applied to the session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The attempt was started (or resumed) with budget left.
    AttemptStarted,
    /// A termination trigger fired. Only the first one is accepted, which is
    /// what makes the submission single-flight.
    Terminate(TerminationReason),
    /// The gateway confirmed the submission.
    SubmitConfirmed,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the state machine was in when the invalid event was received.
    pub from: SessionPhase,
    /// The event that cannot be applied from this phase.
    pub event: SessionEvent,
}

/// State machine implementing the session lifecycle.
///
/// Transitions are applied while holding the runtime's state write lock, so a
/// second terminate trigger always observes the phase left behind by the
/// first one and comes back as [`InvalidTransition`]. Callers treat that as
/// the losing side of the latch, not as a failure.
#[derive(Debug, Clone)]
pub struct SessionStateMachine {
    phase: SessionPhase,
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self {
            phase: SessionPhase::NotStarted,
        }
    }
}

impl SessionStateMachine {
    /// Create a new state machine in the not-started phase.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Apply `event`, moving the machine to the next phase.
    pub fn apply(&mut self, event: SessionEvent) -> Result<SessionPhase, InvalidTransition> {
        let next = self.compute_transition(event)?;
        self.phase = next;
        Ok(self.phase)
    }

    /// Compute the phase `event` leads to, if the transition is valid.
    fn compute_transition(&self, event: SessionEvent) -> Result<SessionPhase, InvalidTransition> {
        let next = match (self.phase, event) {
            (SessionPhase::NotStarted, SessionEvent::AttemptStarted) => SessionPhase::InProgress,
            // Resuming an attempt whose budget is already exhausted goes
            // straight to submitting, never through the answering phase.
            (SessionPhase::NotStarted, SessionEvent::Terminate(TerminationReason::Timeout)) => {
                SessionPhase::Submitting(TerminationReason::Timeout)
            }
            (SessionPhase::InProgress, SessionEvent::Terminate(reason)) => {
                SessionPhase::Submitting(reason)
            }
            (SessionPhase::Submitting(reason), SessionEvent::SubmitConfirmed) => {
                SessionPhase::Submitted(reason)
            }
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}
