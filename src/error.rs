use thiserror::Error;
use uuid::Uuid;

use crate::{gateway::error::GatewayError, state::state_machine::InvalidTransition};

/// Result alias for session engine operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors surfaced by the session command surface.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The remote exam API failed; carried out of begin/save/submit paths.
    #[error("exam API failure")]
    Gateway(#[from] GatewayError),
    /// A command arrived in a phase that does not accept it.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// The question id is not part of this exam.
    #[error("unknown question `{0}`")]
    UnknownQuestion(Uuid),
    /// The choice does not belong to the question it was selected for.
    #[error("choice `{choice}` does not belong to question `{question}`")]
    UnknownChoice {
        /// Question the selection was aimed at.
        question: Uuid,
        /// Choice id that is not among the question's choices.
        choice: Uuid,
    },
    /// No started attempt exists yet for this session.
    #[error("no started attempt for this session")]
    MissingAttempt,
    /// A manual flush finished with one or more records still unsaved.
    #[error("{failed} answer(s) could not be saved")]
    SaveIncomplete {
        /// Number of records that are still dirty after the flush.
        failed: usize,
    },
    /// The submit pipeline exhausted its retry budget.
    #[error("submission failed after {attempts} attempt(s)")]
    SubmitExhausted {
        /// Number of pipeline attempts that were made.
        attempts: u32,
    },
}

impl From<InvalidTransition> for SessionError {
    fn from(err: InvalidTransition) -> Self {
        SessionError::InvalidState(err.to_string())
    }
}
