//! Wire shapes exchanged with the exam API. The response to start-attempt
//! deserializes directly into [`crate::gateway::StartedAttempt`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::gateway::{RoomStatus, SubmitOutcome};

/// Body of `POST attempts/start`.
#[derive(Debug, Serialize)]
pub(super) struct StartAttemptRequest {
    pub exam_id: Uuid,
    pub student_id: Uuid,
}

/// Body of `GET rooms/{id}/status`.
#[derive(Debug, Deserialize)]
pub(super) struct RoomStatusResponse {
    pub status: RoomStatus,
}

/// Body of `POST attempts/{id}/submit`.
#[derive(Debug, Deserialize)]
pub(super) struct SubmitResponse {
    pub status: SubmitState,
}

/// Submission state as spelled by the API.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(super) enum SubmitState {
    Submitted,
    AlreadySubmitted,
}

impl From<SubmitState> for SubmitOutcome {
    fn from(state: SubmitState) -> Self {
        match state {
            SubmitState::Submitted => SubmitOutcome::Acknowledged,
            SubmitState::AlreadySubmitted => SubmitOutcome::AlreadySubmitted,
        }
    }
}
