//! Contract with the remote exam API that owns attempts, answers, and room
//! state. The engine only ever talks to this trait; tests inject fakes.

pub mod error;
#[cfg(feature = "http-gateway")]
pub mod http;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use self::error::GatewayResult;

/// Server-side view of an attempt returned by start-attempt. Starting an
/// already-started attempt returns the same data again (resume).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartedAttempt {
    /// Identifier of this student's attempt at this exam.
    pub attempt_id: Uuid,
    /// Server clock timestamp the attempt started at. The client never sets
    /// this; it is the authoritative anchor for the remaining budget.
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    /// Answers persisted by an earlier run of the same attempt.
    #[serde(default)]
    pub saved_answers: Vec<SavedAnswer>,
}

/// One previously persisted answer, replayed to the client on resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedAnswer {
    /// Question the answer belongs to.
    pub question_id: Uuid,
    /// Choice that was selected, if any.
    pub selected_choice: Option<Uuid>,
    /// Whether the question was flagged for review.
    pub marked: bool,
}

/// Idempotent answer write, keyed server-side by (attempt, question).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerUpsert {
    /// Question the write targets.
    pub question_id: Uuid,
    /// Choice to store; `None` clears the selection (e.g. mark-only records).
    pub selected_choice: Option<Uuid>,
    /// Review flag to store.
    pub marked: bool,
}

/// Room state reported by the status poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    /// Room exists but the sitting has not opened yet.
    Waiting,
    /// The sitting is open; sessions may run.
    Open,
    /// The sitting was closed remotely; running sessions must submit.
    Closed,
}

/// Server response to submit-attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The attempt was finalized by this call.
    Acknowledged,
    /// The attempt had already been finalized; not an error.
    AlreadySubmitted,
}

/// Abstraction over the remote exam API.
pub trait ExamGateway: Send + Sync {
    /// Start the student's attempt at the exam, or resume the existing one.
    fn start_attempt(
        &self,
        exam_id: Uuid,
        student_id: Uuid,
    ) -> BoxFuture<'static, GatewayResult<StartedAttempt>>;

    /// Upsert one answer. Replaying the same write is always safe.
    fn save_answer(
        &self,
        attempt_id: Uuid,
        upsert: AnswerUpsert,
    ) -> BoxFuture<'static, GatewayResult<()>>;

    /// Read the current status of a room. Side-effect free.
    fn room_status(&self, room_id: Uuid) -> BoxFuture<'static, GatewayResult<RoomStatus>>;

    /// Finalize the attempt. Repeated calls after success report
    /// [`SubmitOutcome::AlreadySubmitted`] rather than an error.
    fn submit_attempt(
        &self,
        attempt_id: Uuid,
    ) -> BoxFuture<'static, GatewayResult<SubmitOutcome>>;
}
