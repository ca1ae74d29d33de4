//! Session lifecycle commands: begin/resume, the termination latch, and the
//! submit pipeline. This module is the only caller of submit-attempt.

use std::time::Duration;

use rand::Rng;
use time::OffsetDateTime;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    error::{SessionError, SessionResult},
    events::SessionNotice,
    gateway::SubmitOutcome,
    state::{
        SharedSession, TaskSet,
        state_machine::{SessionEvent, SessionPhase, TerminationReason},
    },
    tasks::TaskHandle,
};

use super::{autosave, countdown, room_watch};

/// Start the attempt, or resume it after a reload.
///
/// The remaining budget is derived from the server's start timestamp, never
/// restarted from the full duration. A resumed attempt whose budget is
/// already exhausted is submitted right away and never enters the answering
/// phase; the submission outcome is this function's return value.
pub async fn begin(session: &SharedSession) -> SessionResult<()> {
    let phase = session.phase().await;
    if phase != SessionPhase::NotStarted {
        return Err(SessionError::InvalidState(format!(
            "begin is only valid before the session starts (currently {phase:?})"
        )));
    }

    let exam = session.exam();
    let started = session
        .gateway()
        .start_attempt(exam.id, session.student_id())
        .await?;

    session.set_attempt(started.attempt_id).await;
    let restored = session.answers().seed(&started.saved_answers);
    if restored > 0 {
        info!(restored, "restored previously saved answers");
    }

    let remaining = remaining_budget(
        exam.budget_seconds(),
        started.started_at,
        OffsetDateTime::now_utc(),
    );
    session.publish_remaining(remaining);

    if remaining == 0 {
        info!(attempt_id = %started.attempt_id, "budget already exhausted at start; submitting");
        terminate(session, TerminationReason::Timeout).await?;
        return Ok(());
    }

    session.apply_event(SessionEvent::AttemptStarted).await?;
    info!(attempt_id = %started.attempt_id, remaining, "attempt started");

    session
        .install_tasks(TaskSet {
            countdown: Some(TaskHandle::spawn(countdown::run(session.clone(), remaining))),
            room_watch: Some(TaskHandle::spawn(room_watch::run(session.clone()))),
            autosave: Some(TaskHandle::spawn(autosave::run_background(session.clone()))),
        })
        .await;

    Ok(())
}

/// Record the student's choice for a question and schedule its save.
/// Ignored outside the answering phase.
pub async fn select_answer(
    session: &SharedSession,
    question_id: Uuid,
    choice_id: Uuid,
) -> SessionResult<()> {
    if session.phase().await != SessionPhase::InProgress {
        debug!(%question_id, "answer ignored; session is not in progress");
        return Ok(());
    }

    let question = session
        .exam()
        .question(question_id)
        .ok_or(SessionError::UnknownQuestion(question_id))?;
    if !question.has_choice(choice_id) {
        return Err(SessionError::UnknownChoice {
            question: question_id,
            choice: choice_id,
        });
    }

    session
        .answers()
        .select(question_id, choice_id)
        .ok_or(SessionError::UnknownQuestion(question_id))?;
    autosave::schedule_debounced_save(session, question_id);
    Ok(())
}

/// Flip the review flag for a question and schedule its save. Ignored
/// outside the answering phase.
pub async fn toggle_mark(session: &SharedSession, question_id: Uuid) -> SessionResult<()> {
    if session.phase().await != SessionPhase::InProgress {
        debug!(%question_id, "mark ignored; session is not in progress");
        return Ok(());
    }

    session
        .answers()
        .toggle_mark(question_id)
        .ok_or(SessionError::UnknownQuestion(question_id))?;
    autosave::schedule_debounced_save(session, question_id);
    Ok(())
}

/// Flush everything that is dirty and report how many records were written.
pub async fn request_manual_save(session: &SharedSession) -> SessionResult<usize> {
    let saved = autosave::flush_dirty(session).await?;
    session
        .notices()
        .publish(SessionNotice::AnswersSaved { count: saved });
    Ok(saved)
}

/// Student-initiated submission. A no-op when another trigger already won
/// the latch, except that a submission stuck after exhausted retries is
/// re-run.
pub async fn request_submit(session: &SharedSession) -> SessionResult<()> {
    if terminate(session, TerminationReason::Manual).await? {
        return Ok(());
    }

    match session.phase().await {
        SessionPhase::Submitting(_) => run_submit_pipeline(session).await,
        phase => {
            debug!(?phase, "manual submit ignored");
            Ok(())
        }
    }
}

/// Host unmount: cancel every background task and pending save, then make a
/// best-effort flush when the session never reached submission.
pub async fn shutdown(session: &SharedSession) {
    session.cancel_tasks().await;
    session.cancel_pending_saves();

    if session.phase().await == SessionPhase::InProgress {
        match autosave::flush_dirty(session).await {
            Ok(saved) if saved > 0 => info!(saved, "flushed answers during shutdown"),
            Ok(_) => {}
            Err(err) => warn!(error = %err, "shutdown flush incomplete"),
        }
    }
}

/// Single entry point into submission, shared by the manual, timeout, and
/// room-closed triggers. The first caller wins the latch and runs the submit
/// pipeline; every later caller is a no-op. Returns whether this call won.
pub(crate) async fn terminate(
    session: &SharedSession,
    reason: TerminationReason,
) -> SessionResult<bool> {
    match session.apply_event(SessionEvent::Terminate(reason)).await {
        Ok(phase) => info!(?reason, ?phase, "session terminating"),
        Err(invalid) => {
            debug!(?reason, from = ?invalid.from, "termination ignored; latch already taken");
            return Ok(false);
        }
    }

    // Repeating tasks observe the phase change and stop on their own.
    // Pending debounced saves are cancelled; the pipeline's flush covers
    // whatever they had not written yet.
    session.cancel_pending_saves();

    run_submit_pipeline(session).await?;
    Ok(true)
}

/// Flush-then-submit with bounded retries. Every attempt re-flushes the
/// records that are still dirty, so an answer caught in flight by the
/// termination trigger is persisted before the attempt is finalized.
async fn run_submit_pipeline(session: &SharedSession) -> SessionResult<()> {
    let Ok(_guard) = session.submit_gate().try_lock() else {
        debug!("submit pipeline already running");
        return Ok(());
    };

    let attempt_id = session
        .attempt_id()
        .await
        .ok_or(SessionError::MissingAttempt)?;
    let max_attempts = session.tuning().submit_max_attempts;
    let mut backoff = session.tuning().submit_initial_backoff;

    for attempt in 1..=max_attempts {
        match submit_once(session, attempt_id).await {
            Ok(outcome) => {
                if outcome == SubmitOutcome::AlreadySubmitted {
                    debug!(%attempt_id, "attempt was already finalized server-side");
                }
                let phase = session.apply_event(SessionEvent::SubmitConfirmed).await?;
                if let Some(reason) = phase.termination_reason() {
                    session.notices().publish(SessionNotice::Closed { reason });
                }
                info!(%attempt_id, "attempt submitted");
                return Ok(());
            }
            Err(err) => {
                warn!(%attempt_id, attempt, error = %err, "submit attempt failed");
                if attempt == max_attempts {
                    break;
                }
                sleep(with_jitter(backoff)).await;
                backoff = (backoff * 2).min(session.tuning().submit_max_backoff);
            }
        }
    }

    // The phase stays Submitting: the student must never be told the exam
    // was submitted when it was not. A later manual submit re-runs the
    // pipeline without re-opening the latch.
    session.notices().publish(SessionNotice::SubmitFailed {
        message: format!("submission failed after {max_attempts} attempt(s)"),
    });
    Err(SessionError::SubmitExhausted {
        attempts: max_attempts,
    })
}

/// One pipeline attempt: flush whatever is still dirty, then submit.
async fn submit_once(session: &SharedSession, attempt_id: Uuid) -> SessionResult<SubmitOutcome> {
    autosave::flush_dirty(session).await?;
    Ok(session.gateway().submit_attempt(attempt_id).await?)
}

/// Spread retries out a little so clients that failed together do not all
/// come back in the same instant.
fn with_jitter(base: Duration) -> Duration {
    let spread = (base.as_millis() as u64 / 4).max(1);
    base + Duration::from_millis(rand::rng().random_range(0..=spread))
}

/// Remaining budget in seconds given the authoritative start timestamp.
pub fn remaining_budget(
    budget_seconds: u64,
    started_at: OffsetDateTime,
    now: OffsetDateTime,
) -> u64 {
    let elapsed = (now - started_at).whole_seconds();
    if elapsed <= 0 {
        return budget_seconds;
    }
    budget_seconds.saturating_sub(elapsed as u64)
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        io,
        sync::{
            Arc, Mutex as StdMutex,
            atomic::{AtomicBool, AtomicU32, Ordering},
        },
    };

    use futures::future::BoxFuture;
    use uuid::Uuid;

    use crate::{
        config::SessionTuning,
        gateway::{
            AnswerUpsert, ExamGateway, RoomStatus, SavedAnswer, StartedAttempt, SubmitOutcome,
            error::{GatewayError, GatewayResult},
        },
        state::{
            SessionRuntime,
            exam::{Choice, ExamDefinition, Question},
        },
    };

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum GatewayCall {
        Save(Uuid, Option<Uuid>),
        Submit,
    }

    #[derive(Default)]
    struct FakeInner {
        attempt_id: Uuid,
        started_at: StdMutex<Option<OffsetDateTime>>,
        resume_answers: StdMutex<Vec<SavedAnswer>>,
        calls: StdMutex<Vec<GatewayCall>>,
        failing_starts: AtomicU32,
        failing_saves: AtomicU32,
        failing_submits: AtomicU32,
        failing_polls: AtomicU32,
        room_script: StdMutex<VecDeque<RoomStatus>>,
        room_polls: AtomicU32,
        submitted: AtomicBool,
    }

    /// Scriptable in-memory gateway. Cloning shares the same script and call
    /// log, mirroring how the HTTP client shares its connection pool.
    #[derive(Clone)]
    struct FakeGateway {
        inner: Arc<FakeInner>,
    }

    impl FakeGateway {
        fn new(started_at: OffsetDateTime) -> Self {
            let inner = FakeInner {
                attempt_id: Uuid::new_v4(),
                started_at: StdMutex::new(Some(started_at)),
                ..FakeInner::default()
            };
            Self {
                inner: Arc::new(inner),
            }
        }

        fn started_now() -> Self {
            Self::new(OffsetDateTime::now_utc())
        }

        fn with_resume_answers(self, answers: Vec<SavedAnswer>) -> Self {
            *self.inner.resume_answers.lock().unwrap() = answers;
            self
        }

        fn fail_next_starts(&self, count: u32) {
            self.inner.failing_starts.store(count, Ordering::SeqCst);
        }

        fn fail_next_saves(&self, count: u32) {
            self.inner.failing_saves.store(count, Ordering::SeqCst);
        }

        fn fail_next_polls(&self, count: u32) {
            self.inner.failing_polls.store(count, Ordering::SeqCst);
        }

        fn fail_next_submits(&self, count: u32) {
            self.inner.failing_submits.store(count, Ordering::SeqCst);
        }

        fn script_room(&self, statuses: &[RoomStatus]) {
            *self.inner.room_script.lock().unwrap() = statuses.iter().copied().collect();
        }

        fn calls(&self) -> Vec<GatewayCall> {
            self.inner.calls.lock().unwrap().clone()
        }

        fn save_count(&self) -> usize {
            self.calls()
                .iter()
                .filter(|call| matches!(call, GatewayCall::Save(..)))
                .count()
        }

        fn submit_count(&self) -> usize {
            self.calls()
                .iter()
                .filter(|call| matches!(call, GatewayCall::Submit))
                .count()
        }

        fn room_polls(&self) -> u32 {
            self.inner.room_polls.load(Ordering::SeqCst)
        }
    }

    fn take_budget(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn outage(operation: &str) -> GatewayError {
        GatewayError::unavailable(
            format!("{operation} unreachable"),
            io::Error::other("scripted outage"),
        )
    }

    impl ExamGateway for FakeGateway {
        fn start_attempt(
            &self,
            _exam_id: Uuid,
            _student_id: Uuid,
        ) -> BoxFuture<'static, GatewayResult<StartedAttempt>> {
            let inner = self.inner.clone();
            Box::pin(async move {
                if take_budget(&inner.failing_starts) {
                    return Err(outage("start-attempt"));
                }
                Ok(StartedAttempt {
                    attempt_id: inner.attempt_id,
                    started_at: inner.started_at.lock().unwrap().unwrap(),
                    saved_answers: inner.resume_answers.lock().unwrap().clone(),
                })
            })
        }

        fn save_answer(
            &self,
            _attempt_id: Uuid,
            upsert: AnswerUpsert,
        ) -> BoxFuture<'static, GatewayResult<()>> {
            let inner = self.inner.clone();
            Box::pin(async move {
                inner
                    .calls
                    .lock()
                    .unwrap()
                    .push(GatewayCall::Save(upsert.question_id, upsert.selected_choice));
                if take_budget(&inner.failing_saves) {
                    return Err(outage("save-answer"));
                }
                Ok(())
            })
        }

        fn room_status(&self, _room_id: Uuid) -> BoxFuture<'static, GatewayResult<RoomStatus>> {
            let inner = self.inner.clone();
            Box::pin(async move {
                inner.room_polls.fetch_add(1, Ordering::SeqCst);
                if take_budget(&inner.failing_polls) {
                    return Err(outage("poll-room-status"));
                }
                let status = inner
                    .room_script
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or(RoomStatus::Open);
                Ok(status)
            })
        }

        fn submit_attempt(
            &self,
            _attempt_id: Uuid,
        ) -> BoxFuture<'static, GatewayResult<SubmitOutcome>> {
            let inner = self.inner.clone();
            Box::pin(async move {
                inner.calls.lock().unwrap().push(GatewayCall::Submit);
                if take_budget(&inner.failing_submits) {
                    return Err(outage("submit-attempt"));
                }
                if inner.submitted.swap(true, Ordering::SeqCst) {
                    Ok(SubmitOutcome::AlreadySubmitted)
                } else {
                    Ok(SubmitOutcome::Acknowledged)
                }
            })
        }
    }

    /// Opt-in log output for debugging test runs (`RUST_LOG=debug`).
    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }

    fn exam(duration_minutes: u64, question_count: usize) -> ExamDefinition {
        let questions = (0..question_count)
            .map(|index| Question {
                id: Uuid::new_v4(),
                prompt: format!("question {index}"),
                choices: vec![
                    Choice {
                        id: Uuid::new_v4(),
                        text: "first".into(),
                    },
                    Choice {
                        id: Uuid::new_v4(),
                        text: "second".into(),
                    },
                ],
            })
            .collect();
        ExamDefinition::new(Uuid::new_v4(), duration_minutes, Uuid::new_v4(), questions).unwrap()
    }

    fn runtime(fake: &FakeGateway, exam: ExamDefinition) -> SharedSession {
        SessionRuntime::new(
            Arc::new(fake.clone()),
            exam,
            Uuid::new_v4(),
            SessionTuning::default(),
        )
    }

    fn nth_question(session: &SharedSession, index: usize) -> (Uuid, Uuid) {
        let question = session
            .exam()
            .questions
            .get_index(index)
            .map(|(_, q)| q.clone())
            .unwrap();
        (question.id, question.choices[0].id)
    }

    async fn wait_for_submitted(session: &SharedSession, within_secs: u64) -> SessionPhase {
        let mut rx = session.watch_phase();
        tokio::time::timeout(Duration::from_secs(within_secs), async {
            loop {
                let phase = *rx.borrow();
                if matches!(phase, SessionPhase::Submitted(_)) {
                    return phase;
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .expect("session did not reach the submitted phase in time")
    }

    #[tokio::test(start_paused = true)]
    async fn begin_resumes_with_server_anchored_budget() {
        let started_at = OffsetDateTime::now_utc() - time::Duration::seconds(600);
        let fake = FakeGateway::new(started_at);
        let session = runtime(&fake, exam(30, 2));

        begin(&session).await.unwrap();

        assert_eq!(session.phase().await, SessionPhase::InProgress);
        let remaining = *session.watch_remaining().borrow();
        assert!(
            (1199..=1200).contains(&remaining),
            "expected a resumed budget near 1200s, got {remaining}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn begin_restores_previously_saved_answers() {
        let (question_id, choice_id);
        let exam = exam(30, 2);
        {
            let first = exam.questions.get_index(0).map(|(_, q)| q.clone()).unwrap();
            question_id = first.id;
            choice_id = first.choices[1].id;
        }
        let fake = FakeGateway::started_now().with_resume_answers(vec![SavedAnswer {
            question_id,
            selected_choice: Some(choice_id),
            marked: true,
        }]);
        let session = runtime(&fake, exam);

        begin(&session).await.unwrap();

        let record = session.answers().get(question_id).unwrap();
        assert_eq!(record.selected_choice, Some(choice_id));
        assert!(record.marked);
        assert!(!record.dirty);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_resume_submits_without_entering_in_progress() {
        let started_at = OffsetDateTime::now_utc() - time::Duration::seconds(1805);
        let fake = FakeGateway::new(started_at);
        let session = runtime(&fake, exam(30, 1));

        begin(&session).await.unwrap();

        assert_eq!(
            session.phase().await,
            SessionPhase::Submitted(TerminationReason::Timeout)
        );
        assert_eq!(fake.submit_count(), 1);
        // The answering phase was never entered, so no poller ever ran.
        assert_eq!(fake.room_polls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn begin_twice_is_rejected() {
        let fake = FakeGateway::started_now();
        let session = runtime(&fake, exam(30, 1));

        begin(&session).await.unwrap();
        assert!(matches!(
            begin(&session).await,
            Err(SessionError::InvalidState(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_expiry_submits_exactly_once_and_warns_once() {
        let fake = FakeGateway::started_now();
        let session = runtime(&fake, exam(2, 1));
        let mut notices = session.notices().subscribe();

        begin(&session).await.unwrap();
        let phase = wait_for_submitted(&session, 300).await;

        assert_eq!(phase, SessionPhase::Submitted(TerminationReason::Timeout));
        assert_eq!(fake.submit_count(), 1);
        assert_eq!(*session.watch_remaining().borrow(), 0);

        let mut warnings = 0;
        while let Ok(notice) = notices.try_recv() {
            if matches!(
                notice,
                SessionNotice::TimeWarning {
                    remaining_seconds: 60
                }
            ) {
                warnings += 1;
            }
        }
        assert_eq!(warnings, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_triggers_submit_at_most_once() {
        init_tracing();
        let fake = FakeGateway::started_now();
        let session = runtime(&fake, exam(30, 1));
        begin(&session).await.unwrap();

        let (a, b, c) = tokio::join!(
            terminate(&session, TerminationReason::Manual),
            terminate(&session, TerminationReason::Timeout),
            terminate(&session, TerminationReason::RoomClosed),
        );

        let winners = [a.unwrap(), b.unwrap(), c.unwrap()]
            .iter()
            .filter(|won| **won)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(fake.submit_count(), 1);
        assert!(matches!(session.phase().await, SessionPhase::Submitted(_)));

        // A late manual click stays a no-op.
        request_submit(&session).await.unwrap();
        assert_eq!(fake.submit_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_submit_flushes_dirty_answers_first() {
        let fake = FakeGateway::started_now();
        let session = runtime(&fake, exam(30, 2));
        begin(&session).await.unwrap();
        let (question_id, choice_id) = nth_question(&session, 0);

        // The debounced save has not fired yet when the submit arrives.
        select_answer(&session, question_id, choice_id).await.unwrap();
        request_submit(&session).await.unwrap();

        let calls = fake.calls();
        assert_eq!(
            calls,
            vec![
                GatewayCall::Save(question_id, Some(choice_id)),
                GatewayCall::Submit,
            ]
        );
        assert_eq!(session.answers().dirty_count(), 0);
        assert_eq!(
            session.phase().await,
            SessionPhase::Submitted(TerminationReason::Manual)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_immediate_save_is_retried_by_background_flush() {
        let fake = FakeGateway::started_now();
        fake.fail_next_saves(1);
        let session = runtime(&fake, exam(30, 1));
        begin(&session).await.unwrap();
        let (question_id, choice_id) = nth_question(&session, 0);

        select_answer(&session, question_id, choice_id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;

        assert_eq!(fake.save_count(), 1);
        assert_eq!(session.answers().dirty_count(), 1);

        tokio::time::sleep(Duration::from_secs(7)).await;

        assert_eq!(fake.save_count(), 2);
        assert_eq!(session.answers().dirty_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn newer_edit_replaces_the_pending_debounced_save() {
        let fake = FakeGateway::started_now();
        let session = runtime(&fake, exam(30, 1));
        begin(&session).await.unwrap();

        let question = session
            .exam()
            .questions
            .get_index(0)
            .map(|(_, q)| q.clone())
            .unwrap();
        let first = question.choices[0].id;
        let second = question.choices[1].id;

        select_answer(&session, question.id, first).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        select_answer(&session, question.id, second).await.unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;

        assert_eq!(
            fake.calls(),
            vec![GatewayCall::Save(question.id, Some(second))]
        );
        assert_eq!(session.answers().dirty_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn submit_retries_with_backoff_until_success() {
        let fake = FakeGateway::started_now();
        fake.fail_next_submits(1);
        let session = runtime(&fake, exam(30, 1));
        begin(&session).await.unwrap();

        request_submit(&session).await.unwrap();

        assert_eq!(fake.submit_count(), 2);
        assert_eq!(
            session.phase().await,
            SessionPhase::Submitted(TerminationReason::Manual)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_submit_stays_submitting_and_can_be_retried() {
        let fake = FakeGateway::started_now();
        fake.fail_next_submits(10);
        let session = runtime(&fake, exam(30, 1));
        let mut notices = session.notices().subscribe();
        begin(&session).await.unwrap();

        let err = request_submit(&session).await.unwrap_err();
        assert!(matches!(err, SessionError::SubmitExhausted { attempts: 3 }));
        assert_eq!(fake.submit_count(), 3);
        assert_eq!(
            session.phase().await,
            SessionPhase::Submitting(TerminationReason::Manual)
        );

        let mut submit_failed_seen = false;
        while let Ok(notice) = notices.try_recv() {
            if matches!(notice, SessionNotice::SubmitFailed { .. }) {
                submit_failed_seen = true;
            }
        }
        assert!(submit_failed_seen);

        // The student retries once the API is reachable again; the latch
        // stays closed the whole time.
        fake.fail_next_submits(0);
        request_submit(&session).await.unwrap();
        assert_eq!(fake.submit_count(), 4);
        assert_eq!(
            session.phase().await,
            SessionPhase::Submitted(TerminationReason::Manual)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn room_closure_submits_once_with_answers_persisted() {
        init_tracing();
        let fake = FakeGateway::started_now();
        fake.script_room(&[
            RoomStatus::Open,
            RoomStatus::Open,
            RoomStatus::Open,
            RoomStatus::Closed,
        ]);
        let session = runtime(&fake, exam(30, 2));
        begin(&session).await.unwrap();
        let (question_id, choice_id) = nth_question(&session, 0);

        // Student answers a question mid-session; the room closes at the
        // fourth poll (15s in).
        tokio::time::sleep(Duration::from_secs(8)).await;
        select_answer(&session, question_id, choice_id).await.unwrap();

        let phase = wait_for_submitted(&session, 60).await;
        assert_eq!(phase, SessionPhase::Submitted(TerminationReason::RoomClosed));
        assert_eq!(fake.submit_count(), 1);

        let calls = fake.calls();
        let save_index = calls
            .iter()
            .position(|call| matches!(call, GatewayCall::Save(id, _) if *id == question_id))
            .expect("the answer was persisted");
        let submit_index = calls
            .iter()
            .position(|call| matches!(call, GatewayCall::Submit))
            .unwrap();
        assert!(save_index < submit_index);

        // A manual click arriving after the closure is a no-op.
        request_submit(&session).await.unwrap();
        assert_eq!(fake.submit_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_failures_do_not_terminate_the_session() {
        let fake = FakeGateway::started_now();
        fake.fail_next_polls(2);
        let session = runtime(&fake, exam(30, 1));
        begin(&session).await.unwrap();

        tokio::time::sleep(Duration::from_secs(12)).await;
        assert!(fake.room_polls() >= 3);
        assert_eq!(session.phase().await, SessionPhase::InProgress);
        assert_eq!(fake.submit_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_start_leaves_the_session_not_started_and_retryable() {
        let fake = FakeGateway::started_now();
        fake.fail_next_starts(1);
        let session = runtime(&fake, exam(30, 1));

        assert!(matches!(
            begin(&session).await,
            Err(SessionError::Gateway(_))
        ));
        assert_eq!(session.phase().await, SessionPhase::NotStarted);

        begin(&session).await.unwrap();
        assert_eq!(session.phase().await, SessionPhase::InProgress);
    }

    #[tokio::test(start_paused = true)]
    async fn commands_are_ignored_before_the_session_starts() {
        let fake = FakeGateway::started_now();
        let session = runtime(&fake, exam(30, 1));
        let (question_id, choice_id) = nth_question(&session, 0);

        select_answer(&session, question_id, choice_id).await.unwrap();
        toggle_mark(&session, question_id).await.unwrap();

        assert_eq!(session.answers().dirty_count(), 0);
        assert_eq!(fake.save_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn foreign_choices_and_unknown_questions_are_rejected() {
        let fake = FakeGateway::started_now();
        let session = runtime(&fake, exam(30, 1));
        begin(&session).await.unwrap();
        let (question_id, _) = nth_question(&session, 0);

        assert!(matches!(
            select_answer(&session, question_id, Uuid::new_v4()).await,
            Err(SessionError::UnknownChoice { .. })
        ));
        assert!(matches!(
            select_answer(&session, Uuid::new_v4(), Uuid::new_v4()).await,
            Err(SessionError::UnknownQuestion(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn manual_save_flushes_everything_and_reports_count() {
        let fake = FakeGateway::started_now();
        let session = runtime(&fake, exam(30, 2));
        begin(&session).await.unwrap();
        let (first_question, first_choice) = nth_question(&session, 0);
        let (second_question, _) = nth_question(&session, 1);

        select_answer(&session, first_question, first_choice).await.unwrap();
        toggle_mark(&session, second_question).await.unwrap();

        let saved = request_manual_save(&session).await.unwrap();
        assert_eq!(saved, 2);
        assert_eq!(session.answers().dirty_count(), 0);
        assert!(session.watch_last_saved().borrow().is_some());
        assert!(!*session.watch_saving().borrow());
    }

    #[tokio::test(start_paused = true)]
    async fn manual_save_surfaces_failures_and_keeps_records_dirty() {
        let fake = FakeGateway::started_now();
        fake.fail_next_saves(10);
        let session = runtime(&fake, exam(30, 1));
        begin(&session).await.unwrap();
        let (question_id, choice_id) = nth_question(&session, 0);

        select_answer(&session, question_id, choice_id).await.unwrap();
        let err = request_manual_save(&session).await.unwrap_err();

        assert!(matches!(err, SessionError::SaveIncomplete { failed: 1 }));
        assert_eq!(session.answers().dirty_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_makes_a_best_effort_flush() {
        let fake = FakeGateway::started_now();
        let session = runtime(&fake, exam(30, 1));
        begin(&session).await.unwrap();
        let (question_id, choice_id) = nth_question(&session, 0);

        select_answer(&session, question_id, choice_id).await.unwrap();
        shutdown(&session).await;

        assert_eq!(fake.save_count(), 1);
        assert_eq!(session.answers().dirty_count(), 0);
        assert_eq!(fake.submit_count(), 0);
    }

    #[test]
    fn remaining_budget_subtracts_elapsed_seconds() {
        let start = OffsetDateTime::now_utc();
        assert_eq!(
            remaining_budget(1800, start, start + time::Duration::seconds(600)),
            1200
        );
        assert_eq!(
            remaining_budget(1800, start, start + time::Duration::seconds(1800)),
            0
        );
        assert_eq!(
            remaining_budget(1800, start, start + time::Duration::seconds(7200)),
            0
        );
    }

    #[test]
    fn remaining_budget_tolerates_a_server_clock_ahead_of_ours() {
        let start = OffsetDateTime::now_utc();
        assert_eq!(
            remaining_budget(1800, start, start - time::Duration::seconds(30)),
            1800
        );
    }
}
