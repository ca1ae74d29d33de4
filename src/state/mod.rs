//! Shared session runtime wiring the state machine, answer sheet, and
//! observables together.

pub mod answers;
pub mod exam;
pub mod state_machine;

use std::sync::Arc;

use dashmap::DashMap;
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock, watch};
use uuid::Uuid;

use crate::{
    config::SessionTuning,
    events::{NoticeHub, SessionNotice},
    gateway::ExamGateway,
    state::{
        answers::{AnswerRecord, AnswerStore},
        exam::ExamDefinition,
        state_machine::{InvalidTransition, SessionEvent, SessionPhase, SessionStateMachine},
    },
    tasks::TaskHandle,
};

/// Shared handle to one student's session runtime.
pub type SharedSession = Arc<SessionRuntime>;

/// Capacity of the notice broadcast channel.
const NOTICE_CAPACITY: usize = 16;

/// Handles of the repeating tasks that live while the session is in progress.
#[derive(Debug, Default)]
pub(crate) struct TaskSet {
    pub countdown: Option<TaskHandle>,
    pub room_watch: Option<TaskHandle>,
    pub autosave: Option<TaskHandle>,
}

impl TaskSet {
    fn cancel_all(&mut self) {
        for handle in [
            self.countdown.take(),
            self.room_watch.take(),
            self.autosave.take(),
        ]
        .into_iter()
        .flatten()
        {
            handle.cancel();
        }
    }
}

/// Central state for one attempt: the injected gateway, the immutable exam
/// content, the phase machine, the answer sheet, and the observables exposed
/// to the hosting layer.
pub struct SessionRuntime {
    gateway: Arc<dyn ExamGateway>,
    exam: ExamDefinition,
    student_id: Uuid,
    tuning: SessionTuning,
    machine: RwLock<SessionStateMachine>,
    answers: AnswerStore,
    attempt_id: RwLock<Option<Uuid>>,
    notices: NoticeHub,
    phase_tx: watch::Sender<SessionPhase>,
    remaining_tx: watch::Sender<u64>,
    saving_tx: watch::Sender<bool>,
    last_saved_tx: watch::Sender<Option<OffsetDateTime>>,
    tasks: Mutex<TaskSet>,
    pending_saves: DashMap<Uuid, TaskHandle>,
    save_locks: DashMap<Uuid, Arc<Mutex<()>>>,
    submit_gate: Mutex<()>,
}

impl SessionRuntime {
    /// Construct a runtime wrapped in an [`Arc`] so tasks can hold it cheaply.
    ///
    /// Requires an already-resolved student identity; a session for an
    /// unresolved student cannot be represented.
    pub fn new(
        gateway: Arc<dyn ExamGateway>,
        exam: ExamDefinition,
        student_id: Uuid,
        tuning: SessionTuning,
    ) -> SharedSession {
        let answers = AnswerStore::new(exam.questions.keys().copied());
        let (phase_tx, _rx) = watch::channel(SessionPhase::NotStarted);
        let (remaining_tx, _rx) = watch::channel(exam.budget_seconds());
        let (saving_tx, _rx) = watch::channel(false);
        let (last_saved_tx, _rx) = watch::channel(None);

        Arc::new(Self {
            gateway,
            exam,
            student_id,
            tuning,
            machine: RwLock::new(SessionStateMachine::new()),
            answers,
            attempt_id: RwLock::new(None),
            notices: NoticeHub::new(NOTICE_CAPACITY),
            phase_tx,
            remaining_tx,
            saving_tx,
            last_saved_tx,
            tasks: Mutex::new(TaskSet::default()),
            pending_saves: DashMap::new(),
            save_locks: DashMap::new(),
            submit_gate: Mutex::new(()),
        })
    }

    /// Handle to the injected gateway.
    pub fn gateway(&self) -> Arc<dyn ExamGateway> {
        self.gateway.clone()
    }

    /// The exam being taken.
    pub fn exam(&self) -> &ExamDefinition {
        &self.exam
    }

    /// The student taking the exam.
    pub fn student_id(&self) -> Uuid {
        self.student_id
    }

    /// Tuning values this runtime was built with.
    pub fn tuning(&self) -> &SessionTuning {
        &self.tuning
    }

    /// The answer sheet.
    pub fn answers(&self) -> &AnswerStore {
        &self.answers
    }

    /// Notice hub for the hosting layer to subscribe to.
    pub fn notices(&self) -> &NoticeHub {
        &self.notices
    }

    /// Snapshot the current phase.
    pub async fn phase(&self) -> SessionPhase {
        self.machine.read().await.phase()
    }

    /// Subscribe to phase changes.
    pub fn watch_phase(&self) -> watch::Receiver<SessionPhase> {
        self.phase_tx.subscribe()
    }

    /// Subscribe to the remaining budget, in seconds.
    pub fn watch_remaining(&self) -> watch::Receiver<u64> {
        self.remaining_tx.subscribe()
    }

    /// Subscribe to the saving-in-flight flag.
    pub fn watch_saving(&self) -> watch::Receiver<bool> {
        self.saving_tx.subscribe()
    }

    /// Subscribe to the timestamp of the last confirmed save.
    pub fn watch_last_saved(&self) -> watch::Receiver<Option<OffsetDateTime>> {
        self.last_saved_tx.subscribe()
    }

    /// Identifier of the started attempt, once start-attempt succeeded.
    pub async fn attempt_id(&self) -> Option<Uuid> {
        *self.attempt_id.read().await
    }

    /// Answer records in the exam's presentation order.
    pub fn answer_sheet(&self) -> Vec<AnswerRecord> {
        self.exam
            .questions
            .keys()
            .filter_map(|id| self.answers.get(*id))
            .collect()
    }

    pub(crate) async fn set_attempt(&self, attempt_id: Uuid) {
        let mut slot = self.attempt_id.write().await;
        *slot = Some(attempt_id);
    }

    /// Apply a state machine event and broadcast the resulting phase. The
    /// write lock makes competing terminate triggers serialize; the loser
    /// receives [`InvalidTransition`].
    pub(crate) async fn apply_event(
        &self,
        event: SessionEvent,
    ) -> Result<SessionPhase, InvalidTransition> {
        let next = {
            let mut machine = self.machine.write().await;
            machine.apply(event)?
        };
        let _ = self.phase_tx.send(next);
        self.notices
            .publish(SessionNotice::PhaseChanged { phase: next });
        Ok(next)
    }

    pub(crate) fn publish_remaining(&self, seconds: u64) {
        let _ = self.remaining_tx.send(seconds);
    }

    pub(crate) fn set_saving(&self, saving: bool) {
        let _ = self.saving_tx.send(saving);
    }

    pub(crate) fn mark_saved(&self, at: OffsetDateTime) {
        let _ = self.last_saved_tx.send(Some(at));
    }

    pub(crate) async fn install_tasks(&self, set: TaskSet) {
        let mut tasks = self.tasks.lock().await;
        tasks.cancel_all();
        *tasks = set;
    }

    pub(crate) async fn cancel_tasks(&self) {
        let mut tasks = self.tasks.lock().await;
        tasks.cancel_all();
    }

    /// Replace any pending debounced save for `question_id` with `handle`.
    pub(crate) fn schedule_pending_save(&self, question_id: Uuid, handle: TaskHandle) {
        if let Some(previous) = self.pending_saves.insert(question_id, handle) {
            previous.cancel();
        }
    }

    /// Cancel every pending debounced save.
    pub(crate) fn cancel_pending_saves(&self) {
        self.pending_saves.clear();
    }

    /// Per-question lock serializing saves for the same question.
    pub(crate) fn save_lock(&self, question_id: Uuid) -> Arc<Mutex<()>> {
        self.save_locks
            .entry(question_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Gate ensuring a single submit pipeline runs at a time.
    pub(crate) fn submit_gate(&self) -> &Mutex<()> {
        &self.submit_gate
    }
}
