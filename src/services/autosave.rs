//! Persistence scheduler draining dirty answers without blocking the student.
//!
//! Three paths feed the same per-question save primitive: a debounced save
//! right after each edit, a periodic background flush that retries anything
//! the immediate path lost, and a manual flush the student can trigger.

use futures::future::join_all;
use time::OffsetDateTime;
use tokio::time::{Instant, interval_at, sleep};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    error::{SessionError, SessionResult},
    state::{SharedSession, state_machine::SessionPhase},
    tasks::TaskHandle,
};

/// Background flush loop. Runs until the session leaves the answering phase.
pub(crate) async fn run_background(session: SharedSession) {
    let every = session.tuning().autosave_interval;
    let mut phase_rx = session.watch_phase();
    let mut ticker = interval_at(Instant::now() + every, every);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match flush_dirty(&session).await {
                    Ok(saved) if saved > 0 => debug!(saved, "background flush persisted answers"),
                    Ok(_) => {}
                    Err(err) => warn!(error = %err, "background flush incomplete; retrying at next interval"),
                }
            }
            changed = phase_rx.changed() => {
                if changed.is_err() || !matches!(*phase_rx.borrow(), SessionPhase::InProgress) {
                    break;
                }
            }
        }
    }
}

/// Schedule the debounced save that follows an edit. A newer edit within the
/// window replaces the pending save, so only the freshest value is sent.
pub(crate) fn schedule_debounced_save(session: &SharedSession, question_id: Uuid) {
    let delay = session.tuning().debounce_delay;
    let task_session = session.clone();

    let handle = TaskHandle::spawn(async move {
        sleep(delay).await;
        if let Err(err) = save_question(&task_session, question_id).await {
            warn!(
                %question_id,
                error = %err,
                "debounced save failed; background flush will retry"
            );
        }
    });

    session.schedule_pending_save(question_id, handle);
}

/// Flush every currently dirty record once, concurrently across questions.
/// Returns how many records were persisted; failed records stay dirty.
pub(crate) async fn flush_dirty(session: &SharedSession) -> SessionResult<usize> {
    let dirty = session.answers().snapshot_dirty();
    if dirty.is_empty() {
        return Ok(0);
    }

    session.set_saving(true);
    let results = join_all(
        dirty
            .iter()
            .map(|record| save_question(session, record.question_id)),
    )
    .await;
    session.set_saving(false);

    let mut saved = 0;
    let mut failed = 0;
    for result in results {
        match result {
            Ok(true) => saved += 1,
            Ok(false) => {}
            Err(_) => failed += 1,
        }
    }

    if failed > 0 {
        return Err(SessionError::SaveIncomplete { failed });
    }
    Ok(saved)
}

/// Persist one question's answer if it is still dirty.
///
/// The per-question lock serializes saves for the same question; the payload
/// is re-read after acquiring it, so a save that queued behind an in-flight
/// one sends the newer value instead of a stale snapshot. The dirty flag is
/// cleared only when the persisted revision is still the current one.
pub(crate) async fn save_question(session: &SharedSession, question_id: Uuid) -> SessionResult<bool> {
    let lock = session.save_lock(question_id);
    let _guard = lock.lock().await;

    let Some((upsert, revision)) = session.answers().dirty_payload(question_id) else {
        return Ok(false);
    };
    let attempt_id = session
        .attempt_id()
        .await
        .ok_or(SessionError::MissingAttempt)?;

    session.gateway().save_answer(attempt_id, upsert).await?;

    session.answers().confirm_saved(question_id, revision);
    session.mark_saved(OffsetDateTime::now_utc());
    Ok(true)
}
