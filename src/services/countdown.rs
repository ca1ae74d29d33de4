//! Countdown over the attempt's remaining budget.
//!
//! The initial value is anchored to the server's start timestamp; ticks
//! decrement locally so the display stays responsive. Restarting a session
//! re-anchors, which is what keeps the budget honest across reloads.

use tokio::time::{self, Instant};
use tracing::{debug, warn};

use crate::{
    events::SessionNotice,
    state::{
        SharedSession,
        state_machine::{SessionPhase, TerminationReason},
    },
};

use super::session_service;

/// Tick once per interval until the budget is exhausted or the session
/// leaves the answering phase.
pub(crate) async fn run(session: SharedSession, initial_remaining: u64) {
    let tick = session.tuning().tick_interval;
    let mut remaining = initial_remaining;
    // Marks strictly below the starting value; a resume that lands under a
    // mark does not replay the warning for it.
    let mut warning_marks: Vec<u64> = session
        .tuning()
        .warning_thresholds
        .iter()
        .copied()
        .filter(|mark| *mark < remaining)
        .collect();
    let mut phase_rx = session.watch_phase();
    let mut ticker = time::interval_at(Instant::now() + tick, tick);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                remaining = remaining.saturating_sub(1);
                session.publish_remaining(remaining);

                warning_marks.retain(|&mark| {
                    if remaining <= mark {
                        session.notices().publish(SessionNotice::TimeWarning {
                            remaining_seconds: mark,
                        });
                        false
                    } else {
                        true
                    }
                });

                if remaining == 0 {
                    if let Err(err) =
                        session_service::terminate(&session, TerminationReason::Timeout).await
                    {
                        warn!(error = %err, "timeout-triggered submission failed");
                    }
                    break;
                }
            }
            changed = phase_rx.changed() => {
                if changed.is_err() || !matches!(*phase_rx.borrow(), SessionPhase::InProgress) {
                    debug!("countdown stopped; session left the answering phase");
                    break;
                }
            }
        }
    }
}
