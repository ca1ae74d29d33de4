//! Poll loop watching the room the attempt runs under.

use tokio::time;
use tracing::{debug, info, warn};

use crate::{
    gateway::RoomStatus,
    state::{
        SharedSession,
        state_machine::{SessionPhase, TerminationReason},
    },
};

use super::session_service;

/// Poll the room status at a fixed interval, starting immediately. A closed
/// room terminates the session; poll failures are retried at the next tick.
pub(crate) async fn run(session: SharedSession) {
    let room_id = session.exam().room_id;
    let mut phase_rx = session.watch_phase();
    let mut ticker = time::interval(session.tuning().room_poll_interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match session.gateway().room_status(room_id).await {
                    Ok(RoomStatus::Closed) => {
                        info!(%room_id, "room closed remotely; submitting");
                        if let Err(err) =
                            session_service::terminate(&session, TerminationReason::RoomClosed).await
                        {
                            warn!(error = %err, "room-closed submission failed");
                        }
                        break;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!(%room_id, error = %err, "room status poll failed; retrying at next interval");
                    }
                }
            }
            changed = phase_rx.changed() => {
                if changed.is_err() || !matches!(*phase_rx.borrow(), SessionPhase::InProgress) {
                    debug!("room watcher stopped; session left the answering phase");
                    break;
                }
            }
        }
    }
}
