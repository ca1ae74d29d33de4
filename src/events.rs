//! Broadcast notices pushed to whatever layer is driving the session.

use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::state::state_machine::{SessionPhase, TerminationReason};

/// Notices published by the engine for the hosting layer to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    /// The session moved to a new phase.
    PhaseChanged {
        /// Phase the session is now in.
        phase: SessionPhase,
    },
    /// The remaining budget crossed one of the configured warning marks.
    TimeWarning {
        /// Remaining seconds at the moment the mark was crossed.
        remaining_seconds: u64,
    },
    /// A flush completed with every record persisted.
    AnswersSaved {
        /// Number of records written by the flush.
        count: usize,
    },
    /// The submit pipeline gave up after exhausting its retries.
    SubmitFailed {
        /// Human-readable description of the terminal failure.
        message: String,
    },
    /// The attempt is submitted; the host should navigate away.
    Closed {
        /// What ended the session.
        reason: TerminationReason,
    },
}

/// Broadcast hub fanning session notices out to subscribers.
pub struct NoticeHub {
    sender: broadcast::Sender<SessionNotice>,
}

impl NoticeHub {
    /// Construct a hub backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent notices.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionNotice> {
        self.sender.subscribe()
    }

    /// Register a subscriber exposed as a stream; lagging subscribers observe
    /// a recoverable error item instead of missing silently.
    pub fn stream(&self) -> BroadcastStream<SessionNotice> {
        BroadcastStream::new(self.sender.subscribe())
    }

    /// Send a notice to all current subscribers, ignoring delivery errors.
    pub fn publish(&self, notice: SessionNotice) {
        let _ = self.sender.send(notice);
    }
}

impl std::fmt::Debug for NoticeHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoticeHub")
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_every_subscriber() {
        let hub = NoticeHub::new(8);
        let mut first = hub.subscribe();
        let mut second = hub.subscribe();

        hub.publish(SessionNotice::TimeWarning {
            remaining_seconds: 60,
        });

        assert_eq!(
            first.recv().await.unwrap(),
            SessionNotice::TimeWarning {
                remaining_seconds: 60
            }
        );
        assert_eq!(
            second.recv().await.unwrap(),
            SessionNotice::TimeWarning {
                remaining_seconds: 60
            }
        );
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        let hub = NoticeHub::new(8);
        hub.publish(SessionNotice::AnswersSaved { count: 3 });
    }
}
