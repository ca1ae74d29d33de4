//! Small ownership wrapper around spawned repeating tasks.

use std::future::Future;

use tokio::task::JoinHandle;

/// Handle over a spawned background task that is cancelled on demand or when
/// the handle is dropped.
#[derive(Debug)]
pub struct TaskHandle {
    inner: JoinHandle<()>,
}

impl TaskHandle {
    /// Spawn `future` onto the runtime and return its owning handle.
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            inner: tokio::spawn(future),
        }
    }

    /// Cancel the task. Safe to call more than once or after completion.
    pub fn cancel(&self) {
        self.inner.abort();
    }

    /// Whether the task has run to completion or was cancelled.
    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.inner.abort();
    }
}
