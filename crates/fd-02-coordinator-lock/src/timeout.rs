//! Cancellable one-shot timers bound to a waiting state.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

/// A scheduled continuation that is aborted when the handle is dropped.
#[derive(Debug)]
pub struct TimeoutHandle {
    task: Option<JoinHandle<()>>,
}

impl TimeoutHandle {
    /// Run `action` after `after` elapses.
    #[must_use]
    pub fn schedule<F>(after: Duration, action: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let task = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            action.await;
        });
        Self { task: Some(task) }
    }

    /// Abort the timer if it has not fired yet.
    pub fn cancel(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Release the handle without aborting the timer.
    ///
    /// Called by the timer's own continuation once it has taken the handle
    /// out of the state it guards.
    pub fn disarm(mut self) {
        self.task.take();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for TimeoutHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
