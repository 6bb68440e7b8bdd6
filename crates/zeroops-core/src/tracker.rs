//! Outstanding-work counter with an awaitable "idle" state.
//!
//! Used to drain fire-and-forget webhook calls and in-flight schedule runs
//! on shutdown. Waiting never cancels the tracked work.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

use crate::error::{RelayError, Result};

#[derive(Debug, Default)]
pub struct WorkTracker {
    outstanding: AtomicUsize,
    idle: Notify,
}

/// Held for the lifetime of one unit of work. Dropping it (also on panic
/// or task abort) marks the work as done.
#[derive(Debug)]
pub struct WorkGuard {
    tracker: Arc<WorkTracker>,
}

impl WorkTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register one unit of outstanding work.
    pub fn enter(self: &Arc<Self>) -> WorkGuard {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        WorkGuard {
            tracker: Arc::clone(self),
        }
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Resolve once no work is outstanding.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            // Register interest before checking, so a release between the
            // check and the await still wakes us.
            notified.as_mut().enable();
            if self.outstanding() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// [`wait_idle`](Self::wait_idle) bounded by `deadline`.
    pub async fn wait_idle_timeout(&self, deadline: Duration) -> Result<()> {
        tokio::time::timeout(deadline, self.wait_idle())
            .await
            .map_err(|_| {
                RelayError::Timeout(format!(
                    "{} task(s) still running after {:?}",
                    self.outstanding(),
                    deadline
                ))
            })
    }
}

impl Drop for WorkGuard {
    fn drop(&mut self) {
        if self.tracker.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.tracker.idle.notify_waiters();
        }
    }
}
