//! Scheduled units of work.
//!
//! A task is a closure plus a shared [`state::TaskState`]. The closure is
//! either run once or, for periodic tasks, on every tick of the timer.

mod handle;

pub(crate) mod state;

pub use handle::TaskHandle;

use crate::error::panic_message;
use state::TaskState;

use tracing::error;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// The closure of a task.
pub(crate) enum Job {
    Once(Box<dyn FnOnce() + Send>),
    Repeat(Arc<dyn Fn() + Send + Sync>),
}

/// A task ready to be picked up by a worker.
pub(crate) struct Runnable {
    pub(crate) state: Arc<TaskState>,
    pub(crate) job: Job,
}

impl Runnable {
    /// Runs the task unless it was cancelled.
    ///
    /// A panic inside the closure is caught and logged so the worker thread
    /// survives.
    pub(crate) fn run(self) {
        if !self.state.try_start() {
            return;
        }

        let periodic = matches!(self.job, Job::Repeat(_));

        let result = panic::catch_unwind(AssertUnwindSafe(|| match self.job {
            Job::Once(f) => f(),
            Job::Repeat(f) => f(),
        }));

        if let Err(payload) = result {
            error!(
                panic = %panic_message(payload.as_ref()),
                "scheduled task panicked"
            );
        }

        self.state.finish(periodic);
    }
}
