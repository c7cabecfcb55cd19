use crate::error::{FluxError, panic_message};
use crate::flow::lock;

use tracing::error;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};

/// Task is waiting for its turn: queued, or armed on the timer.
pub(crate) const QUEUED: u8 = 0;

/// Task is currently being executed by a worker.
///
/// At most one worker may observe this state at a time. A periodic task
/// returns to [`QUEUED`] when the run finishes.
pub(crate) const RUNNING: u8 = 1;

/// One-shot task has run to completion.
pub(crate) const COMPLETED: u8 = 2;

/// Task was cancelled and will not run again.
pub(crate) const CANCELLED: u8 = 3;

/// Called with the shutdown error when the scheduler drops a task unrun.
pub(crate) type Rejection = Box<dyn FnOnce(FluxError) + Send>;

/// Lifecycle of a scheduled task, shared between the scheduler and every
/// [`TaskHandle`](super::TaskHandle) pointing at it.
pub(crate) struct TaskState {
    state: AtomicU8,

    /// Released once the task can no longer be rejected.
    on_reject: Mutex<Option<Rejection>>,
}

impl TaskState {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(QUEUED),
            on_reject: Mutex::new(None),
        }
    }

    pub(crate) fn with_rejection(on_reject: Rejection) -> Self {
        Self {
            state: AtomicU8::new(QUEUED),
            on_reject: Mutex::new(Some(on_reject)),
        }
    }

    pub(crate) fn completed() -> Self {
        Self {
            state: AtomicU8::new(COMPLETED),
            on_reject: Mutex::new(None),
        }
    }

    /// Claims the task for execution.
    ///
    /// Fails if the task was cancelled, or if a previous run of a periodic
    /// task is still in progress.
    pub(crate) fn try_start(&self) -> bool {
        self.state
            .compare_exchange(QUEUED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Ends a run. A cancellation that happened during the run is kept.
    pub(crate) fn finish(&self, periodic: bool) {
        let next = if periodic { QUEUED } else { COMPLETED };

        let finished = self
            .state
            .compare_exchange(RUNNING, next, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if finished && !periodic {
            lock(&self.on_reject).take();
        }
    }

    /// Marks the task cancelled. Returns `false` if it had already completed
    /// or been cancelled.
    pub(crate) fn cancel(&self) -> bool {
        let cancelled = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |state| match state {
                COMPLETED | CANCELLED => None,
                _ => Some(CANCELLED),
            })
            .is_ok();

        if cancelled {
            lock(&self.on_reject).take();
        }

        cancelled
    }

    /// Cancels a task dropped by a shutting-down scheduler and hands `error`
    /// to its rejection hook. A task that already completed or was cancelled
    /// is left alone.
    pub(crate) fn reject(&self, error: FluxError) {
        let rejected = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |state| match state {
                COMPLETED | CANCELLED => None,
                _ => Some(CANCELLED),
            })
            .is_ok();

        if !rejected {
            return;
        }

        let Some(on_reject) = lock(&self.on_reject).take() else {
            return;
        };

        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| on_reject(error))) {
            error!(
                panic = %panic_message(payload.as_ref()),
                "task rejection hook panicked"
            );
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) == CANCELLED
    }

    pub(crate) fn is_finished(&self) -> bool {
        matches!(self.state.load(Ordering::Acquire), COMPLETED | CANCELLED)
    }
}
