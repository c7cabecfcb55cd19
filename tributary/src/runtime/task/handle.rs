use super::state::TaskState;

use std::fmt;
use std::sync::Arc;

/// Handle to a task submitted to a [`Scheduler`](crate::Scheduler).
///
/// Cloning the handle is cheap. Dropping it does **not** cancel the task.
#[derive(Clone)]
pub struct TaskHandle {
    state: Arc<TaskState>,
}

impl TaskHandle {
    pub(crate) fn new(state: Arc<TaskState>) -> Self {
        Self { state }
    }

    /// Prevents the task from running (again).
    ///
    /// A run already in progress finishes; a periodic task is not re-armed.
    /// Returns `false` if the task had already completed or been cancelled.
    pub fn cancel(&self) -> bool {
        self.state.cancel()
    }

    /// Returns `true` if [`cancel`](Self::cancel) took effect.
    pub fn is_cancelled(&self) -> bool {
        self.state.is_cancelled()
    }

    /// Returns `true` once the task will never run again.
    pub fn is_finished(&self) -> bool {
        self.state.is_finished()
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("cancelled", &self.is_cancelled())
            .field("finished", &self.is_finished())
            .finish()
    }
}
