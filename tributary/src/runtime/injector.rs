use crate::flow::lock;
use crate::runtime::task::Runnable;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};

/// Global task queue of a scheduler.
///
/// Immediate tasks and fired timers are pushed here and picked up by the
/// worker threads in FIFO order. Idle workers park on a condition variable
/// until work arrives or the scheduler shuts down.
pub(crate) struct Injector {
    /// Tasks waiting for a worker.
    queue: Mutex<VecDeque<Runnable>>,

    /// Wakes parked workers.
    condvar: Condvar,

    /// Indicates whether the scheduler is shutting down.
    shutdown: AtomicBool,
}

impl Injector {
    /// Creates a new empty injector.
    pub(crate) fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            condvar: Condvar::new(),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Stops intake, wakes all parked workers and returns the tasks that
    /// were still queued.
    pub(crate) fn shutdown(&self) -> VecDeque<Runnable> {
        let dropped = {
            let mut queue = lock(&self.queue);
            self.shutdown.store(true, Ordering::Release);
            std::mem::take(&mut *queue)
        };

        self.condvar.notify_all();
        dropped
    }

    /// Pushes a task and wakes one worker.
    ///
    /// Hands the task back if the injector was shut down.
    pub(crate) fn push(&self, task: Runnable) -> Result<(), Runnable> {
        {
            let mut queue = lock(&self.queue);

            if self.shutdown.load(Ordering::Acquire) {
                return Err(task);
            }

            queue.push_back(task);
        }

        self.condvar.notify_one();
        Ok(())
    }

    /// Takes the next task, parking the calling worker while the queue is
    /// empty.
    ///
    /// Returns `None` once shutdown has been signalled.
    pub(crate) fn next(&self) -> Option<Runnable> {
        let mut queue = lock(&self.queue);

        loop {
            if self.shutdown.load(Ordering::Acquire) {
                return None;
            }

            if let Some(task) = queue.pop_front() {
                return Some(task);
            }

            queue = self
                .condvar
                .wait(queue)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}
