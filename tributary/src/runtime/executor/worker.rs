use crate::runtime::context::{WorkerContext, enter_context};
use crate::runtime::injector::Injector;

use std::sync::Arc;

/// A worker thread of a scheduler.
///
/// The worker takes tasks from the shared injector in FIFO order and runs
/// them one at a time, parking while the injector is empty. It exits once
/// the injector is shut down.
pub(crate) struct Worker {
    /// Unique identifier of the worker within its scheduler.
    id: usize,

    /// Name of the owning scheduler.
    scheduler: Arc<str>,

    /// Handle to the global injector queue.
    injector: Arc<Injector>,
}

impl Worker {
    /// Creates a new worker.
    ///
    /// # Arguments
    ///
    /// * `id` - Worker identifier
    /// * `scheduler` - Name of the owning scheduler
    /// * `injector` - Handle to the global injector
    pub(crate) fn new(id: usize, scheduler: Arc<str>, injector: Arc<Injector>) -> Self {
        Self {
            id,
            scheduler,
            injector,
        }
    }

    /// Runs the worker loop inside the worker context until shutdown.
    pub(crate) fn run(self) {
        let context = WorkerContext {
            scheduler: self.scheduler.clone(),
            id: self.id,
        };

        enter_context(context, || {
            while let Some(task) = self.injector.next() {
                task.run();
            }
        });
    }
}
