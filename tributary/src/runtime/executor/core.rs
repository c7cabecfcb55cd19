use crate::runtime::executor::worker::Worker;
use crate::runtime::injector::Injector;
use crate::runtime::task::Runnable;

use tracing::{debug, error};

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Pool of worker threads feeding from one injector.
///
/// The `Executor` is responsible for:
/// - spawning named worker threads,
/// - managing orderly shutdown and thread joining.
pub(crate) struct Executor {
    /// Global injector queue shared by all workers.
    injector: Arc<Injector>,

    /// Join handles for worker threads.
    handles: Vec<JoinHandle<()>>,
}

impl Executor {
    /// Creates a new executor with the given number of worker threads.
    ///
    /// Workers are named `{name}-{id}`. A worker that cannot be spawned is
    /// logged and skipped; [`size`](Self::size) reports how many started.
    ///
    /// # Arguments
    ///
    /// * `name` - Name of the owning scheduler
    /// * `injector` - Queue the workers take tasks from
    /// * `threads` - Number of worker threads
    pub(crate) fn new(name: Arc<str>, injector: Arc<Injector>, threads: usize) -> Self {
        let mut handles = Vec::with_capacity(threads);

        for id in 0..threads {
            let worker = Worker::new(id, name.clone(), injector.clone());

            let spawned = thread::Builder::new()
                .name(format!("{name}-{id}"))
                .spawn(move || worker.run());

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => error!(scheduler = %name, worker = id, error = %e, "failed to spawn worker"),
            }
        }

        debug!(scheduler = %name, workers = handles.len(), "executor started");

        Self { injector, handles }
    }

    /// Number of running worker threads.
    pub(crate) fn size(&self) -> usize {
        self.handles.len()
    }

    /// Signals all workers to stop after the task at hand and returns the
    /// tasks no worker picked up.
    pub(crate) fn shutdown(&self) -> VecDeque<Runnable> {
        self.injector.shutdown()
    }

    /// Waits for all worker threads to terminate.
    ///
    /// The calling thread is skipped when it is one of the workers.
    pub(crate) fn join(&mut self) {
        let current = thread::current().id();

        for handle in self.handles.drain(..) {
            if handle.thread().id() == current {
                continue;
            }

            let _ = handle.join();
        }
    }
}
