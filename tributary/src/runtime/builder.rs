use super::Scheduler;

use std::thread;

/// Builder for configuring and creating a pooled scheduler.
///
/// `SchedulerBuilder` allows customizing the scheduler before its threads
/// are started: the name used for its threads and logs, and the number of
/// worker threads.
///
/// # Examples
///
/// ```rust,ignore
/// let scheduler = SchedulerBuilder::new()
///     .name("io")
///     .worker_threads(4)
///     .build();
/// ```
pub struct SchedulerBuilder {
    /// Prefix of the thread names.
    name: String,

    /// Number of worker threads.
    worker_threads: usize,
}

impl SchedulerBuilder {
    /// Creates a new `SchedulerBuilder` with default configuration.
    ///
    /// By default, the number of worker threads is set to the number
    /// of available logical CPUs, falling back to `1` if unavailable.
    pub fn new() -> Self {
        let worker_threads = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Self {
            name: "tributary".to_string(),
            worker_threads,
        }
    }

    /// Sets the scheduler name. Worker threads are named `{name}-{index}`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the number of worker threads.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn worker_threads(mut self, n: usize) -> Self {
        assert!(n > 0, "worker_threads must be > 0");

        self.worker_threads = n;
        self
    }

    /// Starts the worker threads and the timer thread.
    pub fn build(self) -> Scheduler {
        Scheduler::pool(self.name, self.worker_threads)
    }
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
