use super::builder::SchedulerBuilder;
use super::executor::core::Executor;
use super::injector::Injector;
use super::task::state::{Rejection, TaskState};
use super::task::{Job, Runnable, TaskHandle};
use super::timer::{Timer, TimerHandle};
use crate::error::{FluxError, panic_message};
use crate::flow::lock;

use tracing::{debug, error};

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Executes immediate, delayed and periodic tasks.
///
/// A `Scheduler` is a cheap, cloneable handle. Clones share the same threads.
/// Two flavours exist:
/// - **pooled** schedulers ([`Scheduler::single`], [`Scheduler::parallel`],
///   [`SchedulerBuilder`]) run tasks on named worker threads and timed tasks
///   through a dedicated timer thread,
/// - the **immediate** scheduler ([`Scheduler::immediate`]) runs tasks inline
///   on the calling thread and rejects timed tasks.
///
/// [`dispose`](Self::dispose) stops the scheduler; afterwards every
/// submission fails with [`FluxError::SchedulerShutdown`]. Dropping the last
/// handle disposes a pooled scheduler.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

enum Inner {
    Immediate { disposed: AtomicBool },
    Pool(Pool),
}

struct Pool {
    name: Arc<str>,
    injector: Arc<Injector>,
    executor: Mutex<Executor>,
    timer: Option<TimerHandle>,
    timer_thread: Mutex<Option<JoinHandle<()>>>,
    disposed: AtomicBool,
}

impl Scheduler {
    /// Returns a builder for a pooled scheduler.
    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::new()
    }

    /// Creates a scheduler with a single worker thread.
    ///
    /// Tasks run one at a time in submission order, which makes it the
    /// natural home of timed sources.
    pub fn single() -> Self {
        SchedulerBuilder::new().name("single").worker_threads(1).build()
    }

    /// Creates a scheduler with one worker thread per logical CPU.
    pub fn parallel() -> Self {
        SchedulerBuilder::new().name("parallel").build()
    }

    /// Creates a scheduler that runs tasks on the calling thread.
    pub fn immediate() -> Self {
        Self {
            inner: Arc::new(Inner::Immediate {
                disposed: AtomicBool::new(false),
            }),
        }
    }

    pub(crate) fn pool(name: String, threads: usize) -> Self {
        let name: Arc<str> = Arc::from(name);
        let injector = Arc::new(Injector::new());
        let executor = Executor::new(name.clone(), injector.clone(), threads);

        let (timer, timer_thread) = match Timer::start(&name, injector.clone()) {
            Ok((handle, join)) => (Some(handle), Some(join)),
            Err(e) => {
                error!(scheduler = %name, error = %e, "failed to spawn timer thread");
                (None, None)
            }
        };

        // Without a worker nothing could ever run: refuse work from the start.
        let disposed = AtomicBool::new(executor.size() == 0);

        Self {
            inner: Arc::new(Inner::Pool(Pool {
                name,
                injector,
                executor: Mutex::new(executor),
                timer,
                timer_thread: Mutex::new(timer_thread),
                disposed,
            })),
        }
    }

    /// Returns the scheduler name.
    pub fn name(&self) -> &str {
        match &*self.inner {
            Inner::Immediate { .. } => "immediate",
            Inner::Pool(pool) => &pool.name,
        }
    }

    /// Runs `task` as soon as a worker is free.
    ///
    /// # Errors
    ///
    /// [`FluxError::SchedulerShutdown`] if the scheduler was disposed.
    pub fn schedule<F>(&self, task: F) -> Result<TaskHandle, FluxError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(Box::new(task), TaskState::new())
    }

    /// Like [`schedule`](Self::schedule); `on_reject` receives
    /// [`FluxError::SchedulerShutdown`] if the scheduler is disposed before
    /// the task ran.
    pub(crate) fn schedule_guarded<F, R>(
        &self,
        task: F,
        on_reject: R,
    ) -> Result<TaskHandle, FluxError>
    where
        F: FnOnce() + Send + 'static,
        R: FnOnce(FluxError) + Send + 'static,
    {
        self.submit(Box::new(task), guarded(on_reject))
    }

    fn submit(
        &self,
        task: Box<dyn FnOnce() + Send>,
        state: TaskState,
    ) -> Result<TaskHandle, FluxError> {
        match &*self.inner {
            Inner::Immediate { disposed } => {
                if disposed.load(Ordering::Acquire) {
                    return Err(self.shutdown_error());
                }

                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
                    error!(
                        panic = %panic_message(payload.as_ref()),
                        "scheduled task panicked"
                    );
                }

                Ok(TaskHandle::new(Arc::new(TaskState::completed())))
            }
            Inner::Pool(pool) => {
                if pool.is_disposed() {
                    return Err(self.shutdown_error());
                }

                let state = Arc::new(state);
                let runnable = Runnable {
                    state: state.clone(),
                    job: Job::Once(task),
                };

                if pool.injector.push(runnable).is_err() {
                    return Err(self.shutdown_error());
                }

                Ok(TaskHandle::new(state))
            }
        }
    }

    /// Runs `task` once, after `delay`.
    ///
    /// # Errors
    ///
    /// [`FluxError::SchedulerShutdown`] if the scheduler was disposed,
    /// [`FluxError::SchedulerRejected`] on the immediate scheduler.
    pub fn schedule_after<F>(&self, delay: Duration, task: F) -> Result<TaskHandle, FluxError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.arm(delay, Job::Once(Box::new(task)), None, TaskState::new())
    }

    /// Like [`schedule_after`](Self::schedule_after), with a rejection hook
    /// as in [`schedule_guarded`](Self::schedule_guarded).
    pub(crate) fn schedule_after_guarded<F, R>(
        &self,
        delay: Duration,
        task: F,
        on_reject: R,
    ) -> Result<TaskHandle, FluxError>
    where
        F: FnOnce() + Send + 'static,
        R: FnOnce(FluxError) + Send + 'static,
    {
        self.arm(delay, Job::Once(Box::new(task)), None, guarded(on_reject))
    }

    /// Runs `task` after `initial_delay`, then every `period` until the
    /// returned handle is cancelled.
    ///
    /// Runs never overlap: a tick that fires while the previous run is still
    /// in progress is skipped.
    ///
    /// # Errors
    ///
    /// As [`schedule_after`](Self::schedule_after), plus
    /// [`FluxError::SchedulerRejected`] if `period` is zero.
    pub fn schedule_periodic<F>(
        &self,
        initial_delay: Duration,
        period: Duration,
        task: F,
    ) -> Result<TaskHandle, FluxError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.arm_periodic(initial_delay, period, Arc::new(task), TaskState::new())
    }

    /// Like [`schedule_periodic`](Self::schedule_periodic), with a rejection
    /// hook as in [`schedule_guarded`](Self::schedule_guarded).
    pub(crate) fn schedule_periodic_guarded<F, R>(
        &self,
        initial_delay: Duration,
        period: Duration,
        task: F,
        on_reject: R,
    ) -> Result<TaskHandle, FluxError>
    where
        F: Fn() + Send + Sync + 'static,
        R: FnOnce(FluxError) + Send + 'static,
    {
        self.arm_periodic(initial_delay, period, Arc::new(task), guarded(on_reject))
    }

    fn arm_periodic(
        &self,
        initial_delay: Duration,
        period: Duration,
        task: Arc<dyn Fn() + Send + Sync>,
        state: TaskState,
    ) -> Result<TaskHandle, FluxError> {
        if period.is_zero() {
            return Err(FluxError::SchedulerRejected {
                scheduler: self.name().to_string(),
                reason: "periodic task needs a non-zero period",
            });
        }

        self.arm(initial_delay, Job::Repeat(task), Some(period), state)
    }

    fn arm(
        &self,
        delay: Duration,
        job: Job,
        period: Option<Duration>,
        state: TaskState,
    ) -> Result<TaskHandle, FluxError> {
        let pool = self.timed_pool()?;
        let state = Arc::new(state);

        pool.arm(Instant::now() + delay, state.clone(), job, period)
            .map_err(|_| self.shutdown_error())?;

        Ok(TaskHandle::new(state))
    }

    /// Stops the scheduler.
    ///
    /// Pending timers and queued tasks are dropped without running; the
    /// streams waiting on them fail with [`FluxError::SchedulerShutdown`].
    /// Workers finish the task at hand and are joined, except the calling
    /// thread when it is one of them. Idempotent.
    pub fn dispose(&self) {
        match &*self.inner {
            Inner::Immediate { disposed } => disposed.store(true, Ordering::Release),
            Inner::Pool(pool) => pool.dispose(),
        }
    }

    /// Returns `true` once [`dispose`](Self::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        match &*self.inner {
            Inner::Immediate { disposed } => disposed.load(Ordering::Acquire),
            Inner::Pool(pool) => pool.is_disposed(),
        }
    }

    fn timed_pool(&self) -> Result<&Pool, FluxError> {
        match &*self.inner {
            Inner::Immediate { disposed } if disposed.load(Ordering::Acquire) => {
                Err(self.shutdown_error())
            }
            Inner::Immediate { .. } => Err(FluxError::SchedulerRejected {
                scheduler: self.name().to_string(),
                reason: "immediate scheduler cannot run delayed tasks",
            }),
            Inner::Pool(pool) if pool.is_disposed() => Err(self.shutdown_error()),
            Inner::Pool(pool) => Ok(pool),
        }
    }

    fn shutdown_error(&self) -> FluxError {
        FluxError::SchedulerShutdown {
            scheduler: self.name().to_string(),
        }
    }
}

impl Pool {
    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn arm(
        &self,
        deadline: Instant,
        state: Arc<TaskState>,
        job: Job,
        period: Option<Duration>,
    ) -> Result<(), ()> {
        match &self.timer {
            Some(timer) => timer.arm(deadline, state, job, period).map_err(|_| ()),
            None => Err(()),
        }
    }

    /// Shuts down the scheduler.
    ///
    /// This performs the following steps:
    /// 1. Stops the timer thread, which rejects pending timers
    /// 2. Stops task intake, wakes parked workers and rejects queued tasks
    /// 3. Joins the worker threads and the timer thread
    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        debug!(scheduler = %self.name, "disposing scheduler");

        if let Some(timer) = &self.timer {
            timer.shutdown();
        }

        let dropped = lock(&self.executor).shutdown();

        for task in dropped {
            task.state.reject(FluxError::SchedulerShutdown {
                scheduler: self.name.to_string(),
            });
        }

        let mut executor = lock(&self.executor);
        executor.join();

        if let Some(join) = lock(&self.timer_thread).take() {
            let _ = join.join();
        }
    }
}

fn guarded<R>(on_reject: R) -> TaskState
where
    R: FnOnce(FluxError) + Send + 'static,
{
    let on_reject: Rejection = Box::new(on_reject);
    TaskState::with_rejection(on_reject)
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("name", &self.name())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
