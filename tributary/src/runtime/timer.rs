use crate::error::FluxError;
use crate::runtime::injector::Injector;
use crate::runtime::task::state::TaskState;
use crate::runtime::task::{Job, Runnable};

use tracing::debug;

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SendError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// An entry in the timer queue.
///
/// `TimerEntry` represents a task armed for a specific deadline. Entries are
/// stored in a binary heap ordered by deadline, then by arming order, so two
/// tasks armed for the same instant fire in the order they were armed.
pub(crate) struct TimerEntry {
    /// The time at which the task should be dispatched.
    pub(crate) deadline: Instant,

    /// Arming order, used to break deadline ties.
    pub(crate) seq: u64,

    /// State shared with the task handle.
    pub(crate) state: Arc<TaskState>,

    /// What to dispatch.
    pub(crate) job: Job,

    /// Re-arm interval of a periodic task.
    pub(crate) period: Option<Duration>,
}

impl Eq for TimerEntry {}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Ord for TimerEntry {
    /// Orders timer entries by deadline, then by arming order.
    ///
    /// Note that the comparison is **reversed** so that a
    /// `BinaryHeap<TimerEntry>` behaves as a min-heap.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Heap size below which cancelled entries are left to expire.
const PURGE_MIN: usize = 64;

/// Messages accepted by the timer thread.
pub(crate) enum TimerCommand {
    Arm(TimerEntry),
    Shutdown,
}

/// Handle used to arm timers on the timer thread.
pub(crate) struct TimerHandle {
    sender: Sender<TimerCommand>,
    seq: AtomicU64,
}

impl TimerHandle {
    /// Arms `job` to be dispatched at `deadline`.
    pub(crate) fn arm(
        &self,
        deadline: Instant,
        state: Arc<TaskState>,
        job: Job,
        period: Option<Duration>,
    ) -> Result<(), SendError<TimerCommand>> {
        let seq = self.seq.fetch_add(1, AtomicOrdering::Relaxed);

        self.sender.send(TimerCommand::Arm(TimerEntry {
            deadline,
            seq,
            state,
            job,
            period,
        }))
    }

    pub(crate) fn shutdown(&self) {
        let _ = self.sender.send(TimerCommand::Shutdown);
    }
}

/// The timer thread.
///
/// Holds a min-heap of armed tasks, sleeps until the earliest deadline or the
/// next command, and pushes every expired task onto the scheduler's
/// [`Injector`]. Periodic tasks are re-armed on each dispatch. The timer
/// thread never runs task closures itself.
///
/// Cancelled entries are purged whenever the heap outgrows twice its size
/// after the previous purge. On shutdown every pending entry is rejected
/// with [`FluxError::SchedulerShutdown`].
pub(crate) struct Timer {
    name: Arc<str>,
    receiver: Receiver<TimerCommand>,
    timers: BinaryHeap<TimerEntry>,
    injector: Arc<Injector>,

    /// Heap size that triggers the next purge.
    purge_at: usize,
}

impl Timer {
    /// Starts the timer thread and returns a handle to it.
    pub(crate) fn start(
        name: &Arc<str>,
        injector: Arc<Injector>,
    ) -> io::Result<(TimerHandle, JoinHandle<()>)> {
        let (sender, receiver) = mpsc::channel();

        let timer = Timer {
            name: name.clone(),
            receiver,
            timers: BinaryHeap::new(),
            injector,
            purge_at: PURGE_MIN,
        };

        let join = thread::Builder::new()
            .name(format!("{name}-timer"))
            .spawn(move || timer.run())?;

        let handle = TimerHandle {
            sender,
            seq: AtomicU64::new(0),
        };

        Ok((handle, join))
    }

    /// Main timer loop.
    ///
    /// 1. Wait for a command, at most until the earliest deadline
    /// 2. Arm the received entry, or stop on shutdown
    /// 3. Dispatch expired entries
    fn run(mut self) {
        loop {
            let timeout = self
                .timers
                .peek()
                .map(|t| t.deadline.saturating_duration_since(Instant::now()));

            let command = match timeout {
                Some(timeout) => match self.receiver.recv_timeout(timeout) {
                    Ok(command) => Some(command),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                },
                None => match self.receiver.recv() {
                    Ok(command) => Some(command),
                    Err(_) => break,
                },
            };

            match command {
                Some(TimerCommand::Arm(entry)) => self.arm(entry),
                Some(TimerCommand::Shutdown) => break,
                None => {}
            }

            self.fire_expired();
        }

        debug!(scheduler = %self.name, pending = self.timers.len(), "timer thread stopped");

        let error = self.shutdown_error();

        for entry in self.timers.drain() {
            entry.state.reject(error.clone());
        }
    }

    fn arm(&mut self, entry: TimerEntry) {
        self.timers.push(entry);

        if self.timers.len() > self.purge_at {
            self.timers.retain(|entry| !entry.state.is_cancelled());
            self.purge_at = PURGE_MIN.max(self.timers.len() * 2);
        }
    }

    fn shutdown_error(&self) -> FluxError {
        FluxError::SchedulerShutdown {
            scheduler: self.name.to_string(),
        }
    }

    /// Queues a fired task, rejecting it if the workers are already gone.
    fn dispatch(&self, runnable: Runnable) {
        if let Err(runnable) = self.injector.push(runnable) {
            runnable.state.reject(self.shutdown_error());
        }
    }

    fn fire_expired(&mut self) {
        let now = Instant::now();

        while self.timers.peek().is_some_and(|t| t.deadline <= now) {
            let Some(mut entry) = self.timers.pop() else {
                break;
            };

            if entry.state.is_cancelled() {
                continue;
            }

            match entry.job {
                Job::Once(f) => {
                    self.dispatch(Runnable {
                        state: entry.state,
                        job: Job::Once(f),
                    });
                }
                Job::Repeat(f) => {
                    self.dispatch(Runnable {
                        state: entry.state.clone(),
                        job: Job::Repeat(f.clone()),
                    });

                    if entry.state.is_cancelled() {
                        continue;
                    }

                    let period = entry.period.unwrap_or(Duration::ZERO);
                    let next = entry.deadline + period;

                    // A deadline already missed by a full period is not caught up.
                    entry.deadline = if next + period < now { now + period } else { next };
                    entry.job = Job::Repeat(f);
                    self.timers.push(entry);
                }
            }
        }
    }
}
