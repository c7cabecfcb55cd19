use crate::core::{Flux, Publisher, Subscriber, Subscription};
use crate::error::FluxError;
use crate::flow::{Outlet, lock};
use crate::runtime::{Scheduler, TaskHandle};

use tracing::trace;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct IntervalSource {
    delay: Duration,
    period: Duration,
    scheduler: Scheduler,
}

impl Publisher<u64> for IntervalSource {
    fn subscribe(&self, subscriber: Box<dyn Subscriber<u64>>) {
        let shared = Arc::new(Ticker {
            outlet: Outlet::new(),
            count: AtomicU64::new(0),
            task: Mutex::new(None),
        });

        shared.outlet.start(subscriber, shared.clone());

        if shared.outlet.is_terminated() {
            return;
        }

        let ticker = shared.clone();
        let rejected = shared.clone();
        let scheduled = self.scheduler.schedule_periodic_guarded(
            self.delay,
            self.period,
            move || ticker.tick(),
            move |e| {
                rejected.outlet.error(e);
            },
        );

        match scheduled {
            Ok(task) => {
                trace!(period = ?self.period, scheduler = self.scheduler.name(), "interval armed");
                *lock(&shared.task) = Some(task.clone());

                if shared.outlet.is_terminated() {
                    task.cancel();
                }
            }
            Err(e) => {
                shared.outlet.error(e);
            }
        }
    }
}

/// Per-subscription state of an interval.
struct Ticker {
    outlet: Outlet<u64>,
    count: AtomicU64,
    task: Mutex<Option<TaskHandle>>,
}

impl Ticker {
    fn tick(&self) {
        if self.outlet.is_terminated() {
            self.stop();
            return;
        }

        let tick = self.count.load(Ordering::Acquire);

        if self.outlet.unfulfilled() == 0 {
            self.stop();
            self.outlet.error(FluxError::Overflow {
                context: format!("interval: could not emit tick {tick} due to lack of requests"),
            });
            return;
        }

        self.count.store(tick + 1, Ordering::Release);
        self.outlet.push(tick);
    }

    fn stop(&self) {
        if let Some(task) = lock(&self.task).take() {
            task.cancel();
        }
    }
}

impl Subscription for Ticker {
    fn request(&self, n: u64) {
        if !self.outlet.request(n) {
            self.stop();
        }
    }

    fn cancel(&self) {
        self.outlet.cancel();
        self.stop();
    }
}

struct DelaySource {
    delay: Duration,
    scheduler: Scheduler,
}

impl Publisher<u64> for DelaySource {
    fn subscribe(&self, subscriber: Box<dyn Subscriber<u64>>) {
        let shared = Arc::new(Delayed {
            outlet: Outlet::new(),
            task: Mutex::new(None),
        });

        shared.outlet.start(subscriber, shared.clone());

        if shared.outlet.is_terminated() {
            return;
        }

        let delayed = shared.clone();
        let rejected = shared.clone();
        let scheduled = self.scheduler.schedule_after_guarded(
            self.delay,
            move || {
                delayed.outlet.push(0);
                delayed.outlet.complete();
            },
            move |e| {
                rejected.outlet.error(e);
            },
        );

        match scheduled {
            Ok(task) => {
                *lock(&shared.task) = Some(task.clone());

                if shared.outlet.is_cancelled() {
                    task.cancel();
                }
            }
            Err(e) => {
                shared.outlet.error(e);
            }
        }
    }
}

struct Delayed {
    outlet: Outlet<u64>,
    task: Mutex<Option<TaskHandle>>,
}

impl Subscription for Delayed {
    fn request(&self, n: u64) {
        self.outlet.request(n);
    }

    fn cancel(&self) {
        self.outlet.cancel();

        if let Some(task) = lock(&self.task).take() {
            task.cancel();
        }
    }
}

impl Flux<u64> {
    /// Emits `0, 1, 2, …` every `period` on `scheduler`, starting one period
    /// after subscription.
    ///
    /// Ticks cannot be paused: a tick that finds no outstanding demand fails
    /// the stream with [`FluxError::Overflow`]. Each subscription gets its own
    /// independent counter and timer. Disposing `scheduler` fails the stream
    /// with [`FluxError::SchedulerShutdown`].
    pub fn interval(period: Duration, scheduler: &Scheduler) -> Self {
        Flux::interval_after(period, period, scheduler)
    }

    /// Like [`interval`](Self::interval) with a distinct initial delay.
    pub fn interval_after(delay: Duration, period: Duration, scheduler: &Scheduler) -> Self {
        Flux::from_publisher(IntervalSource {
            delay,
            period,
            scheduler: scheduler.clone(),
        })
    }

    /// Emits a single `0` after `delay` on `scheduler`, then completes.
    pub fn delay(delay: Duration, scheduler: &Scheduler) -> Self {
        Flux::from_publisher(DelaySource {
            delay,
            scheduler: scheduler.clone(),
        })
    }
}
