use crate::core::{Flux, Publisher, Subscriber, Subscription};
use crate::error::FluxError;
use crate::flow::{Outlet, lock};
use crate::runtime::{Scheduler, TaskHandle};

use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

struct DelayElements<T> {
    upstream: Flux<T>,
    delay: Duration,
    scheduler: Scheduler,
}

impl<T: Send + 'static> Publisher<T> for DelayElements<T> {
    fn subscribe(&self, downstream: Box<dyn Subscriber<T>>) {
        let shared = Arc::new(DelayShared {
            outlet: Outlet::new(),
            upstream: OnceLock::new(),
            state: Mutex::new(DelayState {
                pending: None,
                in_flight: false,
                parked: true,
                upstream_done: false,
            }),
            delay: self.delay,
            scheduler: self.scheduler.clone(),
        });

        self.upstream.subscribe_with(Box::new(DelaySubscriber {
            shared,
            downstream: Some(downstream),
        }));
    }
}

struct DelayState {
    /// Timer of the element currently held back.
    pending: Option<TaskHandle>,
    in_flight: bool,

    /// The next element is requested once the downstream has demand.
    parked: bool,
    upstream_done: bool,
}

struct DelayShared<T> {
    outlet: Outlet<T>,
    upstream: OnceLock<Arc<dyn Subscription>>,
    state: Mutex<DelayState>,
    delay: Duration,
    scheduler: Scheduler,
}

impl<T: Send + 'static> DelayShared<T> {
    fn hold(this: &Arc<Self>, value: T) {
        lock(&this.state).in_flight = true;

        let shared = this.clone();
        let rejected = this.clone();
        let scheduled = this.scheduler.schedule_after_guarded(
            this.delay,
            move || Self::release(&shared, value),
            move |e| rejected.fail(e),
        );

        match scheduled {
            Ok(task) => {
                let mut state = lock(&this.state);

                if state.in_flight && !task.is_finished() {
                    state.pending = Some(task);
                }
            }
            Err(e) => this.fail(e),
        }
    }

    /// Emits a delayed element and asks the upstream for the next one.
    fn release(this: &Arc<Self>, value: T) {
        this.outlet.push(value);

        let complete = {
            let mut state = lock(&this.state);
            state.pending = None;
            state.in_flight = false;
            state.parked = true;
            state.upstream_done
        };

        if complete {
            this.outlet.complete();
        } else if this.outlet.unfulfilled() > 0 {
            this.unpark();
        }
    }

    /// Requests the next element if none is outstanding.
    fn unpark(&self) {
        let resume = {
            let mut state = lock(&self.state);
            let parked = state.parked && !state.upstream_done;
            state.parked = false;
            parked
        };

        if resume && let Some(upstream) = self.upstream.get() {
            upstream.request(1);
        }
    }

    fn upstream_complete(&self) {
        let idle = {
            let mut state = lock(&self.state);
            state.upstream_done = true;
            !state.in_flight
        };

        if idle {
            self.outlet.complete();
        }
    }

    fn fail(&self, error: FluxError) {
        if self.outlet.error(error) {
            self.cancel_all();
        }
    }

    fn cancel_all(&self) {
        if let Some(upstream) = self.upstream.get() {
            upstream.cancel();
        }

        let pending = {
            let mut state = lock(&self.state);
            state.in_flight = false;
            state.pending.take()
        };

        if let Some(task) = pending {
            task.cancel();
        }
    }
}

impl<T: Send + 'static> Subscription for DelayShared<T> {
    fn request(&self, n: u64) {
        if self.outlet.request(n) {
            self.unpark();
        } else {
            self.cancel_all();
        }
    }

    fn cancel(&self) {
        self.outlet.cancel();
        self.cancel_all();
    }
}

struct DelaySubscriber<T> {
    shared: Arc<DelayShared<T>>,
    downstream: Option<Box<dyn Subscriber<T>>>,
}

impl<T: Send + 'static> Subscriber<T> for DelaySubscriber<T> {
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        if self.shared.upstream.set(subscription.clone()).is_err() {
            subscription.cancel();
            return;
        }

        if let Some(downstream) = self.downstream.take() {
            self.shared.outlet.start(downstream, self.shared.clone());
        }
    }

    fn on_next(&mut self, value: T) {
        if !self.shared.outlet.is_terminated() {
            DelayShared::hold(&self.shared, value);
        }
    }

    fn on_error(&mut self, error: FluxError) {
        self.shared.fail(error);
    }

    fn on_complete(&mut self) {
        self.shared.upstream_complete();
    }
}

impl<T: Send + 'static> Flux<T> {
    /// Shifts every element by `delay`, one element at a time.
    ///
    /// The upstream is asked for one element, which is emitted `delay` later
    /// from a worker of `scheduler`; only then, and only if the downstream
    /// still has demand, is the next one requested.
    /// Errors are not delayed. Disposing `scheduler` while an element is held
    /// back fails the stream with [`FluxError::SchedulerShutdown`].
    pub fn delay_elements(&self, delay: Duration, scheduler: &Scheduler) -> Flux<T> {
        Flux::from_publisher(DelayElements {
            upstream: self.clone(),
            delay,
            scheduler: scheduler.clone(),
        })
    }

    /// Delays every element by `delay` from its arrival, independently of the
    /// others, keeping the upstream order.
    pub fn delay_element(&self, delay: Duration, scheduler: &Scheduler) -> Flux<T> {
        let scheduler = scheduler.clone();

        self.flat_map_sequential(
            move |value| Flux::single_use(value).delay_elements(delay, &scheduler),
            usize::MAX,
        )
    }
}
