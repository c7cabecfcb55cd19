use super::{INNER_PREFETCH, outer_request};
use crate::core::{Flux, Publisher, Subscriber, Subscription};
use crate::error::FluxError;
use crate::flow::{Outlet, Trampoline, lock};

use tracing::trace;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

type Mapper<T, U> = Arc<dyn Fn(T) -> Flux<U> + Send + Sync>;

struct FlatMapSequential<T, U> {
    upstream: Flux<T>,
    mapper: Mapper<T, U>,
    concurrency: usize,
}

impl<T, U> Publisher<U> for FlatMapSequential<T, U>
where
    T: Send + 'static,
    U: Send + 'static,
{
    fn subscribe(&self, downstream: Box<dyn Subscriber<U>>) {
        let shared = Arc::new(SequentialShared {
            outlet: Outlet::new(),
            upstream: OnceLock::new(),
            state: Mutex::new(Rails {
                queue: VecDeque::new(),
                outer_done: false,
            }),
            trampoline: Trampoline::new(),
        });

        self.upstream.subscribe_with(Box::new(SequentialOuter {
            shared,
            downstream: Some(downstream),
            mapper: self.mapper.clone(),
            concurrency: self.concurrency,
            done: false,
        }));
    }
}

/// Buffered output of one inner publisher.
struct Rail<U> {
    values: Mutex<VecDeque<U>>,
    done: AtomicBool,
    subscription: OnceLock<Arc<dyn Subscription>>,
}

impl<U> Rail<U> {
    fn new() -> Self {
        Self {
            values: Mutex::new(VecDeque::new()),
            done: AtomicBool::new(false),
            subscription: OnceLock::new(),
        }
    }

    fn cancel(&self) {
        if let Some(subscription) = self.subscription.get() {
            subscription.cancel();
        }

        lock(&self.values).clear();
    }
}

struct Rails<U> {
    /// Rails in outer emission order; only the head one is emitted from.
    queue: VecDeque<Arc<Rail<U>>>,
    outer_done: bool,
}

struct SequentialShared<U> {
    outlet: Outlet<U>,
    upstream: OnceLock<Arc<dyn Subscription>>,
    state: Mutex<Rails<U>>,
    trampoline: Trampoline,
}

impl<U: Send + 'static> SequentialShared<U> {
    fn drain(&self) {
        self.trampoline.run(|| self.drain_once());
    }

    /// Moves values from the head rail into the outlet, as far as demand
    /// allows, and retires finished rails.
    fn drain_once(&self) {
        loop {
            if self.outlet.is_terminated() {
                return;
            }

            let head = lock(&self.state).queue.front().cloned();

            let Some(rail) = head else {
                if lock(&self.state).outer_done {
                    self.outlet.complete();
                }
                return;
            };

            while self.outlet.unfulfilled() > 0 {
                let Some(value) = lock(&rail.values).pop_front() else {
                    break;
                };

                match rail.subscription.get() {
                    Some(subscription) => self.outlet.push_with_credit(value, subscription.clone()),
                    None => self.outlet.push(value),
                };
            }

            let exhausted = rail.done.load(Ordering::Acquire) && lock(&rail.values).is_empty();

            if !exhausted {
                return;
            }

            let outer_done = {
                let mut state = lock(&self.state);
                state.queue.pop_front();
                state.outer_done
            };

            if !outer_done && let Some(upstream) = self.upstream.get() {
                upstream.request(1);
            }
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

        let rails: Vec<_> = lock(&self.state).queue.drain(..).collect();

        for rail in rails {
            rail.cancel();
        }
    }
}

impl<U: Send + 'static> Subscription for SequentialShared<U> {
    fn request(&self, n: u64) {
        if self.outlet.request(n) {
            self.drain();
        } else {
            self.cancel_all();
        }
    }

    fn cancel(&self) {
        self.outlet.cancel();
        self.cancel_all();
    }
}

struct SequentialOuter<T, U> {
    shared: Arc<SequentialShared<U>>,
    downstream: Option<Box<dyn Subscriber<U>>>,
    mapper: Mapper<T, U>,
    concurrency: usize,
    done: bool,
}

impl<T, U> Subscriber<T> for SequentialOuter<T, U>
where
    T: Send + 'static,
    U: Send + 'static,
{
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        if self.shared.upstream.set(subscription.clone()).is_err() {
            subscription.cancel();
            return;
        }

        if let Some(downstream) = self.downstream.take() {
            self.shared.outlet.start(downstream, self.shared.clone());
        }

        if !self.shared.outlet.is_terminated() {
            subscription.request(outer_request(self.concurrency));
        }
    }

    fn on_next(&mut self, value: T) {
        if self.done {
            return;
        }

        let mapper = &self.mapper;

        let inner = match FluxError::catch("flat_map_sequential", || mapper(value)) {
            Ok(inner) => inner,
            Err(e) => {
                self.done = true;
                self.shared.fail(e);
                return;
            }
        };

        let rail = Arc::new(Rail::new());
        lock(&self.shared.state).queue.push_back(rail.clone());

        trace!("flat_map_sequential subscribing inner");

        inner.subscribe_with(Box::new(SequentialInner {
            shared: self.shared.clone(),
            rail,
        }));
    }

    fn on_error(&mut self, error: FluxError) {
        if !self.done {
            self.done = true;
            self.shared.fail(error);
        }
    }

    fn on_complete(&mut self) {
        if self.done {
            return;
        }

        self.done = true;
        lock(&self.shared.state).outer_done = true;
        self.shared.drain();
    }
}

struct SequentialInner<U> {
    shared: Arc<SequentialShared<U>>,
    rail: Arc<Rail<U>>,
}

impl<U: Send + 'static> Subscriber<U> for SequentialInner<U> {
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        if self.rail.subscription.set(subscription.clone()).is_err()
            || self.shared.outlet.is_terminated()
        {
            subscription.cancel();
            return;
        }

        subscription.request(INNER_PREFETCH);
    }

    fn on_next(&mut self, value: U) {
        if self.shared.outlet.is_terminated() {
            return;
        }

        lock(&self.rail.values).push_back(value);
        self.shared.drain();
    }

    fn on_error(&mut self, error: FluxError) {
        self.shared.fail(error);
    }

    fn on_complete(&mut self) {
        self.rail.done.store(true, Ordering::Release);
        self.shared.drain();
    }
}

impl<T: Send + 'static> Flux<T> {
    /// Maps every value to an inner publisher and emits the inner values in
    /// the order of the outer values that produced them.
    ///
    /// Up to `concurrency` inner publishers run at once (`usize::MAX` for no
    /// limit); values of an inner that is not yet at the head are buffered
    /// until every earlier inner has completed.
    pub fn flat_map_sequential<U, F>(&self, f: F, concurrency: usize) -> Flux<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Flux<U> + Send + Sync + 'static,
    {
        Flux::from_publisher(FlatMapSequential {
            upstream: self.clone(),
            mapper: Arc::new(f),
            concurrency: concurrency.max(1),
        })
    }

    /// Maps every value to an inner publisher and subscribes to them one at a
    /// time, emitting the values of each in turn.
    pub fn concat_map<U, F>(&self, f: F) -> Flux<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Flux<U> + Send + Sync + 'static,
    {
        self.flat_map_sequential(f, 1)
    }
}
