use super::{INNER_PREFETCH, outer_request};
use crate::core::{Flux, Publisher, Subscriber, Subscription};
use crate::error::FluxError;
use crate::flow::{Outlet, lock};
use crate::utils::Slab;

use tracing::trace;

use std::sync::{Arc, Mutex, OnceLock};

type Mapper<T, U> = Arc<dyn Fn(T) -> Flux<U> + Send + Sync>;

struct FlatMap<T, U> {
    upstream: Flux<T>,
    mapper: Mapper<T, U>,
    concurrency: usize,
}

impl<T, U> Publisher<U> for FlatMap<T, U>
where
    T: Send + 'static,
    U: Send + 'static,
{
    fn subscribe(&self, downstream: Box<dyn Subscriber<U>>) {
        let shared = Arc::new(FlatMapShared {
            outlet: Outlet::new(),
            upstream: OnceLock::new(),
            inners: Mutex::new(Slab::with_capacity(self.concurrency.min(16))),
            state: Mutex::new(Progress {
                active: 0,
                outer_done: false,
            }),
        });

        self.upstream.subscribe_with(Box::new(FlatMapOuter {
            shared,
            downstream: Some(downstream),
            mapper: self.mapper.clone(),
            concurrency: self.concurrency,
            done: false,
        }));
    }
}

struct Progress {
    /// Inner publishers subscribed and not yet completed.
    active: usize,
    outer_done: bool,
}

struct FlatMapShared<U> {
    outlet: Outlet<U>,
    upstream: OnceLock<Arc<dyn Subscription>>,

    /// Subscriptions of the live inner publishers, keyed by slot.
    inners: Mutex<Slab<Option<Arc<dyn Subscription>>>>,

    state: Mutex<Progress>,
}

impl<U: Send + 'static> FlatMapShared<U> {
    fn fail(&self, error: FluxError) {
        if self.outlet.error(error) {
            self.cancel_all();
        }
    }

    fn cancel_all(&self) {
        if let Some(upstream) = self.upstream.get() {
            upstream.cancel();
        }

        let inners = lock(&self.inners).drain();

        for inner in inners.into_iter().flatten() {
            inner.cancel();
        }
    }

    fn inner_complete(&self, key: usize) {
        lock(&self.inners).remove(key);

        let finished = {
            let mut state = lock(&self.state);
            state.active -= 1;
            state.outer_done && state.active == 0
        };

        if finished {
            self.outlet.complete();
        } else if let Some(upstream) = self.upstream.get() {
            upstream.request(1);
        }
    }
}

impl<U: Send + 'static> Subscription for FlatMapShared<U> {
    fn request(&self, n: u64) {
        if !self.outlet.request(n) {
            self.cancel_all();
        }
    }

    fn cancel(&self) {
        self.outlet.cancel();
        self.cancel_all();
    }
}

struct FlatMapOuter<T, U> {
    shared: Arc<FlatMapShared<U>>,
    downstream: Option<Box<dyn Subscriber<U>>>,
    mapper: Mapper<T, U>,
    concurrency: usize,
    done: bool,
}

impl<T, U> FlatMapOuter<T, U>
where
    T: Send + 'static,
    U: Send + 'static,
{
    fn fail(&mut self, error: FluxError) {
        self.done = true;
        self.shared.fail(error);
    }
}

impl<T, U> Subscriber<T> for FlatMapOuter<T, U>
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

        let inner = match FluxError::catch("flat_map", || mapper(value)) {
            Ok(inner) => inner,
            Err(e) => {
                self.fail(e);
                return;
            }
        };

        lock(&self.shared.state).active += 1;
        let key = lock(&self.shared.inners).insert(None);

        trace!(key, "flat_map subscribing inner");

        inner.subscribe_with(Box::new(FlatMapInner {
            shared: self.shared.clone(),
            key,
            subscription: None,
        }));
    }

    fn on_error(&mut self, error: FluxError) {
        if !self.done {
            self.fail(error);
        }
    }

    fn on_complete(&mut self) {
        if self.done {
            return;
        }

        self.done = true;

        let finished = {
            let mut state = lock(&self.shared.state);
            state.outer_done = true;
            state.active == 0
        };

        if finished {
            self.shared.outlet.complete();
        }
    }
}

struct FlatMapInner<U> {
    shared: Arc<FlatMapShared<U>>,
    key: usize,
    subscription: Option<Arc<dyn Subscription>>,
}

impl<U: Send + 'static> Subscriber<U> for FlatMapInner<U> {
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        {
            let mut inners = lock(&self.shared.inners);

            if self.shared.outlet.is_terminated() {
                drop(inners);
                subscription.cancel();
                return;
            }

            if let Some(slot) = inners.get_mut(self.key) {
                *slot = Some(subscription.clone());
            }
        }

        self.subscription = Some(subscription.clone());
        subscription.request(INNER_PREFETCH);
    }

    fn on_next(&mut self, value: U) {
        match &self.subscription {
            Some(subscription) => self.shared.outlet.push_with_credit(value, subscription.clone()),
            None => self.shared.outlet.push(value),
        };
    }

    fn on_error(&mut self, error: FluxError) {
        self.shared.fail(error);
    }

    fn on_complete(&mut self) {
        self.shared.inner_complete(self.key);
    }
}

impl<T: Send + 'static> Flux<T> {
    /// Maps every value to an inner publisher and merges the inner values in
    /// arrival order.
    ///
    /// At most `concurrency` inner publishers are subscribed at once
    /// (`usize::MAX` for no limit). Each inner is asked for
    /// [`INNER_PREFETCH`] values up front and replenished as its values are
    /// delivered. Any error, outer or inner, fails the result and cancels
    /// everything else.
    pub fn flat_map<U, F>(&self, f: F, concurrency: usize) -> Flux<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Flux<U> + Send + Sync + 'static,
    {
        Flux::from_publisher(FlatMap {
            upstream: self.clone(),
            mapper: Arc::new(f),
            concurrency: concurrency.max(1),
        })
    }
}
