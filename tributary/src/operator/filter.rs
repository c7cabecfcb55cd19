use crate::core::{Flux, Publisher, Subscriber, Subscription};
use crate::error::FluxError;

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Arc;

type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

struct Filter<T> {
    upstream: Flux<T>,
    predicate: Predicate<T>,
}

impl<T: Send + 'static> Publisher<T> for Filter<T> {
    fn subscribe(&self, downstream: Box<dyn Subscriber<T>>) {
        self.upstream.subscribe_with(Box::new(FilterSubscriber {
            downstream,
            predicate: self.predicate.clone(),
            upstream: None,
            done: false,
        }));
    }
}

struct FilterSubscriber<T> {
    downstream: Box<dyn Subscriber<T>>,
    predicate: Predicate<T>,
    upstream: Option<Arc<dyn Subscription>>,
    done: bool,
}

impl<T: Send + 'static> Subscriber<T> for FilterSubscriber<T> {
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        self.upstream = Some(subscription.clone());
        self.downstream.on_subscribe(subscription);
    }

    fn on_next(&mut self, value: T) {
        if self.done {
            return;
        }

        let predicate = &self.predicate;

        match FluxError::catch("filter", || predicate(&value)) {
            Ok(true) => self.downstream.on_next(value),
            Ok(false) => {
                // The dropped value consumed one unit of downstream demand.
                if let Some(upstream) = &self.upstream {
                    upstream.request(1);
                }
            }
            Err(e) => {
                self.done = true;

                if let Some(upstream) = self.upstream.take() {
                    upstream.cancel();
                }

                self.downstream.on_error(e);
            }
        }
    }

    fn on_error(&mut self, error: FluxError) {
        if !self.done {
            self.done = true;
            self.downstream.on_error(error);
        }
    }

    fn on_complete(&mut self) {
        if !self.done {
            self.done = true;
            self.downstream.on_complete();
        }
    }
}

struct Distinct<T> {
    upstream: Flux<T>,
}

impl<T> Publisher<T> for Distinct<T>
where
    T: Eq + Hash + Clone + Send + 'static,
{
    fn subscribe(&self, downstream: Box<dyn Subscriber<T>>) {
        self.upstream.subscribe_with(Box::new(DistinctSubscriber {
            downstream,
            seen: HashSet::new(),
            upstream: None,
        }));
    }
}

struct DistinctSubscriber<T> {
    downstream: Box<dyn Subscriber<T>>,
    seen: HashSet<T>,
    upstream: Option<Arc<dyn Subscription>>,
}

impl<T> Subscriber<T> for DistinctSubscriber<T>
where
    T: Eq + Hash + Clone + Send + 'static,
{
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        self.upstream = Some(subscription.clone());
        self.downstream.on_subscribe(subscription);
    }

    fn on_next(&mut self, value: T) {
        if self.seen.insert(value.clone()) {
            self.downstream.on_next(value);
        } else if let Some(upstream) = &self.upstream {
            upstream.request(1);
        }
    }

    fn on_error(&mut self, error: FluxError) {
        self.seen = HashSet::new();
        self.downstream.on_error(error);
    }

    fn on_complete(&mut self) {
        self.seen = HashSet::new();
        self.downstream.on_complete();
    }
}

impl<T: Send + 'static> Flux<T> {
    /// Keeps only the values matching `predicate`.
    ///
    /// Each dropped value is replaced by a request for one more upstream
    /// value, so downstream demand is still honoured.
    pub fn filter<P>(&self, predicate: P) -> Flux<T>
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Flux::from_publisher(Filter {
            upstream: self.clone(),
            predicate: Arc::new(predicate),
        })
    }

    /// Suppresses values equal to one already emitted in this subscription.
    ///
    /// The set of seen values lives as long as the subscription.
    pub fn distinct(&self) -> Flux<T>
    where
        T: Eq + Hash + Clone,
    {
        Flux::from_publisher(Distinct {
            upstream: self.clone(),
        })
    }
}
