use super::INNER_PREFETCH;
use crate::core::subscriber::complete_now;
use crate::core::{Flux, Publisher, Subscriber, Subscription};
use crate::error::FluxError;
use crate::flow::{Outlet, lock};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

struct Merge<T> {
    sources: Arc<[Flux<T>]>,
    prefetch: u64,
}

impl<T: Send + 'static> Publisher<T> for Merge<T> {
    fn subscribe(&self, downstream: Box<dyn Subscriber<T>>) {
        if self.sources.is_empty() {
            complete_now(downstream);
            return;
        }

        let shared = Arc::new(MergeShared {
            outlet: Outlet::new(),
            inners: Mutex::new(vec![None; self.sources.len()]),
            remaining: AtomicUsize::new(self.sources.len()),
        });

        shared.outlet.start(downstream, shared.clone());

        for (index, source) in self.sources.iter().enumerate() {
            if shared.outlet.is_terminated() {
                break;
            }

            source.subscribe_with(Box::new(MergeInner {
                shared: shared.clone(),
                index,
                prefetch: self.prefetch,
                subscription: None,
            }));
        }
    }
}

struct MergeShared<T> {
    outlet: Outlet<T>,
    inners: Mutex<Vec<Option<Arc<dyn Subscription>>>>,
    remaining: AtomicUsize,
}

impl<T: Send + 'static> MergeShared<T> {
    fn fail(&self, error: FluxError) {
        if self.outlet.error(error) {
            self.cancel_inners();
        }
    }

    fn cancel_inners(&self) {
        let inners: Vec<_> = lock(&self.inners)
            .iter_mut()
            .filter_map(Option::take)
            .collect();

        for inner in inners {
            inner.cancel();
        }
    }
}

impl<T: Send + 'static> Subscription for MergeShared<T> {
    fn request(&self, n: u64) {
        if !self.outlet.request(n) {
            self.cancel_inners();
        }
    }

    fn cancel(&self) {
        self.outlet.cancel();
        self.cancel_inners();
    }
}

struct MergeInner<T> {
    shared: Arc<MergeShared<T>>,
    index: usize,
    prefetch: u64,
    subscription: Option<Arc<dyn Subscription>>,
}

impl<T: Send + 'static> Subscriber<T> for MergeInner<T> {
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        {
            let mut inners = lock(&self.shared.inners);

            if self.shared.outlet.is_terminated() {
                drop(inners);
                subscription.cancel();
                return;
            }

            inners[self.index] = Some(subscription.clone());
        }

        self.subscription = Some(subscription.clone());
        subscription.request(self.prefetch);
    }

    fn on_next(&mut self, value: T) {
        match &self.subscription {
            Some(subscription) => self.shared.outlet.push_with_credit(value, subscription.clone()),
            None => self.shared.outlet.push(value),
        };
    }

    fn on_error(&mut self, error: FluxError) {
        self.shared.fail(error);
    }

    fn on_complete(&mut self) {
        lock(&self.shared.inners)[self.index] = None;

        if self.shared.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.shared.outlet.complete();
        }
    }
}

impl<T: Send + 'static> Flux<T> {
    /// Subscribes to every source at once and emits their values in arrival
    /// order.
    ///
    /// Completes when all sources have completed. The first error fails the
    /// result and cancels the remaining sources.
    pub fn merge(sources: Vec<Flux<T>>) -> Flux<T> {
        Flux::from_publisher(Merge {
            sources: sources.into(),
            prefetch: INNER_PREFETCH,
        })
    }

    /// Merges `self` with `other`.
    pub fn merge_with(&self, other: Flux<T>) -> Flux<T> {
        Flux::merge(vec![self.clone(), other])
    }
}
