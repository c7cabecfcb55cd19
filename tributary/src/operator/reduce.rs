//! Reducers: stages that consume the whole upstream before emitting.
//!
//! `reduce`, `count`, `collect_list` and `sort` are all an [`Aggregate`]:
//! an accumulator created per subscription, a fold applied to every value,
//! and a finisher turning the final accumulator into the values to emit.

use crate::core::subscription::UNBOUNDED;
use crate::core::{Flux, Publisher, Subscriber, Subscription};
use crate::error::FluxError;
use crate::flow::Outlet;

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

type Init<A> = Arc<dyn Fn() -> A + Send + Sync>;
type Fold<A, T> = Arc<dyn Fn(&mut A, T) -> Result<(), FluxError> + Send + Sync>;
type Finish<A, O> = Arc<dyn Fn(A) -> Vec<O> + Send + Sync>;

struct Aggregate<T, A, O> {
    upstream: Flux<T>,
    init: Init<A>,
    fold: Fold<A, T>,
    finish: Finish<A, O>,
    name: &'static str,
}

impl<T, A, O> Publisher<O> for Aggregate<T, A, O>
where
    T: Send + 'static,
    A: Send + 'static,
    O: Send + 'static,
{
    fn subscribe(&self, downstream: Box<dyn Subscriber<O>>) {
        let shared = Arc::new(AggregateShared {
            outlet: Outlet::new(),
            upstream: OnceLock::new(),
            started: AtomicBool::new(false),
        });

        self.upstream.subscribe_with(Box::new(AggregateSubscriber {
            shared,
            downstream: Some(downstream),
            acc: Some((self.init)()),
            fold: self.fold.clone(),
            finish: self.finish.clone(),
            name: self.name,
        }));
    }
}

struct AggregateShared<O> {
    outlet: Outlet<O>,
    upstream: OnceLock<Arc<dyn Subscription>>,
    started: AtomicBool,
}

impl<O: Send + 'static> AggregateShared<O> {
    fn cancel_upstream(&self) {
        if let Some(upstream) = self.upstream.get() {
            upstream.cancel();
        }
    }
}

impl<O: Send + 'static> Subscription for AggregateShared<O> {
    fn request(&self, n: u64) {
        if !self.outlet.request(n) {
            self.cancel_upstream();
            return;
        }

        if !self.started.swap(true, Ordering::AcqRel)
            && let Some(upstream) = self.upstream.get()
        {
            upstream.request(UNBOUNDED);
        }
    }

    fn cancel(&self) {
        self.outlet.cancel();
        self.cancel_upstream();
    }
}

struct AggregateSubscriber<T, A, O> {
    shared: Arc<AggregateShared<O>>,
    downstream: Option<Box<dyn Subscriber<O>>>,
    acc: Option<A>,
    fold: Fold<A, T>,
    finish: Finish<A, O>,
    name: &'static str,
}

impl<T, A, O> Subscriber<T> for AggregateSubscriber<T, A, O>
where
    T: Send + 'static,
    A: Send + 'static,
    O: Send + 'static,
{
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        let _ = self.shared.upstream.set(subscription);

        if let Some(downstream) = self.downstream.take() {
            self.shared.outlet.start(downstream, self.shared.clone());
        }
    }

    fn on_next(&mut self, value: T) {
        let Some(acc) = self.acc.as_mut() else {
            return;
        };

        let fold = &self.fold;

        if let Err(e) = FluxError::catch(self.name, || fold(acc, value)).and_then(|r| r) {
            self.acc = None;
            self.shared.cancel_upstream();
            self.shared.outlet.error(e);
        }
    }

    fn on_error(&mut self, error: FluxError) {
        self.acc = None;
        self.shared.outlet.error(error);
    }

    fn on_complete(&mut self) {
        let Some(acc) = self.acc.take() else {
            return;
        };

        let finish = &self.finish;

        match FluxError::catch(self.name, || finish(acc)) {
            Ok(values) => {
                for value in values {
                    self.shared.outlet.push(value);
                }
                self.shared.outlet.complete();
            }
            Err(e) => {
                self.shared.outlet.error(e);
            }
        }
    }
}

impl<T: Send + 'static> Flux<T> {
    fn aggregate<A, O>(
        &self,
        name: &'static str,
        init: Init<A>,
        fold: Fold<A, T>,
        finish: Finish<A, O>,
    ) -> Flux<O>
    where
        A: Send + 'static,
        O: Send + 'static,
    {
        Flux::from_publisher(Aggregate {
            upstream: self.clone(),
            init,
            fold,
            finish,
            name,
        })
    }

    /// Folds every value into `seed` with `f` and emits the result once the
    /// upstream completes.
    ///
    /// An empty upstream emits `seed`. If the upstream fails nothing is
    /// emitted besides the error.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let sum = Flux::range(1, 5).reduce(0, |acc, n| acc + n).block_last()?;
    /// assert_eq!(sum, Some(15));
    /// ```
    pub fn reduce<A, F>(&self, seed: A, f: F) -> Flux<A>
    where
        A: Clone + Send + Sync + 'static,
        F: Fn(A, T) -> A + Send + Sync + 'static,
    {
        self.aggregate::<Option<A>, A>(
            "reduce",
            Arc::new(move || Some(seed.clone())),
            Arc::new(move |acc: &mut Option<A>, value: T| {
                if let Some(current) = acc.take() {
                    *acc = Some(f(current, value));
                }
                Ok(())
            }),
            Arc::new(|acc: Option<A>| acc.into_iter().collect()),
        )
    }

    /// Emits the number of values once the upstream completes.
    pub fn count(&self) -> Flux<u64> {
        self.aggregate::<u64, u64>(
            "count",
            Arc::new(|| 0u64),
            Arc::new(|acc: &mut u64, _value: T| {
                *acc += 1;
                Ok(())
            }),
            Arc::new(|acc: u64| vec![acc]),
        )
    }

    /// Emits every value as one `Vec` once the upstream completes.
    pub fn collect_list(&self) -> Flux<Vec<T>> {
        self.aggregate::<Vec<T>, Vec<T>>(
            "collect_list",
            Arc::new(Vec::new),
            Arc::new(|acc: &mut Vec<T>, value: T| {
                acc.push(value);
                Ok(())
            }),
            Arc::new(|acc: Vec<T>| vec![acc]),
        )
    }

    /// Buffers every value and emits them in ascending order once the
    /// upstream completes.
    pub fn sort(&self) -> Flux<T>
    where
        T: Ord,
    {
        self.sort_by(T::cmp)
    }

    /// Like [`sort`](Self::sort) with a custom comparator. The sort is stable.
    pub fn sort_by<F>(&self, compare: F) -> Flux<T>
    where
        F: Fn(&T, &T) -> CmpOrdering + Send + Sync + 'static,
    {
        self.aggregate::<Vec<T>, T>(
            "sort",
            Arc::new(Vec::new),
            Arc::new(|acc: &mut Vec<T>, value: T| {
                acc.push(value);
                Ok(())
            }),
            Arc::new(move |mut acc: Vec<T>| {
                acc.sort_by(&compare);
                acc
            }),
        )
    }
}
