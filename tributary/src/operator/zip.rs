use super::INNER_PREFETCH;
use crate::core::subscriber::complete_now;
use crate::core::{Flux, Publisher, Subscriber, Subscription};
use crate::error::FluxError;
use crate::flow::{Outlet, Trampoline, lock};

use tracing::trace;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

struct ZipAll<T> {
    sources: Arc<[Flux<T>]>,
}

impl<T: Send + 'static> Publisher<Vec<T>> for ZipAll<T> {
    fn subscribe(&self, downstream: Box<dyn Subscriber<Vec<T>>>) {
        let width = self.sources.len();

        if width == 0 {
            complete_now(downstream);
            return;
        }

        let shared = Arc::new(ZipShared {
            outlet: Outlet::new(),
            state: Mutex::new(ZipState {
                queues: (0..width).map(|_| VecDeque::new()).collect(),
                done: vec![false; width],
                subscriptions: vec![None; width],
            }),
            trampoline: Trampoline::new(),
        });

        shared.outlet.start(downstream, shared.clone());

        for (index, source) in self.sources.iter().enumerate() {
            if shared.outlet.is_terminated() {
                break;
            }

            source.subscribe_with(Box::new(ZipInner {
                shared: shared.clone(),
                index,
            }));
        }
    }
}

struct ZipState<T> {
    queues: Vec<VecDeque<T>>,
    done: Vec<bool>,
    subscriptions: Vec<Option<Arc<dyn Subscription>>>,
}

impl<T> ZipState<T> {
    /// A source that completed with nothing buffered can never fill another
    /// row.
    fn is_exhausted(&self) -> bool {
        self.queues
            .iter()
            .zip(&self.done)
            .any(|(queue, done)| *done && queue.is_empty())
    }

    fn take_row(&mut self) -> Option<Vec<T>> {
        if self.queues.iter().any(VecDeque::is_empty) {
            return None;
        }

        Some(
            self.queues
                .iter_mut()
                .filter_map(VecDeque::pop_front)
                .collect(),
        )
    }
}

enum Step<T> {
    Row(Vec<T>, Vec<Arc<dyn Subscription>>),
    Finish,
    Idle,
}

struct ZipShared<T> {
    outlet: Outlet<Vec<T>>,
    state: Mutex<ZipState<T>>,
    trampoline: Trampoline,
}

impl<T: Send + 'static> ZipShared<T> {
    fn drain(&self) {
        self.trampoline.run(|| self.drain_once());
    }

    /// Emits rows while the downstream has demand for them.
    fn drain_once(&self) {
        loop {
            if self.outlet.is_terminated() {
                return;
            }

            let step = {
                let mut state = lock(&self.state);

                if self.outlet.unfulfilled() > 0
                    && let Some(row) = state.take_row()
                {
                    let sources = state.subscriptions.iter().flatten().cloned().collect();
                    Step::Row(row, sources)
                } else if state.is_exhausted() {
                    Step::Finish
                } else {
                    Step::Idle
                }
            };

            match step {
                Step::Row(row, sources) => {
                    self.outlet.push(row);

                    for source in sources {
                        source.request(1);
                    }
                }
                Step::Finish => {
                    trace!("zip source exhausted, completing");
                    self.outlet.complete();
                    self.cancel_sources();
                    return;
                }
                Step::Idle => return,
            }
        }
    }

    fn fail(&self, error: FluxError) {
        if self.outlet.error(error) {
            self.cancel_sources();
        }
    }

    fn cancel_sources(&self) {
        let sources: Vec<_> = lock(&self.state)
            .subscriptions
            .iter_mut()
            .filter_map(Option::take)
            .collect();

        for source in sources {
            source.cancel();
        }
    }
}

impl<T: Send + 'static> Subscription for ZipShared<T> {
    fn request(&self, n: u64) {
        if self.outlet.request(n) {
            self.drain();
        } else {
            self.cancel_sources();
        }
    }

    fn cancel(&self) {
        self.outlet.cancel();
        self.cancel_sources();
    }
}

struct ZipInner<T> {
    shared: Arc<ZipShared<T>>,
    index: usize,
}

impl<T: Send + 'static> Subscriber<T> for ZipInner<T> {
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        {
            let mut state = lock(&self.shared.state);

            if self.shared.outlet.is_terminated() {
                drop(state);
                subscription.cancel();
                return;
            }

            state.subscriptions[self.index] = Some(subscription.clone());
        }

        subscription.request(INNER_PREFETCH);
    }

    fn on_next(&mut self, value: T) {
        lock(&self.shared.state).queues[self.index].push_back(value);
        self.shared.drain();
    }

    fn on_error(&mut self, error: FluxError) {
        self.shared.fail(error);
    }

    fn on_complete(&mut self) {
        lock(&self.shared.state).done[self.index] = true;
        self.shared.drain();
    }
}

/// One side of a two-way zip, so both sides fit one `zip_all`.
enum Side<A, B> {
    First(A),
    Second(B),
}

impl<T: Send + 'static> Flux<T> {
    /// Combines the k-th values of every source into one `Vec`, in source
    /// order.
    ///
    /// Completes as soon as any source has completed and its buffered values
    /// are used up, cancelling the others. An error from any source fails
    /// the result and cancels the others. With no sources, completes
    /// immediately.
    pub fn zip_all(sources: Vec<Flux<T>>) -> Flux<Vec<T>> {
        Flux::from_publisher(ZipAll {
            sources: sources.into(),
        })
    }

    /// Pairs the k-th values of `first` and `second`.
    pub fn zip<B>(first: Flux<T>, second: Flux<B>) -> Flux<(T, B)>
    where
        B: Send + 'static,
    {
        let sides = vec![first.map(Side::First), second.map(Side::Second)];

        Flux::zip_all(sides).try_map(|row: Vec<Side<T, B>>| {
            let mut row = row.into_iter();

            match (row.next(), row.next()) {
                (Some(Side::First(a)), Some(Side::Second(b))) => Ok((a, b)),
                _ => Err(FluxError::Operator {
                    operator: "zip",
                    message: "row out of order".to_owned(),
                }),
            }
        })
    }

    /// Pairs the k-th values of `self` and `other` and combines them with
    /// `f`.
    pub fn zip_with<B, R, F>(&self, other: Flux<B>, f: F) -> Flux<R>
    where
        B: Send + 'static,
        R: Send + 'static,
        F: Fn(T, B) -> R + Send + Sync + 'static,
    {
        Flux::zip(self.clone(), other).map(move |(a, b)| f(a, b))
    }
}
