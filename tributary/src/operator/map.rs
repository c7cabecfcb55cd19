use crate::core::{Flux, Publisher, Subscriber, Subscription};
use crate::error::FluxError;

use tracing::trace;

use std::sync::Arc;

type Mapper<T, U> = Arc<dyn Fn(T) -> Result<U, FluxError> + Send + Sync>;

struct Map<T, U> {
    upstream: Flux<T>,
    mapper: Mapper<T, U>,
    name: &'static str,
}

impl<T, U> Publisher<U> for Map<T, U>
where
    T: Send + 'static,
    U: Send + 'static,
{
    fn subscribe(&self, downstream: Box<dyn Subscriber<U>>) {
        self.upstream.subscribe_with(Box::new(MapSubscriber {
            downstream,
            mapper: self.mapper.clone(),
            name: self.name,
            upstream: None,
            done: false,
        }));
    }
}

struct MapSubscriber<T, U> {
    downstream: Box<dyn Subscriber<U>>,
    mapper: Mapper<T, U>,
    name: &'static str,
    upstream: Option<Arc<dyn Subscription>>,
    done: bool,
}

impl<T, U> Subscriber<T> for MapSubscriber<T, U>
where
    T: Send + 'static,
    U: Send + 'static,
{
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        self.upstream = Some(subscription.clone());
        self.downstream.on_subscribe(subscription);
    }

    fn on_next(&mut self, value: T) {
        if self.done {
            return;
        }

        let mapper = &self.mapper;

        match FluxError::catch(self.name, || mapper(value)).and_then(|mapped| mapped) {
            Ok(mapped) => self.downstream.on_next(mapped),
            Err(e) => {
                trace!(operator = self.name, error = %e, "mapper failed, cancelling upstream");
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

impl<T: Send + 'static> Flux<T> {
    /// Transforms every value with `f`.
    ///
    /// A panic in `f` fails the stream with [`FluxError::Panicked`] and
    /// cancels the upstream.
    pub fn map<U, F>(&self, f: F) -> Flux<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        Flux::from_publisher(Map {
            upstream: self.clone(),
            mapper: Arc::new(move |value| Ok(f(value))),
            name: "map",
        })
    }

    /// Transforms every value with a fallible `f`.
    ///
    /// An `Err` fails the stream with that error and cancels the upstream.
    pub fn try_map<U, F>(&self, f: F) -> Flux<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Result<U, FluxError> + Send + Sync + 'static,
    {
        Flux::from_publisher(Map {
            upstream: self.clone(),
            mapper: Arc::new(f),
            name: "try_map",
        })
    }
}
