use crate::core::{Flux, Publisher, Subscriber, Subscription};
use crate::error::FluxError;
use crate::flow::{Relay, RelayHooks, RelaySubscriber, Trampoline};

use tracing::trace;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

struct Concat<T> {
    sources: Arc<[Flux<T>]>,
}

impl<T: Send + 'static> Publisher<T> for Concat<T> {
    fn subscribe(&self, downstream: Box<dyn Subscriber<T>>) {
        let shared = Arc::new(ConcatShared {
            relay: Relay::new(),
            sources: self.sources.clone(),
            index: AtomicUsize::new(0),
            trampoline: Trampoline::new(),
        });

        shared.relay.start(downstream, shared.clone());
        ConcatShared::subscribe_next(&shared);
    }
}

struct ConcatShared<T> {
    relay: Relay<T>,
    sources: Arc<[Flux<T>]>,
    index: AtomicUsize,
    trampoline: Trampoline,
}

impl<T: Send + 'static> ConcatShared<T> {
    /// Subscribes to the next source, or completes after the last one.
    ///
    /// Trampolined so that a chain of synchronous sources completing inside
    /// `subscribe` does not grow the stack.
    fn subscribe_next(this: &Arc<Self>) {
        this.trampoline.run(|| {
            if this.relay.is_terminated() {
                return;
            }

            let index = this.index.fetch_add(1, Ordering::AcqRel);

            match this.sources.get(index) {
                Some(source) => {
                    trace!(index, "concat subscribing to next source");
                    source.subscribe_with(Box::new(RelaySubscriber::new(this.clone())));
                }
                None => this.relay.complete(),
            }
        });
    }
}

impl<T: Send + 'static> RelayHooks<T> for ConcatShared<T> {
    fn relay(&self) -> &Relay<T> {
        &self.relay
    }

    fn upstream_error(this: &Arc<Self>, error: FluxError) {
        this.relay.error(error);
    }

    fn upstream_complete(this: &Arc<Self>) {
        Self::subscribe_next(this);
    }
}

impl<T: Send + 'static> Subscription for ConcatShared<T> {
    fn request(&self, n: u64) {
        self.relay.request(n);
    }

    fn cancel(&self) {
        self.relay.cancel();
    }
}

impl<T: Send + 'static> Flux<T> {
    /// Emits all values of each source in turn, subscribing to a source only
    /// after the previous one completed.
    ///
    /// Outstanding demand carries over from one source to the next. An error
    /// stops the sequence; later sources are never subscribed.
    pub fn concat(sources: Vec<Flux<T>>) -> Flux<T> {
        Flux::from_publisher(Concat {
            sources: sources.into(),
        })
    }

    /// Emits the values of `self`, then those of `other`.
    pub fn concat_with(&self, other: Flux<T>) -> Flux<T> {
        Flux::concat(vec![self.clone(), other])
    }
}
