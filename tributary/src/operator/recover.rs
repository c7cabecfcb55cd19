use crate::core::{Flux, Publisher, Subscriber, Subscription};
use crate::error::FluxError;
use crate::flow::{Relay, RelayHooks, RelaySubscriber};

use tracing::debug;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

type Fallback<T> = Arc<dyn Fn(FluxError) -> Flux<T> + Send + Sync>;

struct Resume<T> {
    upstream: Flux<T>,
    fallback: Fallback<T>,
}

impl<T: Send + 'static> Publisher<T> for Resume<T> {
    fn subscribe(&self, downstream: Box<dyn Subscriber<T>>) {
        let shared = Arc::new(ResumeShared {
            relay: Relay::new(),
            fallback: self.fallback.clone(),
            resumed: AtomicBool::new(false),
        });

        shared.relay.start(downstream, shared.clone());

        if !shared.relay.is_terminated() {
            self.upstream
                .subscribe_with(Box::new(RelaySubscriber::new(shared.clone())));
        }
    }
}

struct ResumeShared<T> {
    relay: Relay<T>,
    fallback: Fallback<T>,
    resumed: AtomicBool,
}

impl<T: Send + 'static> RelayHooks<T> for ResumeShared<T> {
    fn relay(&self) -> &Relay<T> {
        &self.relay
    }

    fn upstream_error(this: &Arc<Self>, error: FluxError) {
        // Only the first upstream is recovered, and never from a
        // protocol violation.
        if !error.is_recoverable() || this.resumed.swap(true, Ordering::AcqRel) {
            this.relay.error(error);
            return;
        }

        debug!(error = %error, label = error.as_label(), "resuming with fallback");

        let fallback = &this.fallback;

        match FluxError::catch("on_error_resume", || fallback(error)) {
            Ok(flux) => flux.subscribe_with(Box::new(RelaySubscriber::new(this.clone()))),
            Err(e) => this.relay.error(e),
        }
    }

    fn upstream_complete(this: &Arc<Self>) {
        this.relay.complete();
    }
}

impl<T: Send + 'static> Subscription for ResumeShared<T> {
    fn request(&self, n: u64) {
        self.relay.request(n);
    }

    fn cancel(&self) {
        self.relay.cancel();
    }
}

impl<T: Send + 'static> Flux<T> {
    /// On error, continues with the publisher returned by `fallback`.
    ///
    /// Values already emitted stay emitted; outstanding demand carries over
    /// to the fallback. Errors raised by the fallback itself, and protocol
    /// violations, are passed through.
    pub fn on_error_resume<F>(&self, fallback: F) -> Flux<T>
    where
        F: Fn(FluxError) -> Flux<T> + Send + Sync + 'static,
    {
        Flux::from_publisher(Resume {
            upstream: self.clone(),
            fallback: Arc::new(fallback),
        })
    }

    /// On error, emits `value` and completes.
    ///
    /// The fallback value waits for demand like any other value.
    pub fn on_error_return(&self, value: T) -> Flux<T>
    where
        T: Clone + Sync,
    {
        self.on_error_resume(move |_| Flux::just(value.clone()))
    }
}
