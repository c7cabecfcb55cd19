use crate::core::{Flux, Publisher, Subscriber, Subscription};
use crate::error::FluxError;
use crate::flow::{Relay, RelayHooks, RelaySubscriber, Trampoline, lock};
use crate::runtime::{Scheduler, TaskHandle};

use tracing::debug;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct Retry<T> {
    upstream: Flux<T>,
    times: u64,
    backoff: Option<(Duration, Scheduler)>,
}

impl<T: Send + 'static> Publisher<T> for Retry<T> {
    fn subscribe(&self, downstream: Box<dyn Subscriber<T>>) {
        let shared = Arc::new(RetryShared {
            relay: Relay::new(),
            source: self.upstream.clone(),
            remaining: AtomicU64::new(self.times),
            backoff: self.backoff.clone(),
            pending: Mutex::new(None),
            trampoline: Trampoline::new(),
        });

        shared.relay.start(downstream, shared.clone());
        RetryShared::resubscribe(&shared);
    }
}

struct RetryShared<T> {
    relay: Relay<T>,
    source: Flux<T>,

    /// Resubscriptions left for this subscription.
    remaining: AtomicU64,

    /// Wait before each resubscription, if any.
    backoff: Option<(Duration, Scheduler)>,

    /// Scheduled resubscription.
    pending: Mutex<Option<TaskHandle>>,

    trampoline: Trampoline,
}

impl<T: Send + 'static> RetryShared<T> {
    fn resubscribe(this: &Arc<Self>) {
        this.trampoline.run(|| {
            if this.relay.is_terminated() {
                return;
            }

            this.source
                .subscribe_with(Box::new(RelaySubscriber::new(this.clone())));
        });
    }

    fn schedule_resubscribe(this: &Arc<Self>, interval: Duration, scheduler: &Scheduler) {
        let shared = this.clone();
        let rejected = this.clone();
        let scheduled = scheduler.schedule_after_guarded(
            interval,
            move || Self::resubscribe(&shared),
            move |e| rejected.relay.error(e),
        );

        match scheduled {
            Ok(task) => {
                *lock(&this.pending) = Some(task.clone());

                if this.relay.is_terminated() {
                    task.cancel();
                }
            }
            Err(e) => this.relay.error(e),
        }
    }
}

impl<T: Send + 'static> RelayHooks<T> for RetryShared<T> {
    fn relay(&self) -> &Relay<T> {
        &self.relay
    }

    fn upstream_error(this: &Arc<Self>, error: FluxError) {
        if !error.is_recoverable() {
            this.relay.error(error);
            return;
        }

        let attempt = this
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |left| left.checked_sub(1));

        let Ok(left) = attempt else {
            debug!(error = %error, "retries exhausted");
            this.relay.error(error);
            return;
        };

        debug!(error = %error, remaining = left - 1, "retrying");

        match &this.backoff {
            Some((interval, scheduler)) => Self::schedule_resubscribe(this, *interval, scheduler),
            None => Self::resubscribe(this),
        }
    }

    fn upstream_complete(this: &Arc<Self>) {
        this.relay.complete();
    }
}

impl<T: Send + 'static> Subscription for RetryShared<T> {
    fn request(&self, n: u64) {
        self.relay.request(n);
    }

    fn cancel(&self) {
        self.relay.cancel();

        if let Some(task) = lock(&self.pending).take() {
            task.cancel();
        }
    }
}

impl<T: Send + 'static> Flux<T> {
    /// On error, resubscribes to the upstream, up to `times` times.
    ///
    /// Each attempt re-runs the upstream from the start, side effects
    /// included. Values emitted by failed attempts stay emitted. After the
    /// last attempt fails its error is delivered. The attempt budget belongs
    /// to each subscription.
    pub fn retry(&self, times: u64) -> Flux<T> {
        Flux::from_publisher(Retry {
            upstream: self.clone(),
            times,
            backoff: None,
        })
    }

    /// Like [`retry`](Self::retry), waiting `interval` on `scheduler` before
    /// each resubscription.
    pub fn retry_with_interval(
        &self,
        times: u64,
        interval: Duration,
        scheduler: &Scheduler,
    ) -> Flux<T> {
        Flux::from_publisher(Retry {
            upstream: self.clone(),
            times,
            backoff: Some((interval, scheduler.clone())),
        })
    }
}
