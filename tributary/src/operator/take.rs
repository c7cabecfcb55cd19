use crate::core::subscriber::complete_now;
use crate::core::{Flux, Publisher, Subscriber, Subscription};
use crate::error::FluxError;

use tracing::trace;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

struct Take<T> {
    upstream: Flux<T>,
    limit: u64,
}

impl<T: Send + 'static> Publisher<T> for Take<T> {
    fn subscribe(&self, downstream: Box<dyn Subscriber<T>>) {
        self.upstream.subscribe_with(Box::new(TakeSubscriber {
            downstream: Some(downstream),
            limit: self.limit,
            remaining: self.limit,
            link: None,
        }));
    }
}

struct TakeSubscriber<T> {
    downstream: Option<Box<dyn Subscriber<T>>>,
    limit: u64,
    remaining: u64,
    link: Option<Arc<TakeSubscription>>,
}

impl<T: Send + 'static> TakeSubscriber<T> {
    fn finish(&mut self, terminal: impl FnOnce(&mut dyn Subscriber<T>)) {
        let cancelled = self
            .link
            .as_ref()
            .is_some_and(|link| link.cancelled.load(Ordering::Acquire));

        if let Some(mut downstream) = self.downstream.take()
            && !cancelled
        {
            terminal(downstream.as_mut());
        }
    }
}

impl<T: Send + 'static> Subscriber<T> for TakeSubscriber<T> {
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        if self.limit == 0 {
            subscription.cancel();

            if let Some(downstream) = self.downstream.take() {
                complete_now(downstream);
            }
            return;
        }

        let link = Arc::new(TakeSubscription {
            upstream: subscription,
            limit: self.limit,
            granted: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
        });

        self.link = Some(link.clone());

        if let Some(downstream) = self.downstream.as_mut() {
            downstream.on_subscribe(link);
        }
    }

    fn on_next(&mut self, value: T) {
        if self.remaining == 0 {
            return;
        }

        let Some(downstream) = self.downstream.as_mut() else {
            return;
        };

        self.remaining -= 1;
        downstream.on_next(value);

        if self.remaining == 0 {
            trace!(limit = self.limit, "take limit reached, cancelling upstream");

            if let Some(link) = &self.link {
                link.upstream.cancel();
            }

            self.finish(|downstream| downstream.on_complete());
        }
    }

    fn on_error(&mut self, error: FluxError) {
        self.finish(|downstream| downstream.on_error(error));
    }

    fn on_complete(&mut self) {
        self.finish(|downstream| downstream.on_complete());
    }
}

/// Subscription handed downstream by `take`: never lets more than `limit`
/// items of demand through to the upstream.
struct TakeSubscription {
    upstream: Arc<dyn Subscription>,
    limit: u64,
    granted: AtomicU64,
    cancelled: AtomicBool,
}

impl Subscription for TakeSubscription {
    fn request(&self, n: u64) {
        if n == 0 {
            self.upstream.request(0);
            return;
        }

        let granted = self
            .granted
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |granted| {
                (granted < self.limit).then(|| granted + n.min(self.limit - granted))
            });

        if let Ok(previous) = granted {
            let extra = n.min(self.limit - previous);
            self.upstream.request(extra);
        }
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.upstream.cancel();
    }
}

struct Skip<T> {
    upstream: Flux<T>,
    count: u64,
}

impl<T: Send + 'static> Publisher<T> for Skip<T> {
    fn subscribe(&self, downstream: Box<dyn Subscriber<T>>) {
        self.upstream.subscribe_with(Box::new(SkipSubscriber {
            downstream,
            remaining: self.count,
            upstream: None,
        }));
    }
}

struct SkipSubscriber<T> {
    downstream: Box<dyn Subscriber<T>>,
    remaining: u64,
    upstream: Option<Arc<dyn Subscription>>,
}

impl<T: Send + 'static> Subscriber<T> for SkipSubscriber<T> {
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        self.upstream = Some(subscription.clone());
        self.downstream.on_subscribe(subscription);
    }

    fn on_next(&mut self, value: T) {
        if self.remaining == 0 {
            self.downstream.on_next(value);
            return;
        }

        self.remaining -= 1;

        if let Some(upstream) = &self.upstream {
            upstream.request(1);
        }
    }

    fn on_error(&mut self, error: FluxError) {
        self.downstream.on_error(error);
    }

    fn on_complete(&mut self) {
        self.downstream.on_complete();
    }
}

impl<T: Send + 'static> Flux<T> {
    /// Emits at most the first `n` values, then cancels the upstream and
    /// completes.
    ///
    /// Upstream demand is capped at `n`. `take(0)` cancels the upstream right
    /// after subscribing and completes without emitting.
    pub fn take(&self, n: u64) -> Flux<T> {
        Flux::from_publisher(Take {
            upstream: self.clone(),
            limit: n,
        })
    }

    /// Drops the first `n` values.
    pub fn skip(&self, n: u64) -> Flux<T> {
        Flux::from_publisher(Skip {
            upstream: self.clone(),
            count: n,
        })
    }
}
