use crate::core::subscriber::{complete_now, error_now};
use crate::core::{Flux, Publisher, Subscriber, Subscription};
use crate::error::FluxError;
use crate::flow::{Outlet, lock};

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

struct Empty<T>(PhantomData<fn() -> T>);

impl<T: Send + 'static> Publisher<T> for Empty<T> {
    fn subscribe(&self, subscriber: Box<dyn Subscriber<T>>) {
        complete_now(subscriber);
    }
}

struct Failed<T> {
    error: FluxError,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + 'static> Publisher<T> for Failed<T> {
    fn subscribe(&self, subscriber: Box<dyn Subscriber<T>>) {
        error_now(subscriber, self.error.clone());
    }
}

struct Never<T>(PhantomData<fn() -> T>);

impl<T: Send + 'static> Publisher<T> for Never<T> {
    fn subscribe(&self, mut subscriber: Box<dyn Subscriber<T>>) {
        let parked = Arc::new(Parked {
            subscriber: Mutex::new(None),
            cancelled: AtomicBool::new(false),
        });

        subscriber.on_subscribe(parked.clone());

        let mut slot = lock(&parked.subscriber);

        if !parked.cancelled.load(Ordering::Acquire) {
            *slot = Some(subscriber);
        }
    }
}

/// Keeps a subscriber of `never` alive until it cancels.
struct Parked<T> {
    subscriber: Mutex<Option<Box<dyn Subscriber<T>>>>,
    cancelled: AtomicBool,
}

impl<T: Send + 'static> Subscription for Parked<T> {
    fn request(&self, _n: u64) {}

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        let subscriber = lock(&self.subscriber).take();
        drop(subscriber);
    }
}

type Factory<T> = Arc<dyn Fn() -> Flux<T> + Send + Sync>;

struct Defer<T> {
    factory: Factory<T>,
}

impl<T: Send + 'static> Publisher<T> for Defer<T> {
    fn subscribe(&self, subscriber: Box<dyn Subscriber<T>>) {
        match FluxError::catch("defer", || (self.factory)()) {
            Ok(flux) => flux.subscribe_with(subscriber),
            Err(e) => error_now(subscriber, e),
        }
    }
}

/// Emits a value it owns, once. A second subscription fails.
struct SingleUse<T> {
    value: Mutex<Option<T>>,
}

impl<T: Send + 'static> Publisher<T> for SingleUse<T> {
    fn subscribe(&self, subscriber: Box<dyn Subscriber<T>>) {
        let Some(value) = lock(&self.value).take() else {
            error_now(
                subscriber,
                FluxError::Operator {
                    operator: "single_use",
                    message: "source already consumed".to_string(),
                },
            );
            return;
        };

        let outlet = Arc::new(Outlet::new());
        outlet.push(value);
        outlet.complete();
        outlet.start(subscriber, Arc::new(OutletSubscription(outlet.clone())));
    }
}

/// Exposes a bare outlet as the subscription of its own downstream.
struct OutletSubscription<T>(Arc<Outlet<T>>);

impl<T: Send + 'static> Subscription for OutletSubscription<T> {
    fn request(&self, n: u64) {
        self.0.request(n);
    }

    fn cancel(&self) {
        self.0.cancel();
    }
}

impl<T: Send + 'static> Flux<T> {
    /// Completes immediately without emitting.
    pub fn empty() -> Self {
        Flux::from_publisher(Empty(PhantomData))
    }

    /// Fails immediately with `error`.
    pub fn error(error: FluxError) -> Self {
        Flux::from_publisher(Failed {
            error,
            _marker: PhantomData,
        })
    }

    /// Never emits and never terminates.
    pub fn never() -> Self {
        Flux::from_publisher(Never(PhantomData))
    }

    /// Builds a fresh publisher for every subscription.
    ///
    /// A panic in `factory` fails that subscription.
    pub fn defer<F>(factory: F) -> Self
    where
        F: Fn() -> Flux<T> + Send + Sync + 'static,
    {
        Flux::from_publisher(Defer {
            factory: Arc::new(factory),
        })
    }

    /// Emits `value` to the first subscriber only, without requiring `Clone`.
    pub(crate) fn single_use(value: T) -> Self {
        Flux::from_publisher(SingleUse {
            value: Mutex::new(Some(value)),
        })
    }
}
