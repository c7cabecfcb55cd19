use crate::core::{Flux, Subscriber, Subscription, UNBOUNDED};
use crate::error::FluxError;
use crate::flow::lock;

use tracing::error;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Handle returned by the callback-based `subscribe` family.
///
/// Dropping the handle does not cancel the subscription; call
/// [`dispose`](Self::dispose).
#[derive(Clone)]
pub struct Disposable {
    state: Arc<DisposeState>,
}

struct DisposeState {
    subscription: Mutex<Option<Arc<dyn Subscription>>>,
    disposed: AtomicBool,
}

impl DisposeState {
    fn attach(&self, subscription: Arc<dyn Subscription>) -> bool {
        {
            let mut slot = lock(&self.subscription);

            if !self.disposed.load(Ordering::Acquire) {
                *slot = Some(subscription);
                return true;
            }
        }

        subscription.cancel();
        false
    }

    /// Marks the subscription finished, releasing it.
    fn finish(&self) {
        self.disposed.store(true, Ordering::Release);
        lock(&self.subscription).take();
    }
}

impl Disposable {
    fn new() -> Self {
        Self {
            state: Arc::new(DisposeState {
                subscription: Mutex::new(None),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Cancels the subscription. Idempotent.
    pub fn dispose(&self) {
        if self.state.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Some(subscription) = lock(&self.state.subscription).take() {
            subscription.cancel();
        }
    }

    /// Returns `true` once disposed or terminated.
    pub fn is_disposed(&self) -> bool {
        self.state.disposed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Disposable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposable")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

type OnNext<T> = Box<dyn FnMut(T) + Send>;
type OnError = Box<dyn FnMut(FluxError) + Send>;
type OnComplete = Box<dyn FnMut() + Send>;

/// Subscriber driven by closures, requesting everything up front.
struct LambdaSubscriber<T> {
    on_next: OnNext<T>,
    on_error: Option<OnError>,
    on_complete: Option<OnComplete>,
    state: Arc<DisposeState>,
    subscription: Option<Arc<dyn Subscription>>,
    done: bool,
}

impl<T: Send + 'static> Subscriber<T> for LambdaSubscriber<T> {
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        if !self.state.attach(subscription.clone()) {
            self.done = true;
            return;
        }

        self.subscription = Some(subscription.clone());
        subscription.request(UNBOUNDED);
    }

    fn on_next(&mut self, value: T) {
        if self.done {
            return;
        }

        let on_next = &mut self.on_next;

        if let Err(e) = FluxError::catch("subscribe", || on_next(value)) {
            error!(error = %e, "value callback panicked, cancelling");
            self.done = true;
            self.state.finish();

            if let Some(subscription) = self.subscription.take() {
                subscription.cancel();
            }
        }
    }

    fn on_error(&mut self, e: FluxError) {
        if self.done {
            return;
        }

        self.done = true;
        self.state.finish();

        match self.on_error.as_mut() {
            Some(on_error) => {
                if let Err(panic) = FluxError::catch("subscribe", || on_error(e)) {
                    error!(error = %panic, "error callback panicked");
                }
            }
            None => error!(error = %e, label = e.as_label(), "unhandled stream error"),
        }
    }

    fn on_complete(&mut self) {
        if self.done {
            return;
        }

        self.done = true;
        self.state.finish();

        if let Some(on_complete) = self.on_complete.as_mut()
            && let Err(panic) = FluxError::catch("subscribe", on_complete)
        {
            error!(error = %panic, "completion callback panicked");
        }
    }
}

impl<T: Send + 'static> Flux<T> {
    /// Requests everything and calls `on_next` for each value.
    ///
    /// An error terminal is logged.
    pub fn subscribe<N>(&self, on_next: N) -> Disposable
    where
        N: FnMut(T) + Send + 'static,
    {
        self.subscribe_callbacks(Box::new(on_next), None, None)
    }

    /// Requests everything, calling `on_next` for each value and `on_error`
    /// on failure.
    pub fn subscribe_with_error<N, E>(&self, on_next: N, on_error: E) -> Disposable
    where
        N: FnMut(T) + Send + 'static,
        E: FnMut(FluxError) + Send + 'static,
    {
        self.subscribe_callbacks(Box::new(on_next), Some(Box::new(on_error)), None)
    }

    /// Requests everything, with a callback for each signal.
    pub fn subscribe_all<N, E, C>(&self, on_next: N, on_error: E, on_complete: C) -> Disposable
    where
        N: FnMut(T) + Send + 'static,
        E: FnMut(FluxError) + Send + 'static,
        C: FnMut() + Send + 'static,
    {
        self.subscribe_callbacks(
            Box::new(on_next),
            Some(Box::new(on_error)),
            Some(Box::new(on_complete)),
        )
    }

    fn subscribe_callbacks(
        &self,
        on_next: OnNext<T>,
        on_error: Option<OnError>,
        on_complete: Option<OnComplete>,
    ) -> Disposable {
        let disposable = Disposable::new();

        self.subscribe_with(Box::new(LambdaSubscriber {
            on_next,
            on_error,
            on_complete,
            state: disposable.state.clone(),
            subscription: None,
            done: false,
        }));

        disposable
    }
}
