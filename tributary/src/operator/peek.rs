use crate::core::{Flux, Publisher, Subscriber, Subscription};
use crate::error::FluxError;

use std::sync::Arc;

/// Side-effect callbacks of a peek stage. At most one is set per stage.
struct Hooks<T> {
    on_next: Option<Arc<dyn Fn(&T) + Send + Sync>>,
    on_error: Option<Arc<dyn Fn(&FluxError) + Send + Sync>>,
    on_complete: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl<T> Clone for Hooks<T> {
    fn clone(&self) -> Self {
        Self {
            on_next: self.on_next.clone(),
            on_error: self.on_error.clone(),
            on_complete: self.on_complete.clone(),
        }
    }
}

impl<T> Hooks<T> {
    fn none() -> Self {
        Self {
            on_next: None,
            on_error: None,
            on_complete: None,
        }
    }
}

struct Peek<T> {
    upstream: Flux<T>,
    hooks: Hooks<T>,
}

impl<T: Send + 'static> Publisher<T> for Peek<T> {
    fn subscribe(&self, downstream: Box<dyn Subscriber<T>>) {
        self.upstream.subscribe_with(Box::new(PeekSubscriber {
            downstream,
            hooks: self.hooks.clone(),
            upstream: None,
            done: false,
        }));
    }
}

struct PeekSubscriber<T> {
    downstream: Box<dyn Subscriber<T>>,
    hooks: Hooks<T>,
    upstream: Option<Arc<dyn Subscription>>,
    done: bool,
}

impl<T: Send + 'static> PeekSubscriber<T> {
    fn fail(&mut self, error: FluxError) {
        self.done = true;

        if let Some(upstream) = self.upstream.take() {
            upstream.cancel();
        }

        self.downstream.on_error(error);
    }
}

impl<T: Send + 'static> Subscriber<T> for PeekSubscriber<T> {
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        self.upstream = Some(subscription.clone());
        self.downstream.on_subscribe(subscription);
    }

    fn on_next(&mut self, value: T) {
        if self.done {
            return;
        }

        if let Some(hook) = &self.hooks.on_next
            && let Err(e) = FluxError::catch("do_on_next", || hook(&value))
        {
            self.fail(e);
            return;
        }

        self.downstream.on_next(value);
    }

    fn on_error(&mut self, error: FluxError) {
        if self.done {
            return;
        }
        self.done = true;

        let error = match &self.hooks.on_error {
            Some(hook) => match FluxError::catch("do_on_error", || hook(&error)) {
                Ok(()) => error,
                Err(panicked) => panicked,
            },
            None => error,
        };

        self.downstream.on_error(error);
    }

    fn on_complete(&mut self) {
        if self.done {
            return;
        }
        self.done = true;

        if let Some(hook) = &self.hooks.on_complete
            && let Err(e) = FluxError::catch("do_on_complete", || hook())
        {
            self.downstream.on_error(e);
            return;
        }

        self.downstream.on_complete();
    }
}

impl<T: Send + 'static> Flux<T> {
    /// Runs `f` on every value before passing it on.
    pub fn do_on_next<F>(&self, f: F) -> Flux<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.peek(Hooks {
            on_next: Some(Arc::new(f)),
            ..Hooks::none()
        })
    }

    /// Runs `f` on the error terminal before passing it on.
    pub fn do_on_error<F>(&self, f: F) -> Flux<T>
    where
        F: Fn(&FluxError) + Send + Sync + 'static,
    {
        self.peek(Hooks {
            on_error: Some(Arc::new(f)),
            ..Hooks::none()
        })
    }

    /// Runs `f` on completion before passing it on.
    pub fn do_on_complete<F>(&self, f: F) -> Flux<T>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.peek(Hooks {
            on_complete: Some(Arc::new(f)),
            ..Hooks::none()
        })
    }

    fn peek(&self, hooks: Hooks<T>) -> Flux<T> {
        Flux::from_publisher(Peek {
            upstream: self.clone(),
            hooks,
        })
    }
}
