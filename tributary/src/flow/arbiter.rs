use crate::core::subscription::UNBOUNDED;
use crate::core::{Subscriber, Subscription};
use crate::error::FluxError;
use crate::flow::{Outlet, lock};

use std::sync::{Arc, Mutex};

/// Holds the current upstream subscription of a stage that switches
/// upstreams over time (concat, retry, resume, subscribe_on).
///
/// The arbiter remembers how much demand the downstream granted and how much
/// of it the previous upstreams already satisfied, so a newly set upstream is
/// immediately asked for exactly the outstanding amount.
pub(crate) struct Arbiter {
    state: Mutex<ArbiterState>,
}

struct ArbiterState {
    current: Option<Arc<dyn Subscription>>,
    requested: u64,
    cancelled: bool,
}

impl Arbiter {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(ArbiterState {
                current: None,
                requested: 0,
                cancelled: false,
            }),
        }
    }

    /// Switches to a new upstream and forwards the outstanding demand to it.
    ///
    /// If the arbiter was cancelled, the new upstream is cancelled instead.
    pub(crate) fn set(&self, subscription: Arc<dyn Subscription>) {
        let outstanding = {
            let mut state = lock(&self.state);

            if state.cancelled {
                None
            } else {
                state.current = Some(subscription.clone());
                Some(state.requested)
            }
        };

        match outstanding {
            None => subscription.cancel(),
            Some(0) => {}
            Some(n) => subscription.request(n),
        }
    }

    /// Records downstream demand and forwards it to the current upstream.
    pub(crate) fn request(&self, n: u64) {
        let current = {
            let mut state = lock(&self.state);

            if state.cancelled {
                return;
            }

            if state.requested != UNBOUNDED {
                state.requested = state.requested.saturating_add(n);
            }

            state.current.clone()
        };

        if let Some(current) = current {
            current.request(n);
        }
    }

    /// Records that `n` items were received from the current upstream.
    pub(crate) fn produced(&self, n: u64) {
        let mut state = lock(&self.state);

        if state.requested != UNBOUNDED {
            state.requested = state.requested.saturating_sub(n);
        }
    }

    /// Cancels the current upstream and every upstream set later. Idempotent.
    pub(crate) fn cancel(&self) {
        let current = {
            let mut state = lock(&self.state);

            if state.cancelled {
                return;
            }

            state.cancelled = true;
            state.current.take()
        };

        if let Some(current) = current {
            current.cancel();
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        lock(&self.state).cancelled
    }
}

/// Downstream side of a switching stage: an [`Outlet`] fed by whichever
/// upstream the [`Arbiter`] currently holds.
pub(crate) struct Relay<T> {
    outlet: Outlet<T>,
    arbiter: Arbiter,
}

impl<T: Send + 'static> Relay<T> {
    pub(crate) fn new() -> Self {
        Self {
            outlet: Outlet::new(),
            arbiter: Arbiter::new(),
        }
    }

    /// Hands `subscription` to `downstream`. Must precede any upstream.
    pub(crate) fn start(
        &self,
        downstream: Box<dyn Subscriber<T>>,
        subscription: Arc<dyn Subscription>,
    ) {
        self.outlet.start(downstream, subscription);
    }

    pub(crate) fn set_upstream(&self, subscription: Arc<dyn Subscription>) {
        self.arbiter.set(subscription);
    }

    pub(crate) fn next(&self, value: T) {
        self.arbiter.produced(1);
        self.outlet.push(value);
    }

    pub(crate) fn error(&self, error: FluxError) {
        self.outlet.error(error);
    }

    pub(crate) fn complete(&self) {
        self.outlet.complete();
    }

    /// Downstream `request`.
    pub(crate) fn request(&self, n: u64) {
        if self.outlet.request(n) {
            self.arbiter.request(n);
        } else {
            self.arbiter.cancel();
        }
    }

    /// Downstream `cancel`.
    pub(crate) fn cancel(&self) {
        self.outlet.cancel();
        self.arbiter.cancel();
    }

    /// Returns `true` once the downstream cancelled or received a terminal.
    pub(crate) fn is_terminated(&self) -> bool {
        self.outlet.is_terminated()
    }
}

/// Behaviour of a switching stage when its current upstream terminates.
pub(crate) trait RelayHooks<T: Send + 'static>: Send + Sync + Sized + 'static {
    fn relay(&self) -> &Relay<T>;

    fn upstream_error(this: &Arc<Self>, error: FluxError);

    fn upstream_complete(this: &Arc<Self>);
}

/// Subscriber attached to each successive upstream of a switching stage.
pub(crate) struct RelaySubscriber<H> {
    hooks: Arc<H>,
}

impl<H> RelaySubscriber<H> {
    pub(crate) fn new(hooks: Arc<H>) -> Self {
        Self { hooks }
    }
}

impl<T, H> Subscriber<T> for RelaySubscriber<H>
where
    T: Send + 'static,
    H: RelayHooks<T>,
{
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        self.hooks.relay().set_upstream(subscription);
    }

    fn on_next(&mut self, value: T) {
        self.hooks.relay().next(value);
    }

    fn on_error(&mut self, error: FluxError) {
        H::upstream_error(&self.hooks, error);
    }

    fn on_complete(&mut self) {
        H::upstream_complete(&self.hooks);
    }
}
