use crate::core::{Flux, Publisher, Subscriber, Subscription};
use crate::error::FluxError;
use crate::flow::{Relay, RelayHooks, RelaySubscriber, lock};
use crate::runtime::{Scheduler, TaskHandle};

use tracing::trace;

use std::sync::{Arc, Mutex};

struct SubscribeOn<T> {
    upstream: Flux<T>,
    scheduler: Scheduler,
}

impl<T: Send + 'static> Publisher<T> for SubscribeOn<T> {
    fn subscribe(&self, downstream: Box<dyn Subscriber<T>>) {
        let shared = Arc::new(SubscribeOnShared {
            relay: Relay::new(),
            task: Mutex::new(None),
        });

        shared.relay.start(downstream, shared.clone());

        if shared.relay.is_terminated() {
            return;
        }

        let upstream = self.upstream.clone();
        let hooks = shared.clone();
        let rejected = shared.clone();

        let scheduled = self.scheduler.schedule_guarded(
            move || {
                if hooks.relay.is_terminated() {
                    return;
                }

                trace!("subscribing upstream on scheduler");
                upstream.subscribe_with(Box::new(RelaySubscriber::new(hooks)));
            },
            move |e| rejected.relay.error(e),
        );

        match scheduled {
            Ok(task) => *lock(&shared.task) = Some(task),
            Err(e) => shared.relay.error(e),
        }
    }
}

struct SubscribeOnShared<T> {
    relay: Relay<T>,
    task: Mutex<Option<TaskHandle>>,
}

impl<T: Send + 'static> RelayHooks<T> for SubscribeOnShared<T> {
    fn relay(&self) -> &Relay<T> {
        &self.relay
    }

    fn upstream_error(this: &Arc<Self>, error: FluxError) {
        this.relay.error(error);
    }

    fn upstream_complete(this: &Arc<Self>) {
        this.relay.complete();
    }
}

impl<T: Send + 'static> Subscription for SubscribeOnShared<T> {
    fn request(&self, n: u64) {
        self.relay.request(n);
    }

    fn cancel(&self) {
        self.relay.cancel();

        if let Some(task) = lock(&self.task).take() {
            task.cancel();
        }
    }
}

impl<T: Send + 'static> Flux<T> {
    /// Subscribes to the upstream on a worker of `scheduler`.
    ///
    /// The upstream's `subscribe` (and, for synchronous sources, its
    /// emissions) then run on that worker instead of the caller's thread.
    /// Demand requested before the upstream is attached is carried over.
    pub fn subscribe_on(&self, scheduler: &Scheduler) -> Flux<T> {
        Flux::from_publisher(SubscribeOn {
            upstream: self.clone(),
            scheduler: scheduler.clone(),
        })
    }
}
