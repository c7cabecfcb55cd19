use crate::core::{Flux, Subscriber, Subscription, UNBOUNDED};
use crate::error::FluxError;
use crate::flow::lock;
use crate::runtime::context::current_worker;

use tracing::{debug, warn};

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Outcome<T> = Result<Option<T>, FluxError>;

/// Keeps the last value and hands the outcome to the parked caller.
struct BlockingSubscriber<T> {
    last: Option<T>,
    sender: Option<mpsc::Sender<Outcome<T>>>,
    subscription: Arc<Mutex<Option<Arc<dyn Subscription>>>>,
}

impl<T: Send + 'static> BlockingSubscriber<T> {
    fn send(&mut self, outcome: Outcome<T>) {
        lock(&self.subscription).take();

        if let Some(sender) = self.sender.take() {
            let _ = sender.send(outcome);
        }
    }
}

impl<T: Send + 'static> Subscriber<T> for BlockingSubscriber<T> {
    fn on_subscribe(&mut self, subscription: Arc<dyn Subscription>) {
        *lock(&self.subscription) = Some(subscription.clone());
        subscription.request(UNBOUNDED);
    }

    fn on_next(&mut self, value: T) {
        self.last = Some(value);
    }

    fn on_error(&mut self, error: FluxError) {
        self.send(Err(error));
    }

    fn on_complete(&mut self) {
        let last = self.last.take();
        self.send(Ok(last));
    }
}

impl<T: Send + 'static> Flux<T> {
    /// Subscribes and parks the calling thread until the first value or the
    /// terminal signal.
    ///
    /// Returns `Ok(None)` if the stream completes empty.
    ///
    /// # Errors
    ///
    /// - the stream's error,
    /// - [`FluxError::BlockingDeadlock`] when called on a scheduler worker,
    /// - [`FluxError::Cancelled`] if the stream is cancelled before a
    ///   terminal signal.
    pub fn block_first(&self) -> Result<Option<T>, FluxError> {
        self.take(1).block(None)
    }

    /// Subscribes and parks the calling thread until the terminal signal,
    /// returning the last value.
    ///
    /// Fails as [`block_first`](Self::block_first) does.
    pub fn block_last(&self) -> Result<Option<T>, FluxError> {
        self.block(None)
    }

    /// Like [`block_last`](Self::block_last), giving up after `timeout`.
    ///
    /// On timeout the subscription is cancelled and
    /// [`FluxError::Timeout`] is returned.
    pub fn block_last_timeout(&self, timeout: Duration) -> Result<Option<T>, FluxError> {
        self.block(Some(timeout))
    }

    fn block(&self, timeout: Option<Duration>) -> Result<Option<T>, FluxError> {
        if let Some(thread) = current_worker() {
            warn!(thread = %thread, "blocking call on a scheduler worker refused");
            return Err(FluxError::BlockingDeadlock { thread });
        }

        let (sender, receiver) = mpsc::channel();
        let subscription = Arc::new(Mutex::new(None));

        self.subscribe_with(Box::new(BlockingSubscriber {
            last: None,
            sender: Some(sender),
            subscription: subscription.clone(),
        }));

        let outcome = match timeout {
            None => receiver.recv().map_err(|_| FluxError::Cancelled),
            Some(after) => match receiver.recv_timeout(after) {
                Ok(outcome) => Ok(outcome),
                Err(RecvTimeoutError::Timeout) => {
                    debug!(?after, "blocking wait timed out, cancelling");

                    if let Some(subscription) = lock(&subscription).take() {
                        subscription.cancel();
                    }

                    Err(FluxError::Timeout { after })
                }
                Err(RecvTimeoutError::Disconnected) => Err(FluxError::Cancelled),
            },
        };

        outcome?
    }
}
